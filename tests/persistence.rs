#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};
    use ndarray::{Array4, ArrayD, IxDyn};
    use neural_invariances::{
        correlation::CorrelationTable,
        error::PersistenceError,
        filter::FilterTensor,
        persistence::{load_array, load_correlations, ArraySink, DirectorySink},
    };


    fn scratch_dir(name: &str) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("neural_invariances_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&path);

        path
    }

    #[test]
    fn test_array_round_trip() -> Result<(), PersistenceError> {
        let root = scratch_dir("arrays");
        let sink = DirectorySink::new(&root)?;

        let filter = Array4::from_shape_fn((2, 1, 3, 4), |(n, _, y, x)| n as f64 - 0.25 * (y * 4 + x) as f64);
        sink.store_array("evaluated_filter", &filter.clone().into_dyn())?;

        assert!(root.join("evaluated_filter.bin").exists());
        assert!(root.join("evaluated_filter.json").exists());

        let loaded = load_array(root.join("evaluated_filter"))?;
        assert_eq!(loaded.shape(), &[2, 1, 3, 4]);

        let tensor = FilterTensor::from_dyn(loaded).unwrap();
        assert_eq!(tensor.to_grid(), filter);

        fs::remove_dir_all(&root)?;

        Ok(())
    }

    #[test]
    fn test_nested_paths_and_children() -> Result<(), PersistenceError> {
        let root = scratch_dir("nested");
        let sink = DirectorySink::new(&root)?;
        let child = sink.child("hyperparametersearch")?;

        let scalar = ArrayD::<f64>::from_elem(IxDyn(&[1]), 3.5);
        sink.store_array("figures/Filter_neuron_0", &scalar)?;
        child.store_text("readme.txt", "report")?;

        assert_eq!(load_array(root.join("figures").join("Filter_neuron_0"))?, scalar);
        assert_eq!(fs::read_to_string(root.join("hyperparametersearch").join("readme.txt"))?, "report");

        fs::remove_dir_all(&root)?;

        Ok(())
    }

    #[test]
    fn test_correlation_table_round_trip() -> Result<(), PersistenceError> {
        let root = scratch_dir("correlations");
        let sink = DirectorySink::new(&root)?;

        let table: CorrelationTable = [(0, 0.5), (1, -0.25), (2, f64::NAN)].into_iter().collect();
        sink.store_correlations("Correlations.csv", &table)?;

        let contents = fs::read_to_string(root.join("Correlations.csv"))?;
        assert_eq!(contents.lines().next(), Some("0,0.5"));

        let loaded = load_correlations(root.join("Correlations.csv"))?;
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[&0], 0.5);
        assert_eq!(loaded[&1], -0.25);
        assert!(loaded[&2].is_nan());

        fs::remove_dir_all(&root)?;

        Ok(())
    }

    #[test]
    fn test_truncated_values_are_rejected() -> Result<(), PersistenceError> {
        let root = scratch_dir("truncated");
        let sink = DirectorySink::new(&root)?;

        sink.store_array("image", &ArrayD::<f64>::zeros(IxDyn(&[2, 2])))?;
        fs::write(root.join("image.bin"), [0u8; 24])?;

        assert!(matches!(
            load_array(root.join("image")),
            Err(PersistenceError::ShapeFileMismatch { expected: 4, found: 3 })
        ));
        assert!(matches!(load_array(root.join("missing")), Err(PersistenceError::Io(_))));

        fs::remove_dir_all(&root)?;

        Ok(())
    }
}
