#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use ndarray::{Array1, Array4, Axis};
    use rand::{SeedableRng, rngs::StdRng};
    use neural_invariances::{
        context::{Device, ExecutionContext},
        distribution::gaussian_noise_image,
        error::{InvariancesError, MeiError},
        filter::FilterTensor,
        mei::{
            gaussian_blur, gradient_ascent_step, linspace, AscentStep, LinearScoringModel,
            MeiOptimizer, MeiParameters, ScoringModel,
        },
        persistence::MemorySink,
        spectral::{LowpassFilter, DEFAULT_SMOOTHING},
    };


    /// Model whose activations never change, so ascent steps only normalize and blur
    struct ConstantModel {
        neurons: usize,
    }

    impl ScoringModel for ConstantModel {
        fn neuron_count(&self) -> usize {
            self.neurons
        }

        fn forward(&self, _image: &Array4<f64>) -> Result<Array1<f64>, InvariancesError> {
            Ok(Array1::from_elem(self.neurons, 1.))
        }

        fn backward(&self, image: &Array4<f64>, _neuron: usize) -> Result<Array4<f64>, InvariancesError> {
            Ok(Array4::zeros(image.raw_dim()))
        }
    }

    /// Constant model remembering every image it was given
    struct RecordingModel {
        seen: Mutex<Vec<Array4<f64>>>,
    }

    impl ScoringModel for RecordingModel {
        fn neuron_count(&self) -> usize {
            1
        }

        fn forward(&self, image: &Array4<f64>) -> Result<Array1<f64>, InvariancesError> {
            self.seen.lock().unwrap().push(image.clone());

            Ok(Array1::from_elem(1, 0.))
        }

        fn backward(&self, image: &Array4<f64>, _neuron: usize) -> Result<Array4<f64>, InvariancesError> {
            Ok(Array4::zeros(image.raw_dim()))
        }
    }

    /// Linear model whose gradient for neuron `1` is not finite
    struct UnstableModel {
        inner: LinearScoringModel,
    }

    impl ScoringModel for UnstableModel {
        fn neuron_count(&self) -> usize {
            self.inner.neuron_count()
        }

        fn forward(&self, image: &Array4<f64>) -> Result<Array1<f64>, InvariancesError> {
            self.inner.forward(image)
        }

        fn backward(&self, image: &Array4<f64>, neuron: usize) -> Result<Array4<f64>, InvariancesError> {
            if neuron == 1 {
                return Ok(Array4::from_elem(image.raw_dim(), f64::NAN));
            }

            self.inner.backward(image, neuron)
        }
    }

    fn seed_image(seed: u64, shape: (usize, usize, usize, usize)) -> Array4<f64> {
        let mut rng = StdRng::seed_from_u64(seed);

        gaussian_noise_image(shape, 0., 1., &mut rng)
    }

    fn bump_filter(neurons: usize, size: usize) -> FilterTensor {
        let center = (size as f64 - 1.) / 2.;

        FilterTensor::Grid(Array4::from_shape_fn((neurons, 1, size, size), |(n, _, y, x)| {
            let distance = (y as f64 - center).powi(2) + (x as f64 - center).powi(2);

            (n + 1) as f64 * (-distance / 4.).exp()
        }))
    }

    fn normalized(image: &Array4<f64>) -> Array4<f64> {
        let maximum = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        image / maximum
    }

    #[test]
    fn test_constant_model_only_normalizes_and_blurs() -> Result<(), InvariancesError> {
        let model = ConstantModel { neurons: 2 };
        let seed = seed_image(3, (1, 1, 6, 6));
        let parameters = MeiParameters { epochs: 2, ..MeiParameters::default() };

        let report = MeiOptimizer::new(&model, parameters)
            .run(&seed, &[0], &ExecutionContext::default_impl())?;

        let schedule = parameters.schedule();
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule[0].sigma, 1.);
        assert_eq!(schedule[1].sigma, 0.05);

        let mut expected = seed.clone();
        for step in schedule.iter() {
            expected = gaussian_blur(&normalized(&expected), step.sigma);
        }

        let mei = report.get(0).unwrap().as_ref().unwrap();
        for (i, j) in mei.image.iter().zip(expected.iter()) {
            assert!((i - j).abs() < 1e-12);
        }

        Ok(())
    }

    #[test]
    fn test_schedule_ends_exactly_at_final_values() {
        let parameters = MeiParameters::default();
        let schedule = parameters.schedule();

        assert_eq!(schedule.len(), 200);
        assert_eq!(schedule[0].learning_rate, 1.);
        assert_eq!(schedule[199].learning_rate, 0.0001);
        assert_eq!(schedule[0].sigma, 1.);
        assert_eq!(schedule[199].sigma, 0.05);

        assert_eq!(linspace(1., 0.05, 2), vec![1., 0.05]);
        assert_eq!(linspace(0.3, 0.7, 3).last(), Some(&0.7));
        assert_eq!(linspace(2., 5., 1), vec![2.]);
        assert!(linspace(2., 5., 0).is_empty());
        assert!((linspace(0., 1., 5)[2] - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_max_one_image_is_unchanged_by_normalization() -> Result<(), InvariancesError> {
        let model = RecordingModel { seen: Mutex::new(Vec::new()) };
        let mut image = seed_image(5, (1, 1, 5, 5));
        image[[0, 0, 2, 2]] = 1.;
        image.mapv_inplace(|value| value.min(1.));

        let lowpass = LowpassFilter::from_shape(5, 5, DEFAULT_SMOOTHING);
        gradient_ascent_step(&model, 0, image.clone(), &lowpass, &AscentStep::default())?;

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], image);

        Ok(())
    }

    #[test]
    fn test_step_moves_along_filtered_gradient() -> Result<(), InvariancesError> {
        let filter = bump_filter(1, 7);
        let model = LinearScoringModel::new(&filter);
        let image = normalized(&seed_image(9, (1, 1, 7, 7)));
        let lowpass = LowpassFilter::from_shape(7, 7, DEFAULT_SMOOTHING);

        // without blur the activation must increase after a step
        let step = AscentStep { learning_rate: 10., sigma: 0.01, step_gain: 1. };
        let outcome = gradient_ascent_step(&model, 0, image.clone(), &lowpass, &step)?;

        let before = model.forward(&image)?[0];
        let after = model.forward(&outcome.image)?[0];

        assert!((outcome.activation - before).abs() < 1e-12);
        assert!(after > before);

        Ok(())
    }

    #[test]
    fn test_linear_model_activation_increases() -> Result<(), InvariancesError> {
        let filter = bump_filter(2, 8);
        let model = LinearScoringModel::new(&filter);
        let seed = seed_image(1, (1, 1, 8, 8));
        let parameters = MeiParameters { epochs: 100, ..MeiParameters::default() };

        let report = MeiOptimizer::new(&model, parameters)
            .run(&seed, &[0, 1], &ExecutionContext::default_impl())?;

        assert_eq!(report.images().count(), 2);
        assert_eq!(report.failures().count(), 0);

        for mei in report.images() {
            let seed_activation = model.forward(&normalized(&seed))?[mei.neuron];
            let final_activation = model.forward(&normalized(&mei.image))?[mei.neuron];

            assert!(final_activation > seed_activation);
            assert_eq!(mei.image.dim(), seed.dim());
        }

        Ok(())
    }

    #[test]
    fn test_divergent_neuron_does_not_affect_others() -> Result<(), InvariancesError> {
        let model = UnstableModel { inner: LinearScoringModel::new(&bump_filter(3, 6)) };
        let seed = seed_image(2, (1, 1, 6, 6));
        let parameters = MeiParameters { epochs: 5, ..MeiParameters::default() };

        let report = MeiOptimizer::new(&model, parameters)
            .run(&seed, &[0, 1, 2], &ExecutionContext::default_impl())?;

        assert!(report.get(0).unwrap().is_ok());
        assert!(report.get(2).unwrap().is_ok());
        assert!(matches!(
            report.get(1).unwrap(),
            Err(InvariancesError::MeiRelatedError(MeiError::NumericInstability { neuron: 1, epoch: 0 }))
        ));

        let failures: Vec<usize> = report.failures().map(|(neuron, _)| neuron).collect();
        assert_eq!(failures, vec![1]);

        Ok(())
    }

    #[test]
    fn test_cancellation_is_reported_per_neuron() -> Result<(), InvariancesError> {
        let model = LinearScoringModel::new(&bump_filter(2, 5));
        let seed = seed_image(4, (1, 1, 5, 5));
        let context = ExecutionContext::default_impl();
        context.cancellation.cancel();

        let report = MeiOptimizer::new(&model, MeiParameters::default())
            .run(&seed, &[0, 1], &context)?;

        assert_eq!(report.images().count(), 0);
        for (neuron, err) in report.failures() {
            assert!(matches!(
                err,
                InvariancesError::MeiRelatedError(MeiError::Cancelled { neuron: cancelled, epoch: 0 }) if *cancelled == neuron
            ));
        }

        Ok(())
    }

    #[test]
    fn test_invalid_batches_are_rejected() {
        let model = LinearScoringModel::new(&bump_filter(2, 5));
        let context = ExecutionContext::default_impl();
        let seed = seed_image(6, (1, 1, 5, 5));

        let out_of_range = MeiOptimizer::new(&model, MeiParameters::default()).run(&seed, &[0, 2], &context);
        assert!(matches!(
            out_of_range,
            Err(InvariancesError::MeiRelatedError(MeiError::NeuronIndexOutOfRange { neuron: 2, neuron_count: 2 }))
        ));

        let parameters = MeiParameters { epochs: 0, ..MeiParameters::default() };
        let zero_epochs = MeiOptimizer::new(&model, parameters).run(&seed, &[0], &context);
        assert!(matches!(zero_epochs, Err(InvariancesError::MeiRelatedError(MeiError::ZeroEpochs))));

        let zeros = Array4::<f64>::zeros((1, 1, 5, 5));
        let zero_seed = MeiOptimizer::new(&model, MeiParameters::default()).run(&zeros, &[0], &context);
        assert!(matches!(zero_seed, Err(InvariancesError::MeiRelatedError(MeiError::InvalidImage))));

        let batch = seed_image(6, (2, 1, 5, 5));
        let batched_seed = MeiOptimizer::new(&model, MeiParameters::default()).run(&batch, &[0], &context);
        assert!(matches!(batched_seed, Err(InvariancesError::MeiRelatedError(MeiError::InvalidImage))));
    }

    #[test]
    fn test_parallel_matches_sequential() -> Result<(), InvariancesError> {
        let model = LinearScoringModel::new(&bump_filter(4, 6));
        let seed = seed_image(8, (1, 1, 6, 6));
        let parameters = MeiParameters { epochs: 10, ..MeiParameters::default() };
        let optimizer = MeiOptimizer::new(&model, parameters);

        let sequential = optimizer.run(&seed, &[0, 1, 2, 3], &ExecutionContext::new(Device::Sequential, 1))?;
        let parallel = optimizer.run(&seed, &[0, 1, 2, 3], &ExecutionContext::new(Device::ThreadPool { threads: 2 }, 1))?;

        let neurons: Vec<usize> = parallel.outcomes.iter().map(|(neuron, _)| *neuron).collect();
        assert_eq!(neurons, vec![0, 1, 2, 3]);

        for (a, b) in sequential.images().zip(parallel.images()) {
            assert_eq!(a.neuron, b.neuron);
            assert_eq!(a.image, b.image);
        }

        Ok(())
    }

    #[test]
    fn test_report_is_persisted_per_neuron() -> Result<(), InvariancesError> {
        let model = LinearScoringModel::new(&bump_filter(2, 4));
        let seed = seed_image(10, (1, 1, 4, 4));
        let parameters = MeiParameters { epochs: 3, ..MeiParameters::default() };

        let report = MeiOptimizer::new(&model, parameters)
            .run(&seed, &[1, 0], &ExecutionContext::default_impl())?;

        let sink = MemorySink::new();
        report.persist(&sink)?;

        assert_eq!(sink.array_paths(), vec!["MEI_neuron_0", "MEI_neuron_1"]);
        assert_eq!(sink.array("MEI_neuron_1").unwrap().shape(), &[1, 1, 4, 4]);
        assert!(sink.text("readme.md").is_some());

        let first = report.outcomes.first().unwrap();
        assert_eq!(first.0, 1);
        assert_eq!(
            report.get(1).unwrap().as_ref().unwrap().image.len_of(Axis(1)),
            1
        );

        Ok(())
    }
}
