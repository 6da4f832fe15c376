#[cfg(test)]
mod tests {
    use ndarray::{Array2, Array4};
    use rand::{SeedableRng, rngs::StdRng};
    use neural_invariances::{
        distribution::gaussian_noise_image,
        error::ShapeError,
        spectral::{lowpass_filter_gradient, lowpass_kernel, LowpassFilter, DEFAULT_SMOOTHING},
    };


    fn assert_close(a: &Array4<f64>, b: &Array4<f64>, tolerance: f64) {
        assert_eq!(a.dim(), b.dim());
        for (i, j) in a.iter().zip(b.iter()) {
            assert!((i - j).abs() < tolerance, "{} != {}", i, j);
        }
    }

    #[test]
    fn test_kernel_is_reflection_symmetric() {
        for (height, width) in [(5, 5), (6, 9), (8, 3), (1, 7)] {
            let kernel = lowpass_kernel(height, width, DEFAULT_SMOOTHING);

            for y in 0..height {
                for x in 0..width {
                    assert_eq!(kernel[[y, x]], kernel[[height - 1 - y, x]]);
                    assert_eq!(kernel[[y, x]], kernel[[y, width - 1 - x]]);
                    assert!(kernel[[y, x]] > 0. && kernel[[y, x]] <= 1.);
                }
            }

            assert_eq!(kernel[[0, 0]], 1.);
            assert_eq!(kernel[[height - 1, width - 1]], 1.);
            assert_eq!(kernel[[0, width - 1]], 1.);
            assert_eq!(kernel[[height - 1, 0]], 1.);
        }
    }

    #[test]
    fn test_kernel_decays_away_from_corners() {
        let kernel = lowpass_kernel(9, 9, 0.5);

        assert!(kernel[[4, 4]] < kernel[[2, 2]]);
        assert!(kernel[[2, 2]] < kernel[[1, 1]]);
        assert!((kernel[[4, 4]] - 1. / 32f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_filtering_is_linear() -> Result<(), ShapeError> {
        let mut rng = StdRng::seed_from_u64(7);
        let first = gaussian_noise_image((1, 2, 6, 7), 0., 1., &mut rng);
        let second = gaussian_noise_image((1, 2, 6, 7), 0., 1., &mut rng);
        let kernel = lowpass_kernel(6, 7, DEFAULT_SMOOTHING);

        let (a, b) = (2.5, -0.75);
        let combined = &first * a + &second * b;

        let filtered_combined = lowpass_filter_gradient(&combined, &kernel)?;
        let expected = lowpass_filter_gradient(&first, &kernel)? * a
            + lowpass_filter_gradient(&second, &kernel)? * b;

        assert_close(&filtered_combined, &expected, 1e-10);

        Ok(())
    }

    #[test]
    fn test_zero_smoothing_is_identity() -> Result<(), ShapeError> {
        let mut rng = StdRng::seed_from_u64(11);
        let gradient = gaussian_noise_image((1, 3, 5, 8), 0., 2., &mut rng);
        let kernel = lowpass_kernel(5, 8, 0.);

        assert_eq!(kernel, Array2::<f64>::ones((5, 8)));

        let filtered = lowpass_filter_gradient(&gradient, &kernel)?;
        assert_close(&filtered, &gradient, 1e-10);

        Ok(())
    }

    #[test]
    fn test_constant_gradient_is_scaled_by_inverse_mean() -> Result<(), ShapeError> {
        let gradient = Array4::<f64>::from_elem((1, 1, 6, 6), 3.);
        let kernel = lowpass_kernel(6, 6, 0.3);
        let mean = kernel.mean().unwrap();

        // only the zero frequency is present, its gain is 1 / mean
        let filtered = lowpass_filter_gradient(&gradient, &kernel)?;
        let expected = Array4::<f64>::from_elem((1, 1, 6, 6), 3. / mean);
        assert_close(&filtered, &expected, 1e-10);

        Ok(())
    }

    #[test]
    fn test_smoothing_removes_high_frequencies() -> Result<(), ShapeError> {
        // checkerboard only contains the highest frequency
        let gradient = Array4::<f64>::from_shape_fn((1, 1, 8, 8), |(_, _, y, x)| {
            if (x + y) % 2 == 0 { 1. } else { -1. }
        });
        let kernel = lowpass_kernel(8, 8, 0.5);

        let filtered = lowpass_filter_gradient(&gradient, &kernel)?;
        let energy = |array: &Array4<f64>| array.iter().map(|i| i * i).sum::<f64>();

        assert!(energy(&filtered) < energy(&gradient));

        Ok(())
    }

    #[test]
    fn test_reused_filter_matches_single_calls() -> Result<(), ShapeError> {
        let mut rng = StdRng::seed_from_u64(7);
        let kernel = lowpass_kernel(6, 9, DEFAULT_SMOOTHING);
        let filter = LowpassFilter::new(&kernel);

        assert_eq!(filter.dim(), (6, 9));
        assert!((filter.mask().mean().unwrap() - 1.).abs() < 1e-12);

        for batch in 1..4 {
            let gradient = gaussian_noise_image((batch, 2, 6, 9), 0., 1., &mut rng);

            let reused = filter.apply(&gradient)?;
            let single = lowpass_filter_gradient(&gradient, &kernel)?;
            assert_close(&reused, &single, 1e-12);
        }

        assert!(matches!(
            filter.apply(&Array4::<f64>::ones((1, 1, 9, 6))),
            Err(ShapeError::ImageShapeMismatch { .. })
        ));

        Ok(())
    }

    #[test]
    fn test_kernel_shape_mismatch() {
        let gradient = Array4::<f64>::ones((1, 1, 4, 4));
        let kernel = lowpass_kernel(4, 5, DEFAULT_SMOOTHING);

        assert!(matches!(
            lowpass_filter_gradient(&gradient, &kernel),
            Err(ShapeError::ImageShapeMismatch { .. })
        ));
    }
}
