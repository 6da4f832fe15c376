use ndarray::{Array4, Axis};


/// Size of the gaussian kernel used between ascent steps
pub const KERNEL_SIZE: usize = 3;

/// Normalized 1D gaussian weights for offsets `-1`, `0` and `1`
pub fn gaussian_kernel(sigma: f64) -> [f64; KERNEL_SIZE] {
    let sigma = sigma.max(f64::EPSILON);
    let weights = [-1., 0., 1.].map(|x: f64| (-0.5 * (x / sigma).powi(2)).exp());
    let total: f64 = weights.iter().sum();

    weights.map(|weight| weight / total)
}

// reflect padding without repeating the edge, a length 1 axis reflects onto itself
fn reflect(index: isize, len: usize) -> usize {
    let last = len as isize - 1;
    if last == 0 {
        return 0;
    }

    let reflected = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };

    reflected.clamp(0, last) as usize
}

fn blur_along(image: &Array4<f64>, kernel: &[f64; KERNEL_SIZE], axis: Axis) -> Array4<f64> {
    let len = image.len_of(axis);
    let mut output = Array4::<f64>::zeros(image.raw_dim());

    for ((b, c, y, x), value) in output.indexed_iter_mut() {
        let center = if axis == Axis(2) { y } else { x };

        *value = kernel.iter()
            .enumerate()
            .map(|(k, weight)| {
                let source = reflect(center as isize + k as isize - 1, len);
                let sample = if axis == Axis(2) {
                    image[[b, c, source, x]]
                } else {
                    image[[b, c, y, source]]
                };

                weight * sample
            })
            .sum();
    }

    output
}

/// Blurs every channel of a `(batch, channels, height, width)` image with a separable
/// 3 by 3 gaussian kernel using reflect padding
pub fn gaussian_blur(image: &Array4<f64>, sigma: f64) -> Array4<f64> {
    let kernel = gaussian_kernel(sigma);

    let vertical = blur_along(image, &kernel, Axis(2));

    blur_along(&vertical, &kernel, Axis(3))
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;
    use super::{gaussian_blur, gaussian_kernel, reflect};

    #[test]
    fn test_kernel_is_normalized_and_symmetric() {
        for sigma in [0.05, 0.5, 1., 3.] {
            let kernel = gaussian_kernel(sigma);

            assert!((kernel.iter().sum::<f64>() - 1.).abs() < 1e-12);
            assert!((kernel[0] - kernel[2]).abs() < 1e-15);
            assert!(kernel[1] >= kernel[0]);
        }
    }

    #[test]
    fn test_reflect_indices() {
        assert_eq!(reflect(-1, 4), 1);
        assert_eq!(reflect(4, 4), 2);
        assert_eq!(reflect(2, 4), 2);
        assert_eq!(reflect(-1, 1), 0);
    }

    #[test]
    fn test_constant_image_is_unchanged() {
        let image = Array4::<f64>::from_elem((1, 2, 4, 5), 0.7);
        let blurred = gaussian_blur(&image, 1.);

        assert!(blurred.iter().all(|i| (i - 0.7).abs() < 1e-12));
    }
}
