//! Tools to generate noise images and synthetic stimulus/response datasets.

use ndarray::{Array2, Array4};
use rand::Rng;
use rand_distr::{Normal, StandardNormal, Distribution};


/// Draws a `(batch, channels, height, width)` white noise image from the normal distribution
/// at the given mean and standard deviation, if standard deviation is `0.` (or not a valid
/// standard deviation) the mean is used everywhere
pub fn gaussian_noise_image<R: Rng>(shape: (usize, usize, usize, usize), mean: f64, std: f64, rng: &mut R) -> Array4<f64> {
    let normal = match Normal::new(mean, std) {
        Ok(normal) if std > 0. => normal,
        _ => return Array4::from_elem(shape, mean),
    };

    Array4::from_shape_simple_fn(shape, || normal.sample(rng))
}

/// White noise stimuli with responses produced by known linear receptive fields
pub struct SyntheticDataset {
    /// Training images `(images, 1, height, width)`
    pub train_images: Array4<f64>,
    /// Training responses `(images, neurons)`
    pub train_responses: Array2<f64>,
    /// Held out images `(images, 1, height, width)`
    pub validation_images: Array4<f64>,
    /// Held out responses `(images, neurons)`
    pub validation_responses: Array2<f64>,
    /// Ground truth receptive fields `(neurons, 1, height, width)`
    pub filters: Array4<f64>,
}

fn to_grid(flat: &Array2<f64>, height: usize, width: usize) -> Array4<f64> {
    Array4::from_shape_fn(
        (flat.nrows(), 1, height, width),
        |(i, _, y, x)| flat[[i, y * width + x]],
    )
}

fn noisy_projection<R: Rng>(images: &Array2<f64>, filters: &Array2<f64>, noise_std: f64, rng: &mut R) -> Array2<f64> {
    let mut responses = images.dot(&filters.t());

    if let Ok(noise) = Normal::new(0., noise_std) {
        responses.mapv_inplace(|value| value + noise.sample(rng));
    }

    responses
}

fn white_noise<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f64> {
    Array2::from_shape_simple_fn((rows, cols), || StandardNormal.sample(rng))
}

/// Generates training and validation sets from random ground truth filters, responses
/// are the filter projections plus gaussian noise with standard deviation `noise_std`
pub fn synthetic_dataset<R: Rng>(
    train_count: usize,
    validation_count: usize,
    neurons: usize,
    height: usize,
    width: usize,
    noise_std: f64,
    rng: &mut R,
) -> SyntheticDataset {
    let pixels = height * width;

    let filters = white_noise(neurons, pixels, rng);
    let train_images = white_noise(train_count, pixels, rng);
    let validation_images = white_noise(validation_count, pixels, rng);

    let train_responses = noisy_projection(&train_images, &filters, noise_std, rng);
    let validation_responses = noisy_projection(&validation_images, &filters, noise_std, rng);

    SyntheticDataset {
        train_images: to_grid(&train_images, height, width),
        train_responses,
        validation_images: to_grid(&validation_images, height, width),
        validation_responses,
        filters: to_grid(&filters, height, width),
    }
}
