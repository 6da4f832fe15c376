//! Most exciting images (MEIs), images synthesized by gradient ascent to maximize the
//! predicted activation of a single model neuron.
//!
//! Every ascent step normalizes the image by its maximum, lowpass filters the gradient
//! in the frequency domain, adds it with a rate scaled by the mean absolute gradient
//! and blurs the result with a small gaussian kernel. Learning rate and blur sigma
//! are annealed linearly over the epochs.

use ndarray::Array4;
use rayon::prelude::*;
mod blur;
mod model;
pub use blur::{gaussian_blur, gaussian_kernel, KERNEL_SIZE};
pub use model::{LinearScoringModel, ScoringModel};
use crate::context::{CancellationToken, ExecutionContext};
use crate::error::{InvariancesError, MeiError, ShapeError};
use crate::persistence::ArraySink;
use crate::spectral::{LowpassFilter, DEFAULT_SMOOTHING};


/// Added to the mean absolute gradient to avoid dividing by zero
pub const GRADIENT_EPSILON: f64 = 1e-12;

/// Settings of a single gradient ascent step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AscentStep {
    /// Learning rate
    pub learning_rate: f64,
    /// Standard deviation of the gaussian blur applied after the update
    pub sigma: f64,
    /// Additional gain, the update is scaled by `step_gain / 255`
    pub step_gain: f64,
}

impl Default for AscentStep {
    fn default() -> Self {
        AscentStep { learning_rate: 1.5, sigma: 0.5, step_gain: 1. }
    }
}

/// Image after a gradient ascent step along with the activation that was ascended
#[derive(Debug, Clone)]
pub struct AscentOutcome {
    /// Updated image
    pub image: Array4<f64>,
    /// Activation of the neuron for the normalized image before the update
    pub activation: f64,
}

fn is_finite(array: &Array4<f64>) -> bool {
    array.iter().all(|value| value.is_finite())
}

/// Performs one step of gradient ascent on the image for the given neuron
///
/// - `model` : scoring model providing activations and gradients
///
/// - `neuron` : index of the neuron to maximize
///
/// - `image` : current `(1, channels, height, width)` image, consumed by the step
///
/// - `lowpass` : [`LowpassFilter`] matching the image plane
///
/// - `step` : learning rate, blur sigma and step gain
pub fn gradient_ascent_step<M: ScoringModel + ?Sized>(
    model: &M,
    neuron: usize,
    mut image: Array4<f64>,
    lowpass: &LowpassFilter,
    step: &AscentStep,
) -> Result<AscentOutcome, InvariancesError> {
    let maximum = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    image.mapv_inplace(|value| value / maximum);

    let activations = model.forward(&image)?;
    let activation = *activations.get(neuron)
        .ok_or(MeiError::NeuronIndexOutOfRange { neuron, neuron_count: activations.len() })?;

    let gradient = model.backward(&image, neuron)?;
    if gradient.dim() != image.dim() {
        return Err(ShapeError::ImageShapeMismatch {
            expected: image.shape().to_vec(),
            found: gradient.shape().to_vec(),
        }.into());
    }

    let filtered = lowpass.apply(&gradient)?;

    // rate comes from the raw gradient while the direction comes from the filtered one
    let mean_magnitude = gradient.iter().map(|value| value.abs()).sum::<f64>() / gradient.len() as f64;
    let rate = step.learning_rate / (mean_magnitude + GRADIENT_EPSILON) * (step.step_gain / 255.);

    image.scaled_add(rate, &filtered);

    Ok(AscentOutcome { image: gaussian_blur(&image, step.sigma), activation })
}

/// `count` evenly spaced values from `start` to `end` inclusive (the last value is
/// exactly `end`), a single value is `start`
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let last = count - 1;

            (0..count)
                .map(|i| if i == last { end } else { start + (end - start) * i as f64 / last as f64 })
                .collect()
        }
    }
}

/// Settings for computing most exciting images
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeiParameters {
    /// Number of ascent steps per neuron
    pub epochs: usize,
    /// Learning rate of the first step
    pub lr_start: f64,
    /// Learning rate of the last step
    pub lr_end: f64,
    /// Blur sigma of the first step
    pub sigma_start: f64,
    /// Blur sigma of the last step
    pub sigma_end: f64,
    /// Gain of every step
    pub step_gain: f64,
    /// Smoothing exponent (alpha) of the lowpass mask
    pub smoothing: f64,
}

impl Default for MeiParameters {
    fn default() -> Self {
        MeiParameters {
            epochs: 200,
            lr_start: 1.,
            lr_end: 0.0001,
            sigma_start: 1.,
            sigma_end: 0.05,
            step_gain: 1.,
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

impl MeiParameters {
    /// Learning rate and sigma for every epoch
    pub fn schedule(&self) -> Vec<AscentStep> {
        linspace(self.lr_start, self.lr_end, self.epochs).into_iter()
            .zip(linspace(self.sigma_start, self.sigma_end, self.epochs))
            .map(|(learning_rate, sigma)| AscentStep { learning_rate, sigma, step_gain: self.step_gain })
            .collect()
    }
}

/// Optimized image of a single neuron
#[derive(Debug, Clone)]
pub struct MeiImage {
    /// Neuron the image was optimized for
    pub neuron: usize,
    /// Final `(1, channels, height, width)` image
    pub image: Array4<f64>,
    /// Activation of the neuron for the final image
    pub activation: f64,
}

/// Results of a batch of most exciting image optimizations, one entry per requested
/// neuron in request order, a failed neuron does not affect the others
#[derive(Debug)]
pub struct MeiReport {
    pub outcomes: Vec<(usize, Result<MeiImage, InvariancesError>)>,
}

impl MeiReport {
    /// Successfully optimized images
    pub fn images(&self) -> impl Iterator<Item = &MeiImage> {
        self.outcomes.iter().filter_map(|(_, outcome)| outcome.as_ref().ok())
    }

    /// Neurons whose optimization failed and why
    pub fn failures(&self) -> impl Iterator<Item = (usize, &InvariancesError)> {
        self.outcomes.iter().filter_map(|(neuron, outcome)| outcome.as_ref().err().map(|err| (*neuron, err)))
    }

    pub fn get(&self, neuron: usize) -> Option<&Result<MeiImage, InvariancesError>> {
        self.outcomes.iter()
            .find(|(current, _)| *current == neuron)
            .map(|(_, outcome)| outcome)
    }

    /// Stores every successful image as `MEI_neuron_{n}` with a readme describing the layout
    pub fn persist<S: ArraySink + ?Sized>(&self, sink: &S) -> Result<(), InvariancesError> {
        for mei in self.images() {
            sink.store_array(&format!("MEI_neuron_{}", mei.neuron), &mei.image.clone().into_dyn())?;
        }

        sink.store_text(
            "readme.md",
            "# Most Exciting Images\n\
            The MEIs (Most Exciting Images) store the 4D representation of the image per neuron. \
            Dimensions are (batchsize, channels, height, width).\n",
        )?;

        Ok(())
    }
}

/// Computes most exciting images for a set of neurons of a scoring model
pub struct MeiOptimizer<'a, M: ScoringModel + ?Sized> {
    model: &'a M,
    parameters: MeiParameters,
}

impl<'a, M: ScoringModel + ?Sized> MeiOptimizer<'a, M> {
    pub fn new(model: &'a M, parameters: MeiParameters) -> Self {
        MeiOptimizer { model, parameters }
    }

    pub fn parameters(&self) -> &MeiParameters {
        &self.parameters
    }

    fn optimize_neuron(
        &self,
        neuron: usize,
        seed: &Array4<f64>,
        lowpass: &LowpassFilter,
        schedule: &[AscentStep],
        cancellation: &CancellationToken,
    ) -> Result<MeiImage, InvariancesError> {
        log::debug!("Starting MEI optimization for neuron {}", neuron);

        // every neuron starts from its own copy of the seed
        let mut image = seed.clone();

        for (epoch, step) in schedule.iter().enumerate() {
            if cancellation.is_cancelled() {
                return Err(MeiError::Cancelled { neuron, epoch }.into());
            }

            let outcome = gradient_ascent_step(self.model, neuron, image, lowpass, step)?;
            if !is_finite(&outcome.image) || !outcome.activation.is_finite() {
                log::warn!("Neuron {} diverged at epoch {}, aborting its optimization", neuron, epoch);

                return Err(MeiError::NumericInstability { neuron, epoch }.into());
            }

            image = outcome.image;
        }

        let activation = self.model.forward(&image)?
            .get(neuron)
            .copied()
            .ok_or(MeiError::NeuronIndexOutOfRange { neuron, neuron_count: self.model.neuron_count() })?;

        log::info!("Finished MEI for neuron {}, activation: {}", neuron, activation);

        Ok(MeiImage { neuron, image, activation })
    }

    /// Optimizes the seed image independently for every neuron
    ///
    /// Invalid settings (no epochs, a seed that is not a single non-zero image or a neuron
    /// the model does not have) fail the whole batch, divergence or cancellation only
    /// fail the affected neuron
    pub fn run(&self, seed: &Array4<f64>, neurons: &[usize], context: &ExecutionContext) -> Result<MeiReport, InvariancesError> {
        if self.parameters.epochs == 0 {
            return Err(MeiError::ZeroEpochs.into());
        }

        let (batch, _, height, width) = seed.dim();
        if batch != 1 || seed.is_empty() || !is_finite(seed) || seed.iter().all(|value| *value == 0.) {
            return Err(MeiError::InvalidImage.into());
        }

        let neuron_count = self.model.neuron_count();
        if let Some(&neuron) = neurons.iter().find(|neuron| **neuron >= neuron_count) {
            return Err(MeiError::NeuronIndexOutOfRange { neuron, neuron_count }.into());
        }

        let lowpass = LowpassFilter::from_shape(height, width, self.parameters.smoothing);
        let schedule = self.parameters.schedule();
        let cancellation = &context.cancellation;

        log::info!(
            "Computing MEIs for {} neurons over {} epochs ({:?})",
            neurons.len(), self.parameters.epochs, context.device,
        );

        let optimize = |neuron: &usize| {
            (*neuron, self.optimize_neuron(*neuron, seed, &lowpass, &schedule, cancellation))
        };

        let outcomes: Vec<(usize, Result<MeiImage, InvariancesError>)> = if context.is_parallel() {
            context.install(|| neurons.par_iter().map(optimize).collect())
        } else {
            neurons.iter().map(optimize).collect()
        };

        Ok(MeiReport { outcomes })
    }
}
