use ndarray::{Array1, Array4, Axis, Zip};
use crate::error::{InvariancesError, ShapeError};
use crate::filter::FilterTensor;


/// Encoding model scoring how strongly each neuron responds to an image
///
/// Implementations must be deterministic for a fixed parameter state and are only read
/// during optimization, the same model is shared by every neuron being optimized
pub trait ScoringModel: Send + Sync {
    /// Number of neurons the model predicts
    fn neuron_count(&self) -> usize;
    /// Predicted activation of every neuron for a `(1, channels, height, width)` image
    fn forward(&self, image: &Array4<f64>) -> Result<Array1<f64>, InvariancesError>;
    /// Gradient of the selected neuron's activation with respect to the image,
    /// same shape as the image
    fn backward(&self, image: &Array4<f64>, neuron: usize) -> Result<Array4<f64>, InvariancesError>;
}

/// Scoring model whose activations are the dot products of the image with linear
/// receptive fields, for instance filters computed by [`crate::filter::LinearFilter`]
#[derive(Debug, Clone)]
pub struct LinearScoringModel {
    filters: Array4<f64>,
    bias: Option<Array1<f64>>,
}

impl LinearScoringModel {
    pub fn new(filter: &FilterTensor) -> Self {
        LinearScoringModel { filters: filter.to_grid(), bias: None }
    }

    /// Adds a constant offset per neuron, offsets do not change the gradient
    pub fn with_bias(mut self, bias: Array1<f64>) -> Result<Self, ShapeError> {
        if bias.len() != self.filters.len_of(Axis(0)) {
            return Err(ShapeError::FilterShapeMismatch {
                expected: vec![self.filters.len_of(Axis(0))],
                found: vec![bias.len()],
            });
        }
        self.bias = Some(bias);

        Ok(self)
    }

    fn check_image(&self, image: &Array4<f64>) -> Result<(), ShapeError> {
        let (_, channels, height, width) = self.filters.dim();
        if image.dim() != (1, channels, height, width) {
            return Err(ShapeError::ImageShapeMismatch {
                expected: vec![1, channels, height, width],
                found: image.shape().to_vec(),
            });
        }

        Ok(())
    }
}

impl ScoringModel for LinearScoringModel {
    fn neuron_count(&self) -> usize {
        self.filters.len_of(Axis(0))
    }

    fn forward(&self, image: &Array4<f64>) -> Result<Array1<f64>, InvariancesError> {
        self.check_image(image)?;
        let image = image.index_axis(Axis(0), 0);

        let mut activations: Array1<f64> = self.filters.axis_iter(Axis(0))
            .map(|receptive_field| {
                let mut total = 0.;
                Zip::from(&receptive_field)
                    .and(&image)
                    .for_each(|weight, pixel| total += weight * pixel);

                total
            })
            .collect();

        if let Some(bias) = &self.bias {
            activations += bias;
        }

        Ok(activations)
    }

    fn backward(&self, image: &Array4<f64>, neuron: usize) -> Result<Array4<f64>, InvariancesError> {
        self.check_image(image)?;
        if neuron >= self.neuron_count() {
            return Err(crate::error::MeiError::NeuronIndexOutOfRange {
                neuron,
                neuron_count: self.neuron_count(),
            }.into());
        }

        Ok(self.filters.index_axis(Axis(0), neuron).to_owned().insert_axis(Axis(0)))
    }
}
