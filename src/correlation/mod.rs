//! Pearson correlation between predicted and recorded responses.

use std::{collections::BTreeMap, result::Result};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use crate::error::ShapeError;


/// Pearson correlation of predicted and recorded responses keyed by neuron index
pub type CorrelationTable = BTreeMap<usize, f64>;

fn mean(values: &ArrayView1<f64>) -> f64 {
    values.sum() / values.len() as f64
}

fn sum_of_squares(values: &ArrayView1<f64>, values_mean: f64) -> f64 {
    values.iter()
        .map(|i| (i - values_mean).powf(2.0))
        .sum()
}

/// Calculates the Pearson correlation coefficient given two arrays of the same length (if standard
/// deviation of either of the arrays is 0, `f64::NAN` is returned)
pub fn pearsonr(x: &ArrayView1<f64>, y: &ArrayView1<f64>) -> Result<f64, ShapeError> {
    if x.len() != y.len() {
        return Err(ShapeError::SampleCountMismatch { images: x.len(), responses: y.len() });
    }
    if x.is_empty() {
        return Err(ShapeError::EmptyInput);
    }

    let x_mean: f64 = mean(x);
    let y_mean: f64 = mean(y);

    let numerator: f64 = x.iter().zip(y.iter())
        .map(|(i, j)| (i - x_mean) * (j - y_mean))
        .sum();

    let denominator: f64 = (sum_of_squares(x, x_mean) * sum_of_squares(y, y_mean)).powf(0.5);

    Ok(numerator / denominator) // nan when either variance is 0
}

/// Correlation over every element of both matrices taken in row-major order
pub fn flattened_pearsonr(prediction: &ArrayView2<f64>, responses: &ArrayView2<f64>) -> Result<f64, ShapeError> {
    if prediction.dim() != responses.dim() {
        return Err(ShapeError::SampleCountMismatch {
            images: prediction.nrows(),
            responses: responses.nrows(),
        });
    }

    let x: Array1<f64> = prediction.iter().copied().collect();
    let y: Array1<f64> = responses.iter().copied().collect();

    pearsonr(&x.view(), &y.view())
}

/// One correlation per column (neuron) of `(samples, neurons)` matrices
pub fn columnwise_pearsonr(prediction: &ArrayView2<f64>, responses: &ArrayView2<f64>) -> Result<Array1<f64>, ShapeError> {
    if prediction.dim() != responses.dim() {
        return Err(ShapeError::SampleCountMismatch {
            images: prediction.nrows(),
            responses: responses.nrows(),
        });
    }

    prediction.axis_iter(Axis(1))
        .zip(responses.axis_iter(Axis(1)))
        .map(|(pred, resp)| pearsonr(&pred, &resp))
        .collect::<Result<Vec<f64>, ShapeError>>()
        .map(Array1::from)
}
