//! Frequency domain lowpass filtering of image gradients, used to keep gradient
//! ascent from converging to high frequency patterns (Walker et al. 2019).

use std::sync::Arc;
use ndarray::{Array2, Array4, ArrayView2, ArrayViewMut2, Axis, Zip};
use num_complex::Complex;
use rustfft::{Fft, FftDirection, FftPlanner};
use crate::error::ShapeError;


/// Default smoothing exponent (alpha)
pub const DEFAULT_SMOOTHING: f64 = 0.1;

/// Builds the `height` by `width` lowpass mask where entry `(y, x)` is
/// `1 / max(1, (min(x, W-1-x)^2 + min(y, H-1-y)^2)^alpha)`, the mask is `1.` at the
/// zero frequency corner and decays with distance from the nearest corner
pub fn lowpass_kernel(height: usize, width: usize, smoothing: f64) -> Array2<f64> {
    Array2::from_shape_fn((height, width), |(y, x)| {
        let tw = x.min(width - 1 - x) as f64;
        let th = y.min(height - 1 - y) as f64;

        1. / (tw.powi(2) + th.powi(2)).powf(smoothing).max(1.)
    })
}

/// Lowpass mask normalized by its mean along with the FFT plans for its plane size,
/// built once and reused for every gradient of a run
#[derive(Clone)]
pub struct LowpassFilter {
    mask: Array2<f64>,
    row_forward: Arc<dyn Fft<f64>>,
    row_inverse: Arc<dyn Fft<f64>>,
    col_forward: Arc<dyn Fft<f64>>,
    col_inverse: Arc<dyn Fft<f64>>,
}

impl LowpassFilter {
    /// Normalizes the mask by its mean so the average gain is `1.` and plans the
    /// transforms for its `(height, width)`
    pub fn new(lowpass: &Array2<f64>) -> Self {
        let (height, width) = lowpass.dim();
        let mask = lowpass / lowpass.mean().unwrap_or(1.);

        // empty planes are never transformed
        let mut planner = FftPlanner::new();

        LowpassFilter {
            mask,
            row_forward: planner.plan_fft_forward(width.max(1)),
            row_inverse: planner.plan_fft_inverse(width.max(1)),
            col_forward: planner.plan_fft_forward(height.max(1)),
            col_inverse: planner.plan_fft_inverse(height.max(1)),
        }
    }

    /// Filter for a `height` by `width` plane with the mask from [`lowpass_kernel`]
    pub fn from_shape(height: usize, width: usize, smoothing: f64) -> Self {
        LowpassFilter::new(&lowpass_kernel(height, width, smoothing))
    }

    pub fn dim(&self) -> (usize, usize) {
        self.mask.dim()
    }

    /// Mean normalized mask
    pub fn mask(&self) -> &Array2<f64> {
        &self.mask
    }

    fn transform_2d(&self, data: &mut ArrayViewMut2<Complex<f64>>, direction: FftDirection) {
        let (row_fft, col_fft) = match direction {
            FftDirection::Forward => (&self.row_forward, &self.col_forward),
            FftDirection::Inverse => (&self.row_inverse, &self.col_inverse),
        };

        for mut row in data.axis_iter_mut(Axis(0)) {
            let mut buffer: Vec<Complex<f64>> = row.to_vec();
            row_fft.process(&mut buffer);
            row.iter_mut().zip(buffer).for_each(|(dst, src)| *dst = src);
        }

        for mut col in data.axis_iter_mut(Axis(1)) {
            let mut buffer: Vec<Complex<f64>> = col.to_vec();
            col_fft.process(&mut buffer);
            col.iter_mut().zip(buffer).for_each(|(dst, src)| *dst = src);
        }
    }

    fn filter_plane(&self, plane: &ArrayView2<f64>) -> Array2<f64> {
        let (height, width) = plane.dim();
        let mut spectrum = plane.mapv(|value| Complex::new(value, 0.));

        self.transform_2d(&mut spectrum.view_mut(), FftDirection::Forward);
        Zip::from(&mut spectrum)
            .and(&self.mask)
            .for_each(|value, &gain| *value *= gain);
        self.transform_2d(&mut spectrum.view_mut(), FftDirection::Inverse);

        // rustfft does not normalize the inverse transform
        let scale = 1. / (height * width) as f64;

        // imaginary residue is discarded
        spectrum.mapv(|value| value.re * scale)
    }

    /// Applies the mask to every `(height, width)` plane of a 4D gradient in the
    /// frequency domain
    pub fn apply(&self, gradient: &Array4<f64>) -> Result<Array4<f64>, ShapeError> {
        let (batch, channels, height, width) = gradient.dim();
        if self.mask.dim() != (height, width) {
            return Err(ShapeError::ImageShapeMismatch {
                expected: vec![batch, channels, self.mask.nrows(), self.mask.ncols()],
                found: gradient.shape().to_vec(),
            });
        }
        if height == 0 || width == 0 {
            return Ok(gradient.clone());
        }

        let mut filtered = Array4::<f64>::zeros(gradient.raw_dim());

        for b in 0..batch {
            for c in 0..channels {
                let plane = gradient.index_axis(Axis(0), b);
                let plane = plane.index_axis(Axis(0), c);

                let output = self.filter_plane(&plane);

                filtered.index_axis_mut(Axis(0), b)
                    .index_axis_mut(Axis(0), c)
                    .assign(&output);
            }
        }

        Ok(filtered)
    }
}

/// Applies the lowpass mask to every `(height, width)` plane of a 4D gradient in the
/// frequency domain, the mask is first divided by its mean so the average gain is `1.`
///
/// Use [`LowpassFilter`] directly to filter many gradients with the same mask
pub fn lowpass_filter_gradient(gradient: &Array4<f64>, lowpass: &Array2<f64>) -> Result<Array4<f64>, ShapeError> {
    LowpassFilter::new(lowpass).apply(gradient)
}
