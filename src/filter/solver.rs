//! Closed form spike-triggered average estimators.

use std::{fmt::{Display, Formatter}, str::FromStr};
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};
use crate::error::RegularizationError;


/// Regularization strategy used to compute a linear filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegularizationType {
    /// Spike-triggered average `X^T Y`
    Raw,
    /// Whitened spike-triggered average `(X^T X)^+ X^T Y`
    Whitened,
    /// Ridge regularized `(X^T X + λI)^+ X^T Y`
    Ridge,
    /// Laplace regularized `(X^T X + λL)^+ X^T Y` with `L` the discrete 2D laplacian
    Laplace,
}

impl RegularizationType {
    /// Whether the regularization factor changes the solution
    pub fn uses_factor(&self) -> bool {
        matches!(self, RegularizationType::Ridge | RegularizationType::Laplace)
    }
}

impl FromStr for RegularizationType {
    type Err = RegularizationError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(RegularizationType::Raw),
            "whitened" => Ok(RegularizationType::Whitened),
            "ridge" | "ridge regularized" => Ok(RegularizationType::Ridge),
            "laplace" | "laplace regularized" => Ok(RegularizationType::Laplace),
            _ => Err(RegularizationError::UnknownRegularizationType(string.to_string())),
        }
    }
}

impl Display for RegularizationType {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let name = match self {
            RegularizationType::Raw => "raw",
            RegularizationType::Whitened => "whitened",
            RegularizationType::Ridge => "ridge regularized",
            RegularizationType::Laplace => "laplace regularized",
        };

        write!(f, "{}", name)
    }
}

/// Moore-Penrose pseudo-inverse, singular values below
/// `max(rows, cols) * eps * largest singular value` are treated as zero
pub fn pseudo_inverse(matrix: &ArrayView2<f64>) -> Result<Array2<f64>, RegularizationError> {
    let (rows, cols) = matrix.dim();
    if rows == 0 || cols == 0 {
        return Ok(Array2::zeros((cols, rows)));
    }

    let dense = DMatrix::from_row_iterator(rows, cols, matrix.iter().copied());
    let svd = dense.svd(true, true);

    let largest = svd.singular_values.iter().copied().fold(0., f64::max);
    let tolerance = rows.max(cols) as f64 * f64::EPSILON * largest;

    let inverse = svd.pseudo_inverse(tolerance)
        .map_err(|_| RegularizationError::SingularSystem)?;

    Ok(Array2::from_shape_fn((inverse.nrows(), inverse.ncols()), |(i, j)| inverse[(i, j)]))
}

/// Discrete laplace operator over a `dim1` by `dim2` grid, `4` on the diagonal and `-1`
/// for every existing up, down, left and right neighbor
///
/// Rows are placed at `x * dim1 + y`, which is only the flattened pixel index when
/// `dim1 == dim2`, for non square grids only a subset of the pixels is regularized
/// as intended, cells sharing a row keep the stencil of the last cell and rows that
/// fall outside of the grid are left out
pub fn laplace_bias(dim1: usize, dim2: usize) -> Array2<f64> {
    let size = dim1 * dim2;
    let mut bias = Array2::<f64>::zeros((size, size));

    if dim1 != dim2 {
        log::warn!(
            "Laplace regularization is only correct for square images, a {}x{} grid is only partially regularized",
            dim1, dim2,
        );
    }

    for x in 0..dim1 {
        for y in 0..dim2 {
            let row = x * dim1 + y;
            if row >= size {
                continue;
            }

            let index = |i: usize, j: usize| i * dim2 + j;

            // a later cell mapped to the same row replaces the earlier stencil
            bias.row_mut(row).fill(0.);
            bias[[row, index(x, y)]] = 4.;
            if x > 0 {
                bias[[row, index(x - 1, y)]] = -1.;
            }
            if x + 1 < dim1 {
                bias[[row, index(x + 1, y)]] = -1.;
            }
            if y > 0 {
                bias[[row, index(x, y - 1)]] = -1.;
            }
            if y + 1 < dim2 {
                bias[[row, index(x, y + 1)]] = -1.;
            }
        }
    }

    bias
}

/// Block diagonal laplace penalty, one [`laplace_bias`] block per channel
pub fn channel_laplace_bias(channels: usize, dim1: usize, dim2: usize) -> Array2<f64> {
    let block = laplace_bias(dim1, dim2);
    let size = dim1 * dim2;
    let mut bias = Array2::<f64>::zeros((channels * size, channels * size));

    for channel in 0..channels {
        let start = channel * size;
        bias.slice_mut(ndarray::s![start..start + size, start..start + size])
            .assign(&block);
    }

    bias
}

/// Design matrix shared by every solve, `X` as `(images, pixels)` with `X^T X`
/// computed once
#[derive(Debug, Clone)]
pub struct Design {
    images: Array2<f64>,
    gram: Array2<f64>,
    laplace: Option<Array2<f64>>,
}

impl Design {
    pub fn new(images: Array2<f64>) -> Self {
        let gram = images.t().dot(&images);

        Design { images, gram, laplace: None }
    }

    /// Precomputes the laplace penalty for the given grid
    pub fn with_laplace(mut self, channels: usize, dim1: usize, dim2: usize) -> Self {
        self.laplace = Some(channel_laplace_bias(channels, dim1, dim2));

        self
    }

    /// Flattened images `(images, pixels)`
    pub fn images(&self) -> &Array2<f64> {
        &self.images
    }

    /// `X^T X`
    pub fn gram(&self) -> &Array2<f64> {
        &self.gram
    }

    /// Penalized normal matrix inverse `(X^T X + λP)^+` for the given strategy, `None`
    /// for the raw estimator which has no normal matrix
    pub fn normal_inverse(&self, reg_type: RegularizationType, factor: f64) -> Result<Option<Array2<f64>>, RegularizationError> {
        let normal = match reg_type {
            RegularizationType::Raw => return Ok(None),
            RegularizationType::Whitened => self.gram.clone(),
            RegularizationType::Ridge => {
                let mut normal = self.gram.clone();
                normal.diag_mut().mapv_inplace(|value| value + factor);

                normal
            },
            RegularizationType::Laplace => {
                let pixels = self.gram.nrows();
                let penalty = match &self.laplace {
                    Some(laplace) => laplace.clone(),
                    None => {
                        // square grid with a single channel is the only layout we can infer
                        let side = (pixels as f64).sqrt().round() as usize;
                        laplace_bias(side, pixels / side.max(1))
                    },
                };

                &self.gram + &(penalty * factor)
            },
        };

        pseudo_inverse(&normal.view()).map(Some)
    }

    /// Solves for the `(pixels, neurons)` filter of the given responses
    pub fn solve(&self, reg_type: RegularizationType, responses: &ArrayView2<f64>, factor: f64) -> Result<Array2<f64>, RegularizationError> {
        let cross = self.images.t().dot(responses);

        match self.normal_inverse(reg_type, factor)? {
            Some(inverse) => Ok(inverse.dot(&cross)),
            None => Ok(cross),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use super::{laplace_bias, pseudo_inverse, RegularizationType};

    #[test]
    fn test_pseudo_inverse_of_invertible_matrix() {
        let matrix = array![[2., 0.], [0., 4.]];
        let inverse = pseudo_inverse(&matrix.view()).unwrap();

        assert!((inverse[[0, 0]] - 0.5).abs() < 1e-12);
        assert!((inverse[[1, 1]] - 0.25).abs() < 1e-12);
        assert!(inverse[[0, 1]].abs() < 1e-12);
    }

    #[test]
    fn test_pseudo_inverse_of_singular_matrix() {
        let matrix = array![[1., 1.], [1., 1.]];
        let inverse = pseudo_inverse(&matrix.view()).unwrap();

        for value in inverse.iter() {
            assert!((value - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_square_laplace_rows() {
        let bias = laplace_bias(3, 3);

        // corner pixel has two neighbors
        assert_eq!(bias.row(0).sum(), 2.);
        // center pixel has four neighbors
        assert_eq!(bias.row(4).sum(), 0.);
        assert_eq!(bias[[4, 4]], 4.);
        assert_eq!(bias[[4, 1]], -1.);
        assert_eq!(bias[[4, 3]], -1.);
        assert_eq!(bias[[4, 5]], -1.);
        assert_eq!(bias[[4, 7]], -1.);
        assert_eq!(bias, bias.t());
    }

    #[test]
    fn test_wide_laplace_rows_are_overwritten() {
        let bias = laplace_bias(2, 3);

        // cells (0, 2) and (1, 0) both land on row 2, the later one is kept
        assert_eq!(bias.row(2).to_vec(), vec![-1., 0., 0., 4., -1., 0.]);
        assert_eq!(bias.row(0).to_vec(), vec![4., -1., 0., -1., 0., 0.]);
        assert!(bias.row(5).iter().all(|value| *value == 0.));
    }

    #[test]
    fn test_tall_laplace_rows_are_skipped() {
        let bias = laplace_bias(3, 2);

        assert_eq!(bias.dim(), (6, 6));
        // cells (2, 0) and (2, 1) map to rows 6 and 7, outside of the grid
        assert!(bias.row(2).iter().all(|value| *value == 0.));
        assert!(bias.row(5).iter().all(|value| *value == 0.));
        assert_eq!(bias.row(3).to_vec(), vec![-1., 0., 4., -1., -1., 0.]);
        assert_eq!(bias.row(4).to_vec(), vec![0., -1., -1., 4., 0., -1.]);
    }

    #[test]
    fn test_parse_regularization_type() {
        assert_eq!("ridge regularized".parse::<RegularizationType>().unwrap(), RegularizationType::Ridge);
        assert_eq!("Laplace".parse::<RegularizationType>().unwrap(), RegularizationType::Laplace);
        assert!("lasso".parse::<RegularizationType>().is_err());
    }
}
