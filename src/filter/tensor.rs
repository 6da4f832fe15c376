use ndarray::{Array2, Array3, Array4, ArrayD, Axis, Ix4};
use crate::error::ShapeError;


/// Dimensions of a set of linear filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterShape {
    /// Number of neurons (one filter each)
    pub neurons: usize,
    /// Image channels
    pub channels: usize,
    /// Image height (dim1)
    pub height: usize,
    /// Image width (dim2)
    pub width: usize,
}

impl FilterShape {
    /// Length of a flattened filter, `channels * height * width`
    pub fn pixels(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn grid_dim(&self) -> (usize, usize, usize, usize) {
        (self.neurons, self.channels, self.height, self.width)
    }
}

/// Linear filters stored either as a grid `(neurons, channels, height, width)` or
/// flattened as `(pixels, neurons)`, flattened pixels are ordered channel, row, column
///
/// Conversions are pure and exact, converting to the other representation and back
/// yields the same values
#[derive(Debug, Clone, PartialEq)]
pub enum FilterTensor {
    /// 4D representation `(neurons, channels, height, width)`
    Grid(Array4<f64>),
    /// 2D representation `(pixels, neurons)` with the grid dimensions it came from
    Flat { data: Array2<f64>, shape: FilterShape },
}

impl FilterTensor {
    /// Wraps a dynamically shaped array, which must be 4D
    pub fn from_dyn(array: ArrayD<f64>) -> Result<Self, ShapeError> {
        let ndim = array.ndim();

        array.into_dimensionality::<Ix4>()
            .map(FilterTensor::Grid)
            .map_err(|_| ShapeError::FilterNotFourDimensional(ndim))
    }

    /// Wraps a flattened `(pixels, neurons)` filter, pixels must equal
    /// `channels * height * width`
    pub fn from_flat(data: Array2<f64>, channels: usize, height: usize, width: usize) -> Result<Self, ShapeError> {
        let shape = FilterShape { neurons: data.ncols(), channels, height, width };

        if data.nrows() != shape.pixels() {
            return Err(ShapeError::FilterShapeMismatch {
                expected: vec![shape.pixels(), shape.neurons],
                found: data.shape().to_vec(),
            });
        }

        Ok(FilterTensor::Flat { data, shape })
    }

    pub fn shape(&self) -> FilterShape {
        match self {
            FilterTensor::Grid(grid) => {
                let (neurons, channels, height, width) = grid.dim();

                FilterShape { neurons, channels, height, width }
            },
            FilterTensor::Flat { shape, .. } => *shape,
        }
    }

    /// Flattened `(pixels, neurons)` representation
    pub fn to_flat(&self) -> Array2<f64> {
        match self {
            FilterTensor::Flat { data, .. } => data.clone(),
            FilterTensor::Grid(grid) => {
                let shape = self.shape();
                let plane = shape.height * shape.width;

                Array2::from_shape_fn((shape.pixels(), shape.neurons), |(pixel, neuron)| {
                    let channel = pixel / plane;
                    let y = (pixel % plane) / shape.width;
                    let x = pixel % shape.width;

                    grid[[neuron, channel, y, x]]
                })
            }
        }
    }

    /// Grid `(neurons, channels, height, width)` representation
    pub fn to_grid(&self) -> Array4<f64> {
        match self {
            FilterTensor::Grid(grid) => grid.clone(),
            FilterTensor::Flat { data, shape } => {
                let plane = shape.height * shape.width;

                Array4::from_shape_fn(shape.grid_dim(), |(neuron, channel, y, x)| {
                    data[[channel * plane + y * shape.width + x, neuron]]
                })
            }
        }
    }

    /// Converts into the flattened representation
    pub fn into_flat(self) -> Self {
        match self {
            FilterTensor::Flat { .. } => self,
            FilterTensor::Grid(_) => {
                let shape = self.shape();

                FilterTensor::Flat { data: self.to_flat(), shape }
            }
        }
    }

    /// Converts into the grid representation
    pub fn into_grid(self) -> Self {
        match self {
            FilterTensor::Grid(_) => self,
            FilterTensor::Flat { .. } => FilterTensor::Grid(self.to_grid()),
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, FilterTensor::Flat { .. })
    }

    /// Receptive field `(channels, height, width)` of a single neuron
    pub fn neuron(&self, neuron: usize) -> Option<Array3<f64>> {
        if neuron >= self.shape().neurons {
            return None;
        }

        match self {
            FilterTensor::Grid(grid) => Some(grid.index_axis(Axis(0), neuron).to_owned()),
            FilterTensor::Flat { .. } => Some(self.to_grid().index_axis(Axis(0), neuron).to_owned()),
        }
    }
}
