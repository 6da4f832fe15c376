//! Linear filters to estimate the linear receptive field of neurons from paired
//! image and response recordings, computed as regularized spike-triggered averages.

use std::{collections::BTreeMap, sync::Arc};
use ndarray::{Array2, Array4, Axis, s};
use rayon::prelude::*;
mod solver;
mod tensor;
pub use solver::{
    Design, RegularizationType, channel_laplace_bias, laplace_bias, pseudo_inverse,
};
pub use tensor::{FilterShape, FilterTensor};
use crate::context::ExecutionContext;
use crate::correlation::{CorrelationTable, columnwise_pearsonr, flattened_pearsonr};
use crate::error::{InvariancesError, RegularizationError, ShapeError};
use crate::persistence::ArraySink;


/// Factor used when no regularization factor is given
pub const DEFAULT_REGULARIZATION_FACTOR: f64 = 10.;

/// Regularization factor(s) applied when computing filters
#[derive(Debug, Clone, PartialEq)]
pub enum Regularization {
    /// One factor for every neuron, every neuron is solved at once
    Global(f64),
    /// One factor per neuron, each neuron is solved on its own
    Individual(Vec<f64>),
}

impl Regularization {
    fn check(&self, neuron_count: usize) -> Result<(), InvariancesError> {
        let factors: &[f64] = match self {
            Regularization::Global(factor) => std::slice::from_ref(factor),
            Regularization::Individual(factors) => {
                if factors.len() != neuron_count {
                    return Err(ShapeError::RegularizationCountMismatch {
                        expected: neuron_count,
                        found: factors.len(),
                    }.into());
                }

                factors
            },
        };

        match factors.iter().find(|factor| !(**factor >= 0.)) {
            Some(factor) => Err(RegularizationError::NegativeFactor(*factor).into()),
            None => Ok(()),
        }
    }

    /// Factor used for the given neuron
    pub fn factor_for(&self, neuron: usize) -> Option<f64> {
        match self {
            Regularization::Global(factor) => Some(*factor),
            Regularization::Individual(factors) => factors.get(neuron).copied(),
        }
    }
}

/// Predicted responses of a filter and how well they match the recorded responses
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Predicted `(images, neurons)` responses
    pub responses: Array2<f64>,
    /// Correlation over all neurons and images
    pub correlation: f64,
    /// Correlation per neuron, only computed when requested
    pub single_neuron_correlations: Option<Vec<f64>>,
}

/// Report of a filter evaluated against the recorded responses
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Correlation of predicted and recorded responses per neuron
    pub correlations: CorrelationTable,
    /// Evaluated filter `(neurons, channels, height, width)`
    pub filter: Array4<f64>,
}

impl Evaluation {
    /// Average of the per neuron correlations
    pub fn average_correlation(&self) -> f64 {
        self.correlations.values().sum::<f64>() / self.correlations.len() as f64
    }

    /// Stores `Correlations.csv`, the evaluated filter and a readme describing its layout,
    /// when `store_images` is set every receptive field is also stored on its own as
    /// `Filter_neuron_{n}`
    pub fn persist<S: ArraySink + ?Sized>(&self, sink: &S, store_images: bool) -> Result<(), InvariancesError> {
        sink.store_correlations("Correlations.csv", &self.correlations)?;
        sink.store_array("evaluated_filter", &self.filter.clone().into_dyn())?;
        sink.store_text(
            "readme.txt",
            &format!(
                "evaluated_filter contains a 4D representation of a linear filter used to estimate \
                the linear receptive field of neurons.\nThe dimensions are: (neuron, channels, dim1, dim2): {:?}",
                self.filter.shape(),
            ),
        )?;

        if store_images {
            for (neuron, receptive_field) in self.filter.axis_iter(Axis(0)).enumerate() {
                sink.store_array(
                    &format!("figures/Filter_neuron_{}", neuron),
                    &receptive_field.to_owned().into_dyn(),
                )?;
            }
        }

        log::info!("Stored evaluated filter of shape {:?}", self.filter.shape());

        Ok(())
    }
}

/// Flattens `(images, channels, height, width)` into `(images, channels * height * width)`
/// with the same pixel order as [`FilterTensor::to_flat`]
pub fn flatten_images(images: &Array4<f64>) -> Array2<f64> {
    let (count, channels, height, width) = images.dim();
    let plane = height * width;

    Array2::from_shape_fn((count, channels * plane), |(image, pixel)| {
        images[[image, pixel / plane, (pixel % plane) / width, pixel % width]]
    })
}

/// Linear filter estimator over a fixed set of images and responses
///
/// The regularization strategy is fixed at construction while factors can be swapped
/// for every call to [`LinearFilter::train_with`], which is what the hyperparameter
/// searches rely on
#[derive(Debug, Clone)]
pub struct LinearFilter {
    design: Arc<Design>,
    responses: Array2<f64>,
    shape: FilterShape,
    reg_type: RegularizationType,
    regularization: Regularization,
}

impl LinearFilter {
    /// Creates a filter from `(images, channels, height, width)` images and `(images, neurons)`
    /// responses
    pub fn new(
        images: &Array4<f64>,
        responses: Array2<f64>,
        reg_type: RegularizationType,
        regularization: Regularization,
    ) -> Result<Self, InvariancesError> {
        let (count, channels, height, width) = images.dim();

        if count != responses.nrows() {
            return Err(ShapeError::SampleCountMismatch { images: count, responses: responses.nrows() }.into());
        }
        if count == 0 || responses.ncols() == 0 || channels * height * width == 0 {
            return Err(ShapeError::EmptyInput.into());
        }

        let shape = FilterShape { neurons: responses.ncols(), channels, height, width };
        regularization.check(shape.neurons)?;

        let mut design = Design::new(flatten_images(images));
        if reg_type == RegularizationType::Laplace {
            design = design.with_laplace(channels, height, width);
        }

        Ok(LinearFilter {
            design: Arc::new(design),
            responses,
            shape,
            reg_type,
            regularization,
        })
    }

    /// Filter where a single factor regularizes every neuron, defaults to a factor of `10.`
    pub fn global(
        images: &Array4<f64>,
        responses: Array2<f64>,
        reg_type: RegularizationType,
        factor: Option<f64>,
    ) -> Result<Self, InvariancesError> {
        let factor = factor.unwrap_or(DEFAULT_REGULARIZATION_FACTOR);

        LinearFilter::new(images, responses, reg_type, Regularization::Global(factor))
    }

    /// Filter where every neuron has its own factor, defaults to `10.` for every neuron
    pub fn individual(
        images: &Array4<f64>,
        responses: Array2<f64>,
        reg_type: RegularizationType,
        factors: Option<Vec<f64>>,
    ) -> Result<Self, InvariancesError> {
        let factors = factors.unwrap_or_else(|| vec![DEFAULT_REGULARIZATION_FACTOR; responses.ncols()]);

        LinearFilter::new(images, responses, reg_type, Regularization::Individual(factors))
    }

    pub fn shape(&self) -> FilterShape {
        self.shape
    }

    pub fn neuron_count(&self) -> usize {
        self.shape.neurons
    }

    pub fn image_count(&self) -> usize {
        self.responses.nrows()
    }

    pub fn reg_type(&self) -> RegularizationType {
        self.reg_type
    }

    pub fn regularization(&self) -> &Regularization {
        &self.regularization
    }

    pub fn responses(&self) -> &Array2<f64> {
        &self.responses
    }

    /// Computes the filter with the factors given at construction
    pub fn train(&self, context: &ExecutionContext) -> Result<FilterTensor, InvariancesError> {
        self.train_with(&self.regularization, context)
    }

    /// Computes the filter with the given factors, a global factor solves every neuron
    /// at once while individual factors solve one response column per neuron
    pub fn train_with(&self, regularization: &Regularization, context: &ExecutionContext) -> Result<FilterTensor, InvariancesError> {
        regularization.check(self.shape.neurons)?;

        let flat = match regularization {
            Regularization::Global(factor) => {
                log::debug!("Training {} filter with global factor {}", self.reg_type, factor);

                self.design.solve(self.reg_type, &self.responses.view(), *factor)?
            },
            Regularization::Individual(factors) => self.train_individual(factors, context)?,
        };

        Ok(FilterTensor::from_flat(flat, self.shape.channels, self.shape.height, self.shape.width)?)
    }

    fn train_individual(&self, factors: &[f64], context: &ExecutionContext) -> Result<Array2<f64>, InvariancesError> {
        // neurons sharing a factor share the same normal matrix inverse
        let mut groups: BTreeMap<u64, Vec<usize>> = BTreeMap::new();
        for (neuron, factor) in factors.iter().enumerate() {
            let key = if self.reg_type.uses_factor() { factor.to_bits() } else { 0 };
            groups.entry(key).or_default().push(neuron);
        }
        let groups: Vec<(f64, Vec<usize>)> = groups.into_iter()
            .map(|(key, neurons)| (f64::from_bits(key), neurons))
            .collect();

        log::debug!(
            "Training {} filter for {} neurons with {} distinct factors",
            self.reg_type, factors.len(), groups.len(),
        );

        let solve_group = |(factor, neurons): &(f64, Vec<usize>)| -> Result<Vec<(usize, Array2<f64>)>, RegularizationError> {
            let inverse = self.design.normal_inverse(self.reg_type, *factor)?;

            Ok(neurons.iter()
                .map(|&neuron| {
                    let response = self.responses.slice(s![.., neuron..neuron + 1]);
                    let cross = self.design.images().t().dot(&response);

                    let column = match &inverse {
                        Some(inverse) => inverse.dot(&cross),
                        None => cross,
                    };

                    (neuron, column)
                })
                .collect())
        };

        let solved: Vec<Vec<(usize, Array2<f64>)>> = if context.is_parallel() {
            context.install(|| {
                groups.par_iter()
                    .map(solve_group)
                    .collect::<Result<Vec<_>, RegularizationError>>()
            })?
        } else {
            groups.iter()
                .map(solve_group)
                .collect::<Result<Vec<_>, RegularizationError>>()?
        };

        let mut filters = Array2::<f64>::zeros((self.shape.pixels(), self.shape.neurons));
        for (neuron, column) in solved.into_iter().flatten() {
            filters.column_mut(neuron).assign(&column.column(0));
        }

        Ok(filters)
    }

    fn check_filter(&self, filter: &FilterTensor) -> Result<(), ShapeError> {
        let found = filter.shape();

        if found.pixels() != self.shape.pixels() || found.neurons != self.shape.neurons {
            return Err(ShapeError::FilterShapeMismatch {
                expected: vec![self.shape.neurons, self.shape.channels, self.shape.height, self.shape.width],
                found: vec![found.neurons, found.channels, found.height, found.width],
            });
        }

        Ok(())
    }

    /// Predicts responses as `X · filter` and correlates them with the recorded responses,
    /// set `single_neuron_correlation` to also compute one correlation per neuron
    pub fn predict(&self, filter: &FilterTensor, single_neuron_correlation: bool) -> Result<Prediction, InvariancesError> {
        self.check_filter(filter)?;

        let responses = self.design.images().dot(&filter.to_flat());
        let correlation = flattened_pearsonr(&responses.view(), &self.responses.view())?;

        let single_neuron_correlations = if single_neuron_correlation {
            Some(columnwise_pearsonr(&responses.view(), &self.responses.view())?.to_vec())
        } else {
            None
        };

        Ok(Prediction { responses, correlation, single_neuron_correlations })
    }

    /// Computes the per neuron correlation table of a filter
    pub fn evaluate(&self, filter: &FilterTensor) -> Result<Evaluation, InvariancesError> {
        let prediction = self.predict(filter, true)?;

        let correlations: CorrelationTable = prediction.single_neuron_correlations
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .collect();

        log::info!(
            "Evaluated {} filter over {} neurons, overall correlation {:.4}",
            self.reg_type, correlations.len(), prediction.correlation,
        );

        Ok(Evaluation { correlations, filter: filter.to_grid() })
    }
}
