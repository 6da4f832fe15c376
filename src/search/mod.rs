//! Hyperparameter searches selecting the regularization factor of linear filters by
//! their correlation on held out data, either one factor shared by every neuron or
//! one factor per neuron.

use std::cmp::Ordering;
use ndarray::{Array2, Axis};
use crate::context::ExecutionContext;
use crate::error::{InvariancesError, RegularizationError, ShapeError};
use crate::filter::{Evaluation, FilterTensor, LinearFilter, Regularization};
use crate::mei::linspace;
use crate::persistence::ArraySink;


/// Candidate factors `10^x` for `x` in `linspace(0, 2, 7)`
pub fn default_factors() -> Vec<f64> {
    linspace(0., 2., 7).into_iter()
        .map(|exponent| 10f64.powf(exponent))
        .collect()
}

/// Whether a single factor is selected for all neurons or one per neuron
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchGranularity {
    /// One factor for every neuron, scored by the correlation over all neurons
    Global,
    /// One factor per neuron, scored by each neuron's own correlation
    Individual,
}

impl std::str::FromStr for SearchGranularity {
    type Err = RegularizationError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(SearchGranularity::Global),
            "individual" => Ok(SearchGranularity::Individual),
            _ => Err(RegularizationError::UnknownGranularity(string.to_string())),
        }
    }
}

/// Correlation of every candidate factor for every neuron
#[derive(Debug, Clone)]
pub struct SearchTable {
    /// Candidate factors in the order they were tried
    pub factors: Vec<f64>,
    /// `(neurons, candidates)` correlations on the validation data
    pub correlations: Array2<f64>,
    /// Granularity the table was produced with
    pub granularity: SearchGranularity,
}

/// Factor selected for a single neuron
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Neuron index
    pub neuron: usize,
    /// Selected regularization factor
    pub factor: f64,
    /// Validation correlation reached with the selected factor
    pub correlation: f64,
}

/// Selected factors for every neuron and their average correlation
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// One row per neuron in neuron order
    pub results: Vec<SearchResult>,
    /// Mean of the per neuron best correlations, `NaN` correlations are skipped
    pub avg_correlation: f64,
    /// Granularity of the search
    pub granularity: SearchGranularity,
}

fn compare_candidates(a: (f64, f64), b: (f64, f64)) -> Ordering {
    // (correlation, factor): higher correlation wins, NaN never wins, ties go to the smaller factor
    match (a.0.is_nan(), b.0.is_nan()) {
        (true, true) => b.1.total_cmp(&a.1),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.0.total_cmp(&b.0).then_with(|| b.1.total_cmp(&a.1)),
    }
}

impl SearchTable {
    /// Selects the factor with the highest correlation for each neuron, when several
    /// factors reach the same correlation the smallest factor is selected
    pub fn compute_best_parameter(&self) -> SearchOutcome {
        let results: Vec<SearchResult> = self.correlations.axis_iter(Axis(0))
            .enumerate()
            .map(|(neuron, row)| {
                let (correlation, factor) = row.iter()
                    .zip(self.factors.iter())
                    .map(|(correlation, factor)| (*correlation, *factor))
                    .max_by(|a, b| compare_candidates(*a, *b))
                    .unwrap_or((f64::NAN, f64::NAN));

                SearchResult { neuron, factor, correlation }
            })
            .collect();

        let finite: Vec<f64> = results.iter()
            .map(|result| result.correlation)
            .filter(|correlation| !correlation.is_nan())
            .collect();
        let avg_correlation = if finite.is_empty() {
            f64::NAN
        } else {
            finite.iter().sum::<f64>() / finite.len() as f64
        };

        SearchOutcome { results, avg_correlation, granularity: self.granularity }
    }
}

impl SearchOutcome {
    /// Factors to train the final filter with, the shared factor for a global search
    /// and one factor per neuron for an individual search
    pub fn parameters(&self) -> Regularization {
        match self.granularity {
            SearchGranularity::Global => Regularization::Global(
                self.results.first().map(|result| result.factor).unwrap_or(f64::NAN)
            ),
            SearchGranularity::Individual => Regularization::Individual(
                self.results.iter().map(|result| result.factor).collect()
            ),
        }
    }

    /// Results ordered from highest to lowest correlation
    pub fn sorted_descending(&self) -> Vec<SearchResult> {
        let mut sorted = self.results.clone();
        sorted.sort_by(|a, b| compare_candidates((b.correlation, b.factor), (a.correlation, a.factor)));

        sorted
    }

    /// `(neurons, 3)` array with columns neuron, factor and correlation
    pub fn to_array(&self) -> Array2<f64> {
        let mut array = Array2::<f64>::zeros((self.results.len(), 3));
        for (mut row, result) in array.axis_iter_mut(Axis(0)).zip(self.results.iter()) {
            row[0] = result.neuron as f64;
            row[1] = result.factor;
            row[2] = result.correlation;
        }

        array
    }

    /// Stores the report array with a readme describing its columns
    pub fn persist<S: ArraySink + ?Sized>(&self, sink: &S) -> Result<(), InvariancesError> {
        sink.store_array("hyperparametersearch_report", &self.to_array().into_dyn())?;
        sink.store_text(
            "readme.txt",
            "hyperparametersearch_report contains a 2D array, where column one represents the \
            neurons, column two the regularization factor and column three the single neuron \
            correlation of the filter prediction and the real responses.\n",
        )?;
        sink.store_text("average_correlation.txt", &self.avg_correlation.to_string())?;

        Ok(())
    }
}

/// Sweeps candidate regularization factors, training on one filter and scoring on another
/// built from held out data
pub struct HyperparameterSearch<'a> {
    train: &'a LinearFilter,
    validation: &'a LinearFilter,
    factors: Vec<f64>,
    granularity: SearchGranularity,
}

impl<'a> HyperparameterSearch<'a> {
    /// Creates a search, both filters must describe the same neurons and pixel grid
    pub fn new(
        train: &'a LinearFilter,
        validation: &'a LinearFilter,
        factors: Vec<f64>,
        granularity: SearchGranularity,
    ) -> Result<Self, InvariancesError> {
        if factors.is_empty() {
            return Err(ShapeError::EmptyInput.into());
        }
        if let Some(factor) = factors.iter().find(|factor| !(**factor >= 0.)) {
            return Err(RegularizationError::NegativeFactor(*factor).into());
        }

        let (train_shape, validation_shape) = (train.shape(), validation.shape());
        if train_shape != validation_shape {
            return Err(ShapeError::FilterShapeMismatch {
                expected: vec![train_shape.neurons, train_shape.channels, train_shape.height, train_shape.width],
                found: vec![
                    validation_shape.neurons, validation_shape.channels,
                    validation_shape.height, validation_shape.width,
                ],
            }.into());
        }

        Ok(HyperparameterSearch { train, validation, factors, granularity })
    }

    /// Search for one factor shared by every neuron
    pub fn global(train: &'a LinearFilter, validation: &'a LinearFilter, factors: Vec<f64>) -> Result<Self, InvariancesError> {
        HyperparameterSearch::new(train, validation, factors, SearchGranularity::Global)
    }

    /// Search for one factor per neuron
    pub fn individual(train: &'a LinearFilter, validation: &'a LinearFilter, factors: Vec<f64>) -> Result<Self, InvariancesError> {
        HyperparameterSearch::new(train, validation, factors, SearchGranularity::Individual)
    }

    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    pub fn granularity(&self) -> SearchGranularity {
        self.granularity
    }

    /// Trains and scores every candidate factor
    pub fn conduct_search(&self, context: &ExecutionContext) -> Result<SearchTable, InvariancesError> {
        let neurons = self.train.neuron_count();
        let mut correlations = Array2::<f64>::zeros((neurons, self.factors.len()));

        log::info!(
            "Beginning {:?} hyperparameter search over {} factors",
            self.granularity, self.factors.len(),
        );

        for (counter, factor) in self.factors.iter().enumerate() {
            if context.cancellation.is_cancelled() {
                log::warn!("Hyperparameter search cancelled after {} of {} factors", counter, self.factors.len());

                return Err(InvariancesError::Cancelled);
            }

            match self.granularity {
                SearchGranularity::Global => {
                    let filter = self.train.train_with(&Regularization::Global(*factor), context)?;
                    let prediction = self.validation.predict(&filter, false)?;

                    correlations.column_mut(counter).fill(prediction.correlation);
                    log::debug!("Factor {}: correlation {}", factor, prediction.correlation);
                },
                SearchGranularity::Individual => {
                    let filter = self.train.train_with(&Regularization::Individual(vec![*factor; neurons]), context)?;
                    let prediction = self.validation.predict(&filter, true)?;

                    let single = prediction.single_neuron_correlations.unwrap_or_default();
                    for (neuron, correlation) in single.into_iter().enumerate() {
                        correlations[[neuron, counter]] = correlation;
                    }
                    log::debug!("Factor {}: correlation {}", factor, prediction.correlation);
                },
            }
        }

        log::info!("Hyperparameter search concluded");

        Ok(SearchTable {
            factors: self.factors.clone(),
            correlations,
            granularity: self.granularity,
        })
    }
}

/// Linear receptive fields fitted with the best regularization found on held out data
#[derive(Debug, Clone)]
pub struct ReceptiveFieldFit {
    /// Selected factors per neuron
    pub outcome: SearchOutcome,
    /// Filter retrained on the training data with the selected factors
    pub filter: FilterTensor,
    /// Evaluation of that filter on the validation data
    pub evaluation: Evaluation,
}

/// Searches the candidate factors, retrains the filter on the training data with
/// the selected factors and evaluates it on the validation data
pub fn fit_receptive_fields(
    train: &LinearFilter,
    validation: &LinearFilter,
    factors: Vec<f64>,
    granularity: SearchGranularity,
    context: &ExecutionContext,
) -> Result<ReceptiveFieldFit, InvariancesError> {
    let search = HyperparameterSearch::new(train, validation, factors, granularity)?;
    let outcome = search.conduct_search(context)?.compute_best_parameter();

    log::info!("Best average correlation on validation data: {}", outcome.avg_correlation);

    let filter = train.train_with(&outcome.parameters(), context)?;
    let evaluation = validation.evaluate(&filter)?;

    Ok(ReceptiveFieldFit { outcome, filter, evaluation })
}
