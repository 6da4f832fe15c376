//! # Neural Invariances
//!
//! `neural_invariances` is a package for probing what visual neurons (or models of them)
//! respond to. It implements two complementary tools:
//!
//! - Most exciting images (MEIs), images synthesized by gradient ascent on a scoring
//! model so that a single neuron's predicted activation is maximized. Gradients are
//! lowpass filtered in the frequency domain and the image is blurred between steps
//! so that the ascent converges to interpretable structure instead of high frequency
//! patterns.
//!
//! - Linear receptive field estimation, closed form spike-triggered average estimators
//! (raw, whitened, ridge and laplace regularized) fitted from paired images and
//! responses, with hyperparameter searches selecting regularization factors either
//! globally or per neuron by their correlation on held out data.
//!
//! Any encoding model can be used for MEIs by implementing [`mei::ScoringModel`],
//! fitted linear receptive fields can be used directly through
//! [`mei::LinearScoringModel`].
//!
//! ## Example Code
//!
//! ### Fitting receptive fields and computing their most exciting images
//!
//! ```rust
//! use neural_invariances::{
//!     context::{Device, ExecutionContext},
//!     distribution::{gaussian_noise_image, synthetic_dataset},
//!     error::InvariancesError,
//!     filter::{LinearFilter, RegularizationType},
//!     mei::{LinearScoringModel, MeiOptimizer, MeiParameters},
//!     search::{default_factors, fit_receptive_fields, SearchGranularity},
//! };
//!
//! fn main() -> Result<(), InvariancesError> {
//!     let mut context = ExecutionContext::new(Device::Sequential, 42);
//!     let dataset = synthetic_dataset(200, 50, 3, 6, 6, 0.5, &mut context.rng);
//!
//!     let train = LinearFilter::global(
//!         &dataset.train_images, dataset.train_responses, RegularizationType::Ridge, None,
//!     )?;
//!     let validation = LinearFilter::global(
//!         &dataset.validation_images, dataset.validation_responses, RegularizationType::Ridge, None,
//!     )?;
//!
//!     // selects one factor for all neurons by validation correlation
//!     let fit = fit_receptive_fields(
//!         &train, &validation, default_factors(), SearchGranularity::Global, &context,
//!     )?;
//!     assert!(fit.outcome.avg_correlation > 0.5);
//!
//!     let model = LinearScoringModel::new(&fit.filter);
//!     let parameters = MeiParameters { epochs: 20, ..MeiParameters::default() };
//!     let seed = gaussian_noise_image((1, 1, 6, 6), 0., 1., &mut context.rng);
//!
//!     let report = MeiOptimizer::new(&model, parameters).run(&seed, &[0, 1, 2], &context)?;
//!     assert_eq!(report.images().count(), 3);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod correlation;
pub mod distribution;
pub mod error;
pub mod filter;
pub mod mei;
pub mod persistence;
pub mod search;
pub mod spectral;
