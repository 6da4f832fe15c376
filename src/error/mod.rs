use std::fmt::{Display, Debug, Formatter, Result};


/// Error set for array shapes that cannot be used together
pub enum ShapeError {
    /// Number of images does not match number of response rows
    SampleCountMismatch { images: usize, responses: usize },
    /// Filter was expected to be 4D `(neurons, channels, height, width)`
    FilterNotFourDimensional(usize),
    /// Filter does not match the pixel grid or neuron count it is used with
    FilterShapeMismatch { expected: Vec<usize>, found: Vec<usize> },
    /// Image does not match the shape expected by a model or lowpass mask
    ImageShapeMismatch { expected: Vec<usize>, found: Vec<usize> },
    /// Number of individual regularization factors does not match neuron count
    RegularizationCountMismatch { expected: usize, found: usize },
    /// Input has no samples, pixels or neurons
    EmptyInput,
}

impl Display for ShapeError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ShapeError::SampleCountMismatch { images, responses } => write!(
                f, "Image count ({}) does not match response count ({})", images, responses
            ),
            ShapeError::FilterNotFourDimensional(ndim) => write!(
                f, "Filter was expected to be 4D but has {} dimensions", ndim
            ),
            ShapeError::FilterShapeMismatch { expected, found } => write!(
                f, "Filter shape mismatch, expected {:?} but found {:?}", expected, found
            ),
            ShapeError::ImageShapeMismatch { expected, found } => write!(
                f, "Image shape mismatch, expected {:?} but found {:?}", expected, found
            ),
            ShapeError::RegularizationCountMismatch { expected, found } => write!(
                f, "Expected {} regularization factors (one per neuron) but found {}", expected, found
            ),
            ShapeError::EmptyInput => write!(f, "Input must not be empty"),
        }
    }
}

impl Debug for ShapeError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

/// Error set for regularization settings
pub enum RegularizationError {
    /// Regularization type is not one of raw, whitened, ridge or laplace
    UnknownRegularizationType(String),
    /// Search granularity is not one of global or individual
    UnknownGranularity(String),
    /// Regularization factors must be non-negative
    NegativeFactor(f64),
    /// Singular value decomposition of the normal matrix failed
    SingularSystem,
}

impl Display for RegularizationError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            RegularizationError::UnknownRegularizationType(name) => write!(
                f,
                "No valid type option '{}', options are 'laplace regularized', 'ridge regularized', 'whitened' and 'raw'",
                name
            ),
            RegularizationError::UnknownGranularity(name) => write!(
                f, "No valid granularity option '{}', options are 'global' and 'individual'", name
            ),
            RegularizationError::NegativeFactor(factor) => write!(
                f, "Regularization factor must be non-negative, found {}", factor
            ),
            RegularizationError::SingularSystem => write!(f, "Pseudo-inverse of normal matrix could not be computed"),
        }
    }
}

impl Debug for RegularizationError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

/// Error set for most exciting image optimization, errors for a single neuron
/// do not stop optimization of the remaining neurons
#[derive(Clone, PartialEq)]
pub enum MeiError {
    /// Scoring model does not have the requested neuron
    NeuronIndexOutOfRange { neuron: usize, neuron_count: usize },
    /// Image or gradient became `NaN` or infinite
    NumericInstability { neuron: usize, epoch: usize },
    /// Optimization was cancelled at an iteration boundary
    Cancelled { neuron: usize, epoch: usize },
    /// At least one epoch is required
    ZeroEpochs,
    /// Image must be 4D `(1, channels, height, width)` and not all zero
    InvalidImage,
}

impl Display for MeiError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            MeiError::NeuronIndexOutOfRange { neuron, neuron_count } => write!(
                f, "Neuron {} is out of range for model with {} neurons", neuron, neuron_count
            ),
            MeiError::NumericInstability { neuron, epoch } => write!(
                f, "Image for neuron {} diverged at epoch {}", neuron, epoch
            ),
            MeiError::Cancelled { neuron, epoch } => write!(
                f, "Optimization for neuron {} cancelled at epoch {}", neuron, epoch
            ),
            MeiError::ZeroEpochs => write!(f, "Epoch count must be at least 1"),
            MeiError::InvalidImage => write!(f, "Image must be a non-zero (1, channels, height, width) array"),
        }
    }
}

impl Debug for MeiError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

/// Error set for storing and loading arrays and reports
pub enum PersistenceError {
    /// Underlying file system error
    Io(std::io::Error),
    /// Shape sidecar could not be (de)serialized
    Json(serde_json::Error),
    /// Csv report could not be written
    Csv(csv::Error),
    /// Number of stored values does not match the shape sidecar
    ShapeFileMismatch { expected: usize, found: usize },
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            PersistenceError::Io(err) => write!(f, "{}", err),
            PersistenceError::Json(err) => write!(f, "{}", err),
            PersistenceError::Csv(err) => write!(f, "{}", err),
            PersistenceError::ShapeFileMismatch { expected, found } => write!(
                f, "Shape file describes {} values but {} were stored", expected, found
            ),
        }
    }
}

impl Debug for PersistenceError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> PersistenceError {
        PersistenceError::Io(err)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> PersistenceError {
        PersistenceError::Json(err)
    }
}

impl From<csv::Error> for PersistenceError {
    fn from(err: csv::Error) -> PersistenceError {
        PersistenceError::Csv(err)
    }
}

/// Error set for reading configuration files
pub enum ConfigError {
    /// Configuration file could not be read
    Io(std::io::Error),
    /// Configuration file is not valid
    Toml(toml::de::Error),
    /// A required table or key is missing
    Missing(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            ConfigError::Io(err) => write!(f, "Cannot read config: {}", err),
            ConfigError::Toml(err) => write!(f, "Cannot parse config: {}", err),
            ConfigError::Missing(key) => write!(f, "Config is missing '{}'", key),
        }
    }
}

impl Debug for ConfigError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> ConfigError {
        ConfigError::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> ConfigError {
        ConfigError::Toml(err)
    }
}

/// A set of errors that may occur when using the library
pub enum InvariancesError {
    /// Errors related to array shapes
    ShapeRelatedError(ShapeError),
    /// Errors related to regularization
    RegularizationRelatedError(RegularizationError),
    /// Errors related to most exciting image optimization
    MeiRelatedError(MeiError),
    /// Errors related to persistence
    PersistenceRelatedError(PersistenceError),
    /// Errors related to configuration
    ConfigRelatedError(ConfigError),
    /// Work was stopped through the execution context's cancellation token
    Cancelled,
}

impl Display for InvariancesError {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            InvariancesError::ShapeRelatedError(err) => write!(f, "{}", err),
            InvariancesError::RegularizationRelatedError(err) => write!(f, "{}", err),
            InvariancesError::MeiRelatedError(err) => write!(f, "{}", err),
            InvariancesError::PersistenceRelatedError(err) => write!(f, "{}", err),
            InvariancesError::ConfigRelatedError(err) => write!(f, "{}", err),
            InvariancesError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl Debug for InvariancesError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "file: {}, line: {}, error: {}", file!(), line!(), self)
    }
}

impl std::error::Error for InvariancesError {}

impl From<ShapeError> for InvariancesError {
    fn from(err: ShapeError) -> InvariancesError {
        InvariancesError::ShapeRelatedError(err)
    }
}

impl From<RegularizationError> for InvariancesError {
    fn from(err: RegularizationError) -> InvariancesError {
        InvariancesError::RegularizationRelatedError(err)
    }
}

impl From<MeiError> for InvariancesError {
    fn from(err: MeiError) -> InvariancesError {
        InvariancesError::MeiRelatedError(err)
    }
}

impl From<PersistenceError> for InvariancesError {
    fn from(err: PersistenceError) -> InvariancesError {
        InvariancesError::PersistenceRelatedError(err)
    }
}

impl From<ConfigError> for InvariancesError {
    fn from(err: ConfigError) -> InvariancesError {
        InvariancesError::ConfigRelatedError(err)
    }
}

impl From<std::io::Error> for InvariancesError {
    fn from(err: std::io::Error) -> InvariancesError {
        InvariancesError::PersistenceRelatedError(PersistenceError::Io(err))
    }
}
