use thiserror::Error;

/// A result type for probabilistic model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// An error when using a probabilistic model or composing models
#[derive(Error, Debug)]
pub enum ModelError {
    /// When new data widths disagree with the widths established by a model
    #[error("Dimension mismatch of {what}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// When a model is asked for a prediction mode it cannot provide
    #[error("Unsupported capability: {model} does not support {capability}")]
    UnsupportedCapability {
        model: String,
        capability: &'static str,
    },
    /// When structural preconditions on arrays are violated
    #[error("Shape assertion error: {0}")]
    ShapeAssertion(String),
    /// When hyperparameters optimization does not succeed
    #[error("Optimization failure: {0}")]
    OptimizationFailure(String),
    /// When a tag is absent from a tagged mapping
    #[error("Missing tag {tag:?} in {registry}")]
    MissingTag { tag: String, registry: &'static str },
    /// When no constructor is registered for a model kind
    #[error("Unknown model kind: {0}")]
    UnknownModelKind(String),
    /// When ndarray fails to build or concatenate arrays
    #[error(transparent)]
    InvalidShape(#[from] ndarray::ShapeError),
}
