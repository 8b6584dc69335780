use tagbo_models::ModelError;
use thiserror::Error;

/// A result type for acquisition building and batch construction
pub type Result<T> = std::result::Result<T, AcquisitionError>;

/// An error when building, updating or optimizing acquisition functions
#[derive(Error, Debug)]
pub enum AcquisitionError {
    /// When a builder requires a tag absent from the models or datasets mapping
    #[error("Missing tag {tag:?} in {registry}")]
    MissingTag { tag: String, registry: &'static str },
    /// When arguments given to a builder or a rule are not valid
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// When the acquisition optimizer cannot find a maximizer
    #[error("Acquisition optimization failure: {0}")]
    OptimizationFailure(String),
    /// When the observer fails to evaluate query points
    #[error("Observer error: {0}")]
    ObserverError(String),
    /// When a model operation fails
    #[error(transparent)]
    ModelError(#[from] ModelError),
    /// When ndarray fails to build or concatenate arrays
    #[error(transparent)]
    InvalidShape(#[from] ndarray::ShapeError),
}
