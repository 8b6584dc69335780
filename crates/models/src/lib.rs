//! This library defines the model side of the tagged Bayesian optimization framework:
//!
//! * [`Dataset`] and [`Tag`]: training data and the keys addressing (model, dataset) pairs,
//! * [`ProbabilisticModel`] and [`TrainableProbabilisticModel`]: capabilities a surrogate
//!   wrapper implements to be used by acquisition builders and trained by the optimization loop,
//! * [`ModelStack`]: composition of independently trained models into a single multi-output
//!   model, outputs being concatenated in constructor order,
//! * [`ModelRegistry`]: an explicit dispatch table to build models from configurations.
//!
//! Concrete surrogate models (gaussian processes, variational models...) live outside this
//! crate: any type implementing the capability traits can be tagged and stacked.
//!
//! # Example
//!
//! ```ignore
//! use tagbo_models::{Dataset, ModelStack, TrainableProbabilisticModel};
//!
//! // objective model with one output, constraints model with two outputs
//! let mut stack = ModelStack::new(vec![(objective, 1), (constraints, 2)])?;
//! // observations have 3 columns: column 0 goes to objective, columns 1 and 2 to constraints
//! stack.update(&dataset)?;
//! let (mean, var) = stack.predict(&x.view())?;  // both of shape [N, 3]
//! ```

mod dataset;
mod errors;
mod model_interfaces;
mod model_stack;
mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use dataset::*;
pub use errors::*;
pub use model_interfaces::*;
pub use model_stack::*;
pub use registry::*;
