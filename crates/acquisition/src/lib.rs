//! This library implements the acquisition side of the tagged Bayesian optimization framework.
//!
//! Models and datasets are addressed by [`Tag`](tagbo_models::Tag): an optimization problem
//! with an objective and a failure region has one model per tag, and acquisition function
//! builders pick the models they need by tag.
//!
//! * [`AcquisitionFunctionBuilder`] builds an [`AcquisitionFunction`] from all the tagged
//!   models and datasets, and updates it at each optimization step,
//! * [`SingleModelAcquisitionBuilder`] only deals with one model,
//!   [`using`](SingleModelAcquisitionBuilder::using) selects it by tag,
//! * [`GreedyAcquisitionFunctionBuilder`] and [`SingleModelGreedyAcquisitionBuilder`] also take
//!   the points already chosen in the current batch (pending points),
//! * [`Product`] and [`Sum`] combine builders,
//! * [`LocalPenalization`] penalizes a single model acquisition around pending points,
//! * [`EfficientGlobalOptimization`] and [`GreedyBatchOptimization`] drive builders over
//!   the optimization steps.
//!
//! # Example
//!
//! ```no_run
//! use ndarray::{Array2, array};
//! use std::sync::Arc;
//! use tagbo_acquisition::*;
//! use tagbo_models::{ProbabilisticModel, Tag};
//!
//! # fn run(
//! #     objective_model: Arc<dyn ProbabilisticModel>,
//! #     failure_model: Arc<dyn ProbabilisticModel>,
//! # ) -> tagbo_acquisition::Result<()> {
//! let mut models = Models::new();
//! models.insert(Tag::from(OBJECTIVE), objective_model);
//! models.insert(Tag::from(FAILURE), failure_model);
//!
//! let builder = Product::new(vec![
//!     Box::new(PredictiveMean.using(OBJECTIVE)),
//!     Box::new(PredictiveMean.using(FAILURE)),
//! ])?;
//! let mut rule = EfficientGlobalOptimization::new(builder);
//! let mut optimizer = CandidateSetOptimizer::new(array![[0.], [0.5], [1.]])?;
//! let x: Array2<f64> = rule.acquire(&models, None, &mut optimizer)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! Rules initialize a stdout logger at construction, the level is set with the
//! `TAGBO_LOG` environment variable (default `info`).

mod errors;
mod interface;
mod local_penalization;
mod observer;
mod penalization;
mod predictive_mean;
mod reducers;
mod rule;
mod types;

pub mod utils;

pub use errors::*;
pub use interface::{
    AcquisitionFunctionBuilder, GreedyAcquisitionFunctionBuilder, GreedyUsing,
    SingleModelAcquisitionBuilder, SingleModelGreedyAcquisitionBuilder, Using,
};
pub use local_penalization::*;
pub use observer::*;
pub use penalization::*;
pub use predictive_mean::*;
pub use reducers::*;
pub use rule::*;
pub use types::{
    AcquisitionFunction, FnAcquisition, Models, PenalizationFunction,
    UpdatablePenalizationFunction, downcast_function, downcast_function_mut,
};
