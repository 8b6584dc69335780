use crate::errors::{AcquisitionError, Result};
use ndarray::{Array2, ArrayView2, ArrayView3};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tagbo_models::{ProbabilisticModel, Tag};

/// Tagged models as seen by acquisition builders
pub type Models = BTreeMap<Tag, Arc<dyn ProbabilisticModel>>;

/// A function estimating the utility of evaluating batches of candidate points.
///
/// It maps `N` batches of `B` query points of dimension `D` (input shape `[N, B, D]`)
/// to one utility value per batch (output shape `[N, 1]`). Acquisition functions which
/// do not support batch optimization still expect a batch dimension, i.e. `[N, 1, D]`.
///
/// Implementing this trait with a struct, rather than using [`FnAcquisition`], allows
/// builders to update the function state in place instead of building a new one
/// (see [`update_acquisition_function`]).
///
/// [`update_acquisition_function`]: crate::AcquisitionFunctionBuilder::update_acquisition_function
/// Once returned by a builder an acquisition function is only read during evaluation.
pub trait AcquisitionFunction: Any + Send + Sync {
    /// Evaluates the acquisition function on `x` of shape `[N, B, D]`
    fn call(&self, x: &ArrayView3<f64>) -> Result<Array2<f64>>;
}

/// Returns a mutable reference to the concrete acquisition function behind `function`
/// if it is of type `T`
pub fn downcast_function_mut<T: AcquisitionFunction>(
    function: &mut Box<dyn AcquisitionFunction>,
) -> Option<&mut T> {
    let any: &mut dyn Any = function.as_mut();
    any.downcast_mut::<T>()
}

/// Returns the concrete acquisition function behind `function` if it is of type `T`,
/// the function is given back otherwise
pub fn downcast_function<T: AcquisitionFunction>(
    function: Box<dyn AcquisitionFunction>,
) -> std::result::Result<Box<T>, Box<dyn AcquisitionFunction>> {
    if (function.as_ref() as &dyn Any).is::<T>() {
        let any: Box<dyn Any> = function;
        // checked above
        Ok(any.downcast::<T>().unwrap_or_else(|_| unreachable!()))
    } else {
        Err(function)
    }
}

type AcqFn = dyn Fn(&ArrayView3<f64>) -> Result<Array2<f64>> + Send + Sync;

/// An acquisition function defined by a closure, rebuilt on each update
pub struct FnAcquisition {
    func: Box<AcqFn>,
}

impl FnAcquisition {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&ArrayView3<f64>) -> Result<Array2<f64>> + Send + Sync + 'static,
    {
        FnAcquisition {
            func: Box::new(func),
        }
    }

    /// Boxed acquisition function from a closure
    pub fn boxed<F>(func: F) -> Box<dyn AcquisitionFunction>
    where
        F: Fn(&ArrayView3<f64>) -> Result<Array2<f64>> + Send + Sync + 'static,
    {
        Box::new(FnAcquisition::new(func))
    }
}

impl fmt::Debug for FnAcquisition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnAcquisition")
    }
}

impl AcquisitionFunction for FnAcquisition {
    fn call(&self, x: &ArrayView3<f64>) -> Result<Array2<f64>> {
        (self.func)(x)
    }
}

/// A function expressing how much a single candidate point should be discouraged.
///
/// It maps `N` points of dimension `D` (shape `[N, D]`) to non-negative values (shape `[N, 1]`).
/// Penalization is applied multiplicatively to acquisition values so small outputs
/// mean strong penalization, `1` means no penalization. Values lie in `[0, 1]`.
pub trait PenalizationFunction: Send + Sync + fmt::Debug {
    fn call(&self, x: &ArrayView2<f64>) -> Result<Array2<f64>>;
}

/// A penalization function whose parameters are recomputed in place from pending points
pub trait UpdatablePenalizationFunction: PenalizationFunction {
    /// Recomputes penalization parameters given the `pending_points` (shape `[M, D]`),
    /// an estimated Lipschitz constant of the objective and an estimated optimum value `eta`
    fn update(
        &mut self,
        pending_points: &ArrayView2<f64>,
        lipschitz_constant: f64,
        eta: f64,
    ) -> Result<()>;
}

/// Checks acquisition function input is `[N, B, D]` with the expected batch size
pub(crate) fn check_batch_size(x: &ArrayView3<f64>, batch_size: usize) -> Result<()> {
    let b = x.shape()[1];
    if b != batch_size {
        return Err(AcquisitionError::InvalidArgument(format!(
            "expected batches of {batch_size} point(s), got input of shape {:?}",
            x.shape()
        )));
    }
    Ok(())
}
