//! Reducers combine several acquisition function builders into one, the acquisition
//! values of the components being reduced element-wise.
//!
//! Typical use is failure-aware optimization, where the expected improvement of the
//! objective model is weighted by the probability of a valid evaluation:
//!
//! ```ignore
//! let builder = Product::new(vec![
//!     Box::new(ExpectedImprovement::default().using("OBJECTIVE")),
//!     Box::new(PredictiveMean.using("FAILURE")),
//! ])?;
//! ```

use crate::errors::{AcquisitionError, Result};
use crate::interface::AcquisitionFunctionBuilder;
use crate::types::{AcquisitionFunction, Models, downcast_function_mut};
use log::info;
use ndarray::{Array2, ArrayView3};
use std::fmt;
use tagbo_models::Datasets;

/// Element-wise reduction of acquisition values
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reduction {
    Product,
    Sum,
}

impl Reduction {
    fn apply(self, values: Vec<Array2<f64>>) -> Result<Array2<f64>> {
        let mut values = values.into_iter();
        let mut acc = values.next().ok_or_else(|| {
            AcquisitionError::InvalidArgument("nothing to reduce".to_string())
        })?;
        for v in values {
            if v.dim() != acc.dim() {
                return Err(AcquisitionError::InvalidArgument(format!(
                    "cannot reduce acquisition values of shapes {:?} and {:?}",
                    acc.shape(),
                    v.shape()
                )));
            }
            match self {
                Reduction::Product => acc *= &v,
                Reduction::Sum => acc += &v,
            }
        }
        Ok(acc)
    }
}

/// Acquisition function reducing the values of its components
pub struct ReducedAcquisitionFunction {
    reduction: Reduction,
    functions: Vec<Box<dyn AcquisitionFunction>>,
}

impl fmt::Debug for ReducedAcquisitionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducedAcquisitionFunction")
            .field("reduction", &self.reduction)
            .field("components", &self.functions.len())
            .finish()
    }
}

impl AcquisitionFunction for ReducedAcquisitionFunction {
    fn call(&self, x: &ArrayView3<f64>) -> Result<Array2<f64>> {
        let values = self
            .functions
            .iter()
            .map(|f| f.call(x))
            .collect::<Result<Vec<_>>>()?;
        self.reduction.apply(values)
    }
}

/// Builder reducing the acquisition functions of several builders
#[derive(Debug)]
pub struct Reducer {
    reduction: Reduction,
    builders: Vec<Box<dyn AcquisitionFunctionBuilder>>,
}

impl Reducer {
    /// Fails with [`AcquisitionError::InvalidArgument`] when `builders` is empty
    pub fn new(
        reduction: Reduction,
        builders: Vec<Box<dyn AcquisitionFunctionBuilder>>,
    ) -> Result<Self> {
        if builders.is_empty() {
            return Err(AcquisitionError::InvalidArgument(
                "reducer requires at least one acquisition function builder".to_string(),
            ));
        }
        Ok(Reducer {
            reduction,
            builders,
        })
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    pub fn builders(&self) -> &[Box<dyn AcquisitionFunctionBuilder>] {
        &self.builders
    }
}

impl AcquisitionFunctionBuilder for Reducer {
    fn prepare_acquisition_function(
        &mut self,
        models: &Models,
        datasets: Option<&Datasets>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        info!(
            "Build {:?} of {} acquisition functions",
            self.reduction,
            self.builders.len()
        );
        let functions = self
            .builders
            .iter_mut()
            .map(|b| b.prepare_acquisition_function(models, datasets))
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(ReducedAcquisitionFunction {
            reduction: self.reduction,
            functions,
        }))
    }

    /// Updates each component with its own builder, in place when `function` is the
    /// reduced function previously returned, otherwise the reduction is rebuilt.
    fn update_acquisition_function(
        &mut self,
        mut function: Box<dyn AcquisitionFunction>,
        models: &Models,
        datasets: Option<&Datasets>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        let Some(reduced) = downcast_function_mut::<ReducedAcquisitionFunction>(&mut function)
        else {
            return self.prepare_acquisition_function(models, datasets);
        };
        if reduced.functions.len() != self.builders.len() {
            return self.prepare_acquisition_function(models, datasets);
        }
        let previous = std::mem::take(&mut reduced.functions);
        reduced.functions = self
            .builders
            .iter_mut()
            .zip(previous)
            .map(|(b, f)| b.update_acquisition_function(f, models, datasets))
            .collect::<Result<Vec<_>>>()?;
        Ok(function)
    }
}

/// Builder of the product of acquisition functions
#[derive(Debug)]
pub struct Product;

impl Product {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(builders: Vec<Box<dyn AcquisitionFunctionBuilder>>) -> Result<Reducer> {
        Reducer::new(Reduction::Product, builders)
    }
}

/// Builder of the sum of acquisition functions
#[derive(Debug)]
pub struct Sum;

impl Sum {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(builders: Vec<Box<dyn AcquisitionFunctionBuilder>>) -> Result<Reducer> {
        Reducer::new(Reduction::Sum, builders)
    }
}
