//! Acquisition function builders
//!
//! Builders are the contract between the optimization loop and acquisition strategies.
//! The loop owns the tagged models and datasets and calls, for each optimization step:
//!
//! * [`prepare_acquisition_function`](AcquisitionFunctionBuilder::prepare_acquisition_function)
//!   the first time (or whenever previous state is discarded),
//! * [`update_acquisition_function`](AcquisitionFunctionBuilder::update_acquisition_function)
//!   afterwards, giving back the previously returned function.
//!
//! By default an update rebuilds the function. A builder may instead update the given
//! function state in place and return it, to avoid rebuilding expensive internal state.
//! Both ways must give the same evaluations with respect to the latest models and datasets.
//!
//! Greedy builders, used to build batches one point at a time, are defined in the same way
//! with the points already chosen in the current batch as an additional input.

use crate::errors::{AcquisitionError, Result};
use crate::types::{AcquisitionFunction, Models};
use ndarray::Array2;
use std::fmt;
use std::sync::Arc;
use tagbo_models::{Dataset, Datasets, ProbabilisticModel, Tag};

/// A builder of acquisition function from tagged models and datasets
pub trait AcquisitionFunctionBuilder: fmt::Debug {
    /// Returns a new acquisition function given the models for each tag
    /// and optionally the data from the observer.
    ///
    /// Fails with [`AcquisitionError::MissingTag`] when a required tag is absent.
    fn prepare_acquisition_function(
        &mut self,
        models: &Models,
        datasets: Option<&Datasets>,
    ) -> Result<Box<dyn AcquisitionFunction>>;

    /// Updates `function` wrt the given models and datasets.
    ///
    /// The default implementation builds a new function.
    fn update_acquisition_function(
        &mut self,
        _function: Box<dyn AcquisitionFunction>,
        models: &Models,
        datasets: Option<&Datasets>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        self.prepare_acquisition_function(models, datasets)
    }
}

impl<B: AcquisitionFunctionBuilder + ?Sized> AcquisitionFunctionBuilder for Box<B> {
    fn prepare_acquisition_function(
        &mut self,
        models: &Models,
        datasets: Option<&Datasets>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        (**self).prepare_acquisition_function(models, datasets)
    }

    fn update_acquisition_function(
        &mut self,
        function: Box<dyn AcquisitionFunction>,
        models: &Models,
        datasets: Option<&Datasets>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        (**self).update_acquisition_function(function, models, datasets)
    }
}

/// A builder of acquisition function requiring only one (model, dataset) pair
pub trait SingleModelAcquisitionBuilder: fmt::Debug {
    /// Returns a new acquisition function given the model and optionally its data
    fn prepare_acquisition_function(
        &mut self,
        model: &Arc<dyn ProbabilisticModel>,
        dataset: Option<&Dataset>,
    ) -> Result<Box<dyn AcquisitionFunction>>;

    /// Updates `function` wrt the given model and data.
    ///
    /// The default implementation builds a new function.
    fn update_acquisition_function(
        &mut self,
        _function: Box<dyn AcquisitionFunction>,
        model: &Arc<dyn ProbabilisticModel>,
        dataset: Option<&Dataset>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        self.prepare_acquisition_function(model, dataset)
    }

    /// Returns a tagged builder selecting the model and dataset registered under `tag`
    fn using(self, tag: impl Into<Tag>) -> Using<Self>
    where
        Self: Sized,
    {
        Using {
            builder: self,
            tag: tag.into(),
        }
    }
}

/// A builder of acquisition function suited to build batches of points greedily.
///
/// When building batches of size `B`, it is typically called `B` times per optimization step,
/// with the points already chosen in the batch given as `pending_points` (shape `[M, D]`).
pub trait GreedyAcquisitionFunctionBuilder: fmt::Debug {
    /// Returns a new acquisition function. The first call of a batch gets no pending points.
    fn prepare_acquisition_function(
        &mut self,
        models: &Models,
        datasets: Option<&Datasets>,
        pending_points: Option<&Array2<f64>>,
    ) -> Result<Box<dyn AcquisitionFunction>>;

    /// Updates `function` wrt the given models, datasets and pending points.
    ///
    /// `new_optimization_step` is `true` on the first call of an optimization step, models and
    /// datasets may have changed, and `false` while the batch of the current step is growing,
    /// the pending points having grown by one point since the previous call.
    ///
    /// The default implementation builds a new function whatever `new_optimization_step` is.
    fn update_acquisition_function(
        &mut self,
        _function: Box<dyn AcquisitionFunction>,
        models: &Models,
        datasets: Option<&Datasets>,
        pending_points: Option<&Array2<f64>>,
        _new_optimization_step: bool,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        self.prepare_acquisition_function(models, datasets, pending_points)
    }
}

impl<B: GreedyAcquisitionFunctionBuilder + ?Sized> GreedyAcquisitionFunctionBuilder for Box<B> {
    fn prepare_acquisition_function(
        &mut self,
        models: &Models,
        datasets: Option<&Datasets>,
        pending_points: Option<&Array2<f64>>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        (**self).prepare_acquisition_function(models, datasets, pending_points)
    }

    fn update_acquisition_function(
        &mut self,
        function: Box<dyn AcquisitionFunction>,
        models: &Models,
        datasets: Option<&Datasets>,
        pending_points: Option<&Array2<f64>>,
        new_optimization_step: bool,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        (**self).update_acquisition_function(
            function,
            models,
            datasets,
            pending_points,
            new_optimization_step,
        )
    }
}

/// A greedy builder of acquisition function requiring only one (model, dataset) pair
pub trait SingleModelGreedyAcquisitionBuilder: fmt::Debug {
    /// Returns a new acquisition function given the model, optionally its data,
    /// and the points already chosen in the current batch
    fn prepare_acquisition_function(
        &mut self,
        model: &Arc<dyn ProbabilisticModel>,
        dataset: Option<&Dataset>,
        pending_points: Option<&Array2<f64>>,
    ) -> Result<Box<dyn AcquisitionFunction>>;

    /// Updates `function`, see
    /// [`GreedyAcquisitionFunctionBuilder::update_acquisition_function`].
    ///
    /// The default implementation builds a new function.
    fn update_acquisition_function(
        &mut self,
        _function: Box<dyn AcquisitionFunction>,
        model: &Arc<dyn ProbabilisticModel>,
        dataset: Option<&Dataset>,
        pending_points: Option<&Array2<f64>>,
        _new_optimization_step: bool,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        self.prepare_acquisition_function(model, dataset, pending_points)
    }

    /// Returns a tagged greedy builder selecting the model and dataset registered under `tag`
    fn using(self, tag: impl Into<Tag>) -> GreedyUsing<Self>
    where
        Self: Sized,
    {
        GreedyUsing {
            builder: self,
            tag: tag.into(),
        }
    }
}

/// Selects the model registered under `tag` and its dataset.
///
/// The dataset is `None` when no datasets are given, it is an error
/// when datasets are given without the `tag` entry.
pub(crate) fn select_tag<'a>(
    tag: &Tag,
    models: &'a Models,
    datasets: Option<&'a Datasets>,
) -> Result<(&'a Arc<dyn ProbabilisticModel>, Option<&'a Dataset>)> {
    let model = models.get(tag).ok_or_else(|| AcquisitionError::MissingTag {
        tag: tag.to_string(),
        registry: "models",
    })?;
    let dataset = match datasets {
        None => None,
        Some(datasets) => Some(datasets.get(tag).ok_or_else(|| {
            AcquisitionError::MissingTag {
                tag: tag.to_string(),
                registry: "datasets",
            }
        })?),
    };
    Ok((model, dataset))
}

/// A single model builder exposed as a tagged builder: it forwards to the wrapped builder
/// the model and dataset registered under its tag.
#[derive(Debug, Clone)]
pub struct Using<B> {
    builder: B,
    tag: Tag,
}

impl<B> Using<B> {
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn into_inner(self) -> B {
        self.builder
    }
}

impl<B: fmt::Debug> fmt::Display for Using<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} using tag {:?}", self.builder, self.tag.as_str())
    }
}

impl<B: SingleModelAcquisitionBuilder> AcquisitionFunctionBuilder for Using<B> {
    fn prepare_acquisition_function(
        &mut self,
        models: &Models,
        datasets: Option<&Datasets>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        let (model, dataset) = select_tag(&self.tag, models, datasets)?;
        self.builder.prepare_acquisition_function(model, dataset)
    }

    fn update_acquisition_function(
        &mut self,
        function: Box<dyn AcquisitionFunction>,
        models: &Models,
        datasets: Option<&Datasets>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        let (model, dataset) = select_tag(&self.tag, models, datasets)?;
        self.builder
            .update_acquisition_function(function, model, dataset)
    }
}

/// A single model greedy builder exposed as a tagged greedy builder. Pending points are
/// relative to the batch, not to a tag, they are forwarded unchanged.
#[derive(Debug, Clone)]
pub struct GreedyUsing<B> {
    builder: B,
    tag: Tag,
}

impl<B> GreedyUsing<B> {
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn into_inner(self) -> B {
        self.builder
    }
}

impl<B: fmt::Debug> fmt::Display for GreedyUsing<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} using tag {:?}", self.builder, self.tag.as_str())
    }
}

impl<B: SingleModelGreedyAcquisitionBuilder> GreedyAcquisitionFunctionBuilder for GreedyUsing<B> {
    fn prepare_acquisition_function(
        &mut self,
        models: &Models,
        datasets: Option<&Datasets>,
        pending_points: Option<&Array2<f64>>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        let (model, dataset) = select_tag(&self.tag, models, datasets)?;
        self.builder
            .prepare_acquisition_function(model, dataset, pending_points)
    }

    fn update_acquisition_function(
        &mut self,
        function: Box<dyn AcquisitionFunction>,
        models: &Models,
        datasets: Option<&Datasets>,
        pending_points: Option<&Array2<f64>>,
        new_optimization_step: bool,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        let (model, dataset) = select_tag(&self.tag, models, datasets)?;
        self.builder.update_acquisition_function(
            function,
            model,
            dataset,
            pending_points,
            new_optimization_step,
        )
    }
}
