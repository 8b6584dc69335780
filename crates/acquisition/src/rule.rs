//! Acquisition rules
//!
//! An acquisition rule drives a builder over the optimization steps: it keeps the acquisition
//! function returned by the builder and hands it back for update at the next step, then
//! maximizes it with an [`AcquisitionOptimizer`] to get the next query points.
//!
//! * [`EfficientGlobalOptimization`] acquires one point per step,
//! * [`GreedyBatchOptimization`] acquires a batch of points per step, one point at a time,
//!   the points already chosen being given as pending points to a greedy builder.

use crate::errors::{AcquisitionError, Result};
use crate::interface::{AcquisitionFunctionBuilder, GreedyAcquisitionFunctionBuilder};
use crate::types::{AcquisitionFunction, Models};
use crate::utils::init_logger;
use log::{debug, info};
use ndarray::{Array1, Array2, Axis};
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use tagbo_models::Datasets;

/// Maximizer of acquisition functions
pub trait AcquisitionOptimizer {
    /// Returns the point `[D]` maximizing `function`
    fn optimize(&mut self, function: &dyn AcquisitionFunction) -> Result<Array1<f64>>;
}

/// Maximizes acquisition functions over a fixed set of candidate points
#[derive(Clone, Debug)]
pub struct CandidateSetOptimizer {
    candidates: Array2<f64>,
}

impl CandidateSetOptimizer {
    /// `candidates` has shape `[C, D]`
    pub fn new(candidates: Array2<f64>) -> Result<Self> {
        if candidates.nrows() == 0 {
            return Err(AcquisitionError::InvalidArgument(
                "candidate set is empty".to_string(),
            ));
        }
        Ok(CandidateSetOptimizer { candidates })
    }

    pub fn candidates(&self) -> &Array2<f64> {
        &self.candidates
    }
}

impl AcquisitionOptimizer for CandidateSetOptimizer {
    fn optimize(&mut self, function: &dyn AcquisitionFunction) -> Result<Array1<f64>> {
        let x = self.candidates.view().insert_axis(Axis(1));
        let values = function.call(&x)?;
        let best = values.column(0).argmax().map_err(|err| {
            AcquisitionError::OptimizationFailure(format!(
                "no maximizer among {} candidates: {err}",
                self.candidates.nrows()
            ))
        })?;
        debug!("Best candidate {} with value {}", best, values[[best, 0]]);
        Ok(self.candidates.row(best).to_owned())
    }
}

/// A rule choosing the next query points given the current models and data
pub trait AcquisitionRule {
    /// Returns the points `[B, D]` to evaluate next
    fn acquire(
        &mut self,
        models: &Models,
        datasets: Option<&Datasets>,
        optimizer: &mut dyn AcquisitionOptimizer,
    ) -> Result<Array2<f64>>;
}

/// Rule maximizing the acquisition function to get one point per optimization step
pub struct EfficientGlobalOptimization<B> {
    builder: B,
    function: Option<Box<dyn AcquisitionFunction>>,
}

impl<B: fmt::Debug> fmt::Debug for EfficientGlobalOptimization<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EfficientGlobalOptimization")
            .field("builder", &self.builder)
            .field("prepared", &self.function.is_some())
            .finish()
    }
}

impl<B: AcquisitionFunctionBuilder> EfficientGlobalOptimization<B> {
    pub fn new(builder: B) -> Self {
        init_logger();
        EfficientGlobalOptimization {
            builder,
            function: None,
        }
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }
}

impl<B: AcquisitionFunctionBuilder> AcquisitionRule for EfficientGlobalOptimization<B> {
    fn acquire(
        &mut self,
        models: &Models,
        datasets: Option<&Datasets>,
        optimizer: &mut dyn AcquisitionOptimizer,
    ) -> Result<Array2<f64>> {
        let function = match self.function.take() {
            None => {
                info!("Prepare acquisition function");
                self.builder.prepare_acquisition_function(models, datasets)?
            }
            Some(function) => {
                self.builder
                    .update_acquisition_function(function, models, datasets)?
            }
        };
        let point = optimizer.optimize(function.as_ref());
        self.function = Some(function);
        let point = point?;
        info!("Acquired point {point}");
        Ok(point.insert_axis(Axis(0)))
    }
}

/// Batch construction configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of points acquired per optimization step
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig { batch_size: 1 }
    }
}

impl BatchConfig {
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Checks the configuration is valid
    pub fn check(self) -> Result<Self> {
        if self.batch_size == 0 {
            return Err(AcquisitionError::InvalidArgument(
                "batch_size should be positive".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Rule building a batch of points greedily: each point maximizes the acquisition function
/// updated with the points already chosen in the batch as pending points
pub struct GreedyBatchOptimization<B> {
    builder: B,
    config: BatchConfig,
    function: Option<Box<dyn AcquisitionFunction>>,
}

impl<B: fmt::Debug> fmt::Debug for GreedyBatchOptimization<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GreedyBatchOptimization")
            .field("builder", &self.builder)
            .field("config", &self.config)
            .field("prepared", &self.function.is_some())
            .finish()
    }
}

impl<B: GreedyAcquisitionFunctionBuilder> GreedyBatchOptimization<B> {
    pub fn new(builder: B, config: BatchConfig) -> Result<Self> {
        init_logger();
        Ok(GreedyBatchOptimization {
            builder,
            config: config.check()?,
            function: None,
        })
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }
}

impl<B: GreedyAcquisitionFunctionBuilder> AcquisitionRule for GreedyBatchOptimization<B> {
    fn acquire(
        &mut self,
        models: &Models,
        datasets: Option<&Datasets>,
        optimizer: &mut dyn AcquisitionOptimizer,
    ) -> Result<Array2<f64>> {
        let mut function = match self.function.take() {
            None => {
                info!("Prepare greedy acquisition function");
                self.builder
                    .prepare_acquisition_function(models, datasets, None)?
            }
            Some(function) => self.builder.update_acquisition_function(
                function, models, datasets, None, true,
            )?,
        };

        let first = optimizer.optimize(function.as_ref())?;
        let mut batch = first.insert_axis(Axis(0));
        for i in 1..self.config.batch_size {
            debug!("Greedy batch point {}/{}", i + 1, self.config.batch_size);
            function = self.builder.update_acquisition_function(
                function,
                models,
                datasets,
                Some(&batch),
                false,
            )?;
            let point = optimizer.optimize(function.as_ref())?;
            batch.push_row(point.view())?;
        }
        self.function = Some(function);
        info!("Acquired batch of {} point(s)", batch.nrows());
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::SingleModelAcquisitionBuilder;
    use crate::predictive_mean::PredictiveMean;
    use crate::types::FnAcquisition;
    use ndarray::{ArrayView3, array};
    use std::sync::Arc;
    use tagbo_models::testing::LinearModel;
    use tagbo_models::{ProbabilisticModel, Tag};

    fn models(slope: f64) -> Models {
        let mut models = Models::new();
        models.insert(
            Tag::from("OBJECTIVE"),
            Arc::new(LinearModel::new(array![[slope]], array![0.], array![1.]))
                as Arc<dyn ProbabilisticModel>,
        );
        models
    }

    #[test]
    fn test_candidate_set_optimizer() {
        let mut opt = CandidateSetOptimizer::new(array![[0., 1.], [2., 2.], [1., 0.]]).unwrap();
        let f = FnAcquisition::boxed(|x: &ArrayView3<f64>| {
            Ok(x.index_axis(Axis(1), 0).sum_axis(Axis(1)).insert_axis(Axis(1)))
        });
        assert_eq!(opt.optimize(f.as_ref()).unwrap(), array![2., 2.]);

        let nan = FnAcquisition::boxed(|x: &ArrayView3<f64>| {
            Ok(Array2::from_elem((x.len_of(Axis(0)), 1), f64::NAN))
        });
        assert!(matches!(
            opt.optimize(nan.as_ref()),
            Err(AcquisitionError::OptimizationFailure(_))
        ));
        assert!(CandidateSetOptimizer::new(Array2::zeros((0, 2))).is_err());
    }

    #[test]
    fn test_efficient_global_optimization() {
        let mut opt = CandidateSetOptimizer::new(array![[-1.], [0.], [2.]]).unwrap();
        let mut rule = EfficientGlobalOptimization::new(PredictiveMean.using("OBJECTIVE"));
        let x = rule.acquire(&models(1.), None, &mut opt).unwrap();
        assert_eq!(x, array![[2.]]);
        // updated function follows the new model
        let x = rule.acquire(&models(-1.), None, &mut opt).unwrap();
        assert_eq!(x, array![[-1.]]);
    }

    /// Greedy builder recording its calls, acquisition is the point value
    /// except at pending points where it is -inf
    #[derive(Debug, Default)]
    struct Excluding {
        calls: Vec<(usize, Option<bool>)>,
    }

    impl GreedyAcquisitionFunctionBuilder for Excluding {
        fn prepare_acquisition_function(
            &mut self,
            _models: &Models,
            _datasets: Option<&Datasets>,
            pending_points: Option<&Array2<f64>>,
        ) -> Result<Box<dyn AcquisitionFunction>> {
            self.calls
                .push((pending_points.map(|p| p.nrows()).unwrap_or(0), None));
            let pending = pending_points.cloned().unwrap_or_else(|| Array2::zeros((0, 1)));
            Ok(FnAcquisition::boxed(move |x: &ArrayView3<f64>| {
                let points = x.index_axis(Axis(1), 0);
                Ok(Array2::from_shape_fn((points.nrows(), 1), |(i, _)| {
                    if pending.rows().into_iter().any(|p| p == points.row(i)) {
                        f64::NEG_INFINITY
                    } else {
                        points[[i, 0]]
                    }
                }))
            }))
        }

        fn update_acquisition_function(
            &mut self,
            _function: Box<dyn AcquisitionFunction>,
            models: &Models,
            datasets: Option<&Datasets>,
            pending_points: Option<&Array2<f64>>,
            new_optimization_step: bool,
        ) -> Result<Box<dyn AcquisitionFunction>> {
            let f = self.prepare_acquisition_function(models, datasets, pending_points)?;
            if let Some(last) = self.calls.last_mut() {
                last.1 = Some(new_optimization_step);
            }
            Ok(f)
        }
    }

    #[test]
    fn test_greedy_batch_optimization() {
        let mut opt = CandidateSetOptimizer::new(array![[1.], [4.], [3.], [2.]]).unwrap();
        let mut rule =
            GreedyBatchOptimization::new(Excluding::default(), BatchConfig::default().batch_size(3))
                .unwrap();
        let models = models(1.);
        let batch = rule.acquire(&models, None, &mut opt).unwrap();
        assert_eq!(batch, array![[4.], [3.], [2.]]);
        let batch = rule.acquire(&models, None, &mut opt).unwrap();
        assert_eq!(batch, array![[4.], [3.], [2.]]);

        assert_eq!(
            rule.builder().calls,
            vec![
                (0, None),
                (1, Some(false)),
                (2, Some(false)),
                (0, Some(true)),
                (1, Some(false)),
                (2, Some(false)),
            ]
        );
    }

    #[test]
    fn test_batch_config() {
        assert!(matches!(
            GreedyBatchOptimization::new(
                Excluding::default(),
                BatchConfig::default().batch_size(0)
            ),
            Err(AcquisitionError::InvalidArgument(_))
        ));
        let config: BatchConfig = serde_json::from_str(r#"{"batch_size":4}"#).unwrap();
        assert_eq!(config, BatchConfig::default().batch_size(4));
    }
}
