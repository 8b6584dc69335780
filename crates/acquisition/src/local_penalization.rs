//! Local penalization for greedy batch construction
//!
//! A base single model acquisition function is multiplied by local penalizers centered on
//! the points already chosen in the batch, so the next maximization is driven away from them
//! (González et al., 2016, Batch Bayesian Optimization via Local Penalization).
//!
//! ```ignore
//! let mut builder = LocalPenalization::new(
//!     ExpectedImprovement::default(),
//!     candidates,
//!     LocalPenalizationConfig::default().penalizer(PenalizerKind::Hard),
//! )?
//! .using("OBJECTIVE");
//! ```

use crate::errors::{AcquisitionError, Result};
use crate::interface::{SingleModelAcquisitionBuilder, SingleModelGreedyAcquisitionBuilder};
use crate::penalization::PenalizerKind;
use crate::types::{
    AcquisitionFunction, UpdatablePenalizationFunction, check_batch_size, downcast_function,
};
use crate::utils::lipschitz_and_eta;
use log::{debug, info};
use ndarray::{Array2, ArrayView3, Axis, concatenate};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand::seq::index;
use rand_xoshiro::Xoshiro256Plus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tagbo_models::{Dataset, ProbabilisticModel};

/// Default maximum number of points used to estimate the Lipschitz constant
pub const DEFAULT_LIPSCHITZ_SAMPLES: usize = 1000;

/// Local penalization configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalPenalizationConfig {
    /// Kind of penalizer applied around pending points
    pub penalizer: PenalizerKind,
    /// Maximum number of points used to estimate the Lipschitz constant,
    /// a random subset is taken from the available points when more are given
    pub lipschitz_samples: usize,
    /// Seed of the random subset selection
    pub seed: Option<u64>,
}

impl Default for LocalPenalizationConfig {
    fn default() -> Self {
        LocalPenalizationConfig {
            penalizer: PenalizerKind::Soft,
            lipschitz_samples: DEFAULT_LIPSCHITZ_SAMPLES,
            seed: None,
        }
    }
}

impl LocalPenalizationConfig {
    pub fn penalizer(mut self, penalizer: PenalizerKind) -> Self {
        self.penalizer = penalizer;
        self
    }

    pub fn lipschitz_samples(mut self, lipschitz_samples: usize) -> Self {
        self.lipschitz_samples = lipschitz_samples;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks the configuration is valid
    pub fn check(self) -> Result<Self> {
        if self.lipschitz_samples == 0 {
            return Err(AcquisitionError::InvalidArgument(
                "lipschitz_samples should be positive".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Base acquisition values multiplied by the penalization of the pending points, if any
pub struct LocalPenalizationAcquisitionFunction {
    base: Box<dyn AcquisitionFunction>,
    penalizer: Option<Box<dyn UpdatablePenalizationFunction>>,
    /// Lipschitz constant and eta of the current optimization step
    estimate: Option<(f64, f64)>,
}

impl LocalPenalizationAcquisitionFunction {
    pub fn is_penalized(&self) -> bool {
        self.penalizer.is_some()
    }

    /// Lipschitz constant and eta used by the penalizer, once estimated in this step
    pub fn lipschitz_and_eta(&self) -> Option<(f64, f64)> {
        self.estimate
    }
}

impl fmt::Debug for LocalPenalizationAcquisitionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPenalizationAcquisitionFunction")
            .field("penalizer", &self.penalizer)
            .field("estimate", &self.estimate)
            .finish()
    }
}

impl AcquisitionFunction for LocalPenalizationAcquisitionFunction {
    fn call(&self, x: &ArrayView3<f64>) -> Result<Array2<f64>> {
        let values = self.base.call(x)?;
        match &self.penalizer {
            None => Ok(values),
            Some(penalizer) => {
                check_batch_size(x, 1)?;
                let penalization = penalizer.call(&x.index_axis(Axis(1), 0))?;
                Ok(values * penalization)
            }
        }
    }
}

/// Greedy builder penalizing a base single model acquisition function around pending points
#[derive(Debug)]
pub struct LocalPenalization<B> {
    base: B,
    samples: Array2<f64>,
    config: LocalPenalizationConfig,
    rng: Xoshiro256Plus,
}

impl<B: SingleModelAcquisitionBuilder> LocalPenalization<B> {
    /// `samples` (shape `[S, D]`) are points of the search space used, together with the
    /// dataset query points, to estimate the Lipschitz constant of the objective
    pub fn new(base: B, samples: Array2<f64>, config: LocalPenalizationConfig) -> Result<Self> {
        let config = config.check()?;
        let rng = match config.seed {
            Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
            None => Xoshiro256Plus::from_entropy(),
        };
        Ok(LocalPenalization {
            base,
            samples,
            config,
            rng,
        })
    }

    pub fn config(&self) -> &LocalPenalizationConfig {
        &self.config
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    /// Points used for the Lipschitz constant estimation
    fn lipschitz_points(&mut self, dataset: &Dataset) -> Result<Array2<f64>> {
        let points = if self.samples.nrows() == 0 {
            dataset.query_points().to_owned()
        } else {
            if self.samples.ncols() != dataset.query_point_dim() {
                return Err(AcquisitionError::InvalidArgument(format!(
                    "samples of dimension {} but query points of dimension {}",
                    self.samples.ncols(),
                    dataset.query_point_dim()
                )));
            }
            concatenate(
                Axis(0),
                &[self.samples.view(), dataset.query_points().view()],
            )?
        };
        let n = points.nrows();
        if n <= self.config.lipschitz_samples {
            Ok(points)
        } else {
            let indices =
                index::sample(&mut self.rng, n, self.config.lipschitz_samples).into_vec();
            Ok(points.select(Axis(0), &indices))
        }
    }

    fn penalize(
        &mut self,
        function: &mut LocalPenalizationAcquisitionFunction,
        model: &Arc<dyn ProbabilisticModel>,
        dataset: &Dataset,
        pending_points: Option<&Array2<f64>>,
        rebuild: bool,
    ) -> Result<()> {
        if rebuild {
            function.estimate = None;
        }
        let Some(pending_points) = pending_points.filter(|p| p.nrows() > 0) else {
            function.penalizer = None;
            return Ok(());
        };
        let (lipschitz, eta) = match function.estimate {
            Some(estimate) => estimate,
            None => {
                let points = self.lipschitz_points(dataset)?;
                let estimate = lipschitz_and_eta(
                    model.as_ref(),
                    &points.view(),
                    &dataset.query_points().view(),
                )?;
                debug!("Lipschitz constant {}, eta {}", estimate.0, estimate.1);
                function.estimate = Some(estimate);
                estimate
            }
        };
        if !rebuild && let Some(penalizer) = function.penalizer.as_mut() {
            penalizer.update(&pending_points.view(), lipschitz, eta)?;
        } else {
            function.penalizer = Some(self.config.penalizer.build(
                model.clone(),
                &pending_points.view(),
                lipschitz,
                eta,
            )?);
        }
        Ok(())
    }
}

fn required(dataset: Option<&Dataset>) -> Result<&Dataset> {
    dataset.ok_or_else(|| {
        AcquisitionError::InvalidArgument("local penalization requires a dataset".to_string())
    })
}

impl<B: SingleModelAcquisitionBuilder> SingleModelGreedyAcquisitionBuilder
    for LocalPenalization<B>
{
    fn prepare_acquisition_function(
        &mut self,
        model: &Arc<dyn ProbabilisticModel>,
        dataset: Option<&Dataset>,
        pending_points: Option<&Array2<f64>>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        let dataset = required(dataset)?;
        info!("Build local penalization of {:?}", self.base);
        let base = self.base.prepare_acquisition_function(model, Some(dataset))?;
        let mut function = LocalPenalizationAcquisitionFunction {
            base,
            penalizer: None,
            estimate: None,
        };
        self.penalize(&mut function, model, dataset, pending_points, true)?;
        Ok(Box::new(function))
    }

    /// The base function is updated on a new optimization step only, the penalizer is
    /// updated in place while the batch grows and rebuilt on a new optimization step.
    fn update_acquisition_function(
        &mut self,
        function: Box<dyn AcquisitionFunction>,
        model: &Arc<dyn ProbabilisticModel>,
        dataset: Option<&Dataset>,
        pending_points: Option<&Array2<f64>>,
        new_optimization_step: bool,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        let dataset = required(dataset)?;
        let mut penalized =
            match downcast_function::<LocalPenalizationAcquisitionFunction>(function) {
                Ok(penalized) => penalized,
                Err(_) => {
                    return self.prepare_acquisition_function(model, Some(dataset), pending_points);
                }
            };
        if new_optimization_step {
            let LocalPenalizationAcquisitionFunction {
                base,
                penalizer,
                estimate,
            } = *penalized;
            let base = self
                .base
                .update_acquisition_function(base, model, Some(dataset))?;
            penalized = Box::new(LocalPenalizationAcquisitionFunction {
                base,
                penalizer,
                estimate,
            });
        }
        self.penalize(
            &mut penalized,
            model,
            dataset,
            pending_points,
            new_optimization_step,
        )?;
        Ok(penalized)
    }
}
