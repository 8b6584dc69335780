//! Local penalizers
//!
//! A local penalizer discourages candidates located in a ball around each pending point.
//! For a pending point `p` with predicted mean `m(p)` and variance `s2(p)`, given a Lipschitz
//! constant `L` of the objective and the current optimum estimate `eta`, the ball has a
//! radius `(m(p) - eta) / L` and a scale `sqrt(s2(p)) / L`.
//! Penalizations of the pending points are multiplied together.

use crate::errors::{AcquisitionError, Result};
use crate::types::{PenalizationFunction, UpdatablePenalizationFunction};
use crate::utils::{norm_cdf, pairwise_distances};
use log::debug;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tagbo_models::ProbabilisticModel;

/// Minimal ball scale, avoids division by zero with noiseless models
const MIN_SCALE: f64 = 1e-12;

/// Kind of local penalizer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PenalizerKind {
    /// Smooth penalization, the normal cdf of the standardized distance to the ball
    #[default]
    Soft,
    /// Penalization as the distance ratio to the ball border clipped to 1
    Hard,
}

impl PenalizerKind {
    /// Builds the penalizer of this kind for `pending_points` given the model
    pub fn build(
        self,
        model: Arc<dyn ProbabilisticModel>,
        pending_points: &ArrayView2<f64>,
        lipschitz_constant: f64,
        eta: f64,
    ) -> Result<Box<dyn UpdatablePenalizationFunction>> {
        let balls = PenaltyBalls::new(model, pending_points, lipschitz_constant, eta)?;
        Ok(match self {
            PenalizerKind::Soft => Box::new(SoftLocalPenalizer { balls }),
            PenalizerKind::Hard => Box::new(HardLocalPenalizer { balls }),
        })
    }
}

/// Balls around pending points, shared by soft and hard penalizers
struct PenaltyBalls {
    model: Arc<dyn ProbabilisticModel>,
    pending_points: Array2<f64>,
    radius: Array1<f64>,
    scale: Array1<f64>,
}

impl fmt::Debug for PenaltyBalls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PenaltyBalls")
            .field("pending_points", &self.pending_points)
            .field("radius", &self.radius)
            .field("scale", &self.scale)
            .finish()
    }
}

impl PenaltyBalls {
    fn new(
        model: Arc<dyn ProbabilisticModel>,
        pending_points: &ArrayView2<f64>,
        lipschitz_constant: f64,
        eta: f64,
    ) -> Result<Self> {
        let mut balls = PenaltyBalls {
            model,
            pending_points: Array2::zeros((0, pending_points.ncols())),
            radius: Array1::zeros(0),
            scale: Array1::zeros(0),
        };
        balls.update(pending_points, lipschitz_constant, eta)?;
        Ok(balls)
    }

    fn update(
        &mut self,
        pending_points: &ArrayView2<f64>,
        lipschitz_constant: f64,
        eta: f64,
    ) -> Result<()> {
        if lipschitz_constant.is_nan() || lipschitz_constant <= 0. {
            return Err(AcquisitionError::InvalidArgument(format!(
                "Lipschitz constant should be positive, got {lipschitz_constant}"
            )));
        }
        if pending_points.nrows() == 0 {
            return Err(AcquisitionError::InvalidArgument(
                "penalizer requires at least one pending point".to_string(),
            ));
        }
        let (mean, var) = self.model.predict(pending_points)?;
        self.radius = mean.column(0).mapv(|m| (m - eta) / lipschitz_constant);
        self.scale = var
            .column(0)
            .mapv(|v| (v.max(0.).sqrt() / lipschitz_constant).max(MIN_SCALE));
        self.pending_points = pending_points.to_owned();
        debug!(
            "Penalize {} pending point(s), radius {}, scale {}",
            self.pending_points.nrows(),
            self.radius,
            self.scale
        );
        Ok(())
    }

    /// Distances `[N, M]` from `x` to pending points
    fn distances(&self, x: &ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.pending_points.ncols() {
            return Err(AcquisitionError::InvalidArgument(format!(
                "expected points of dimension {}, got {:?}",
                self.pending_points.ncols(),
                x.shape()
            )));
        }
        Ok(pairwise_distances(x, &self.pending_points.view()))
    }

    /// Applies `penalty(distance, radius, scale)` to each (point, pending point) pair
    /// and returns the product over pending points
    fn penalize(
        &self,
        x: &ArrayView2<f64>,
        penalty: impl Fn(f64, f64, f64) -> f64,
    ) -> Result<Array2<f64>> {
        let mut dists = self.distances(x)?;
        for ((_, j), d) in dists.indexed_iter_mut() {
            *d = penalty(*d, self.radius[j], self.scale[j]);
        }
        Ok(dists
            .map_axis(Axis(1), |row| row.product())
            .insert_axis(Axis(1)))
    }
}

/// Soft local penalizer: `cdf((|x - p| - radius) / scale)`
#[derive(Debug)]
pub struct SoftLocalPenalizer {
    balls: PenaltyBalls,
}

impl SoftLocalPenalizer {
    pub fn new(
        model: Arc<dyn ProbabilisticModel>,
        pending_points: &ArrayView2<f64>,
        lipschitz_constant: f64,
        eta: f64,
    ) -> Result<Self> {
        Ok(SoftLocalPenalizer {
            balls: PenaltyBalls::new(model, pending_points, lipschitz_constant, eta)?,
        })
    }
}

impl PenalizationFunction for SoftLocalPenalizer {
    fn call(&self, x: &ArrayView2<f64>) -> Result<Array2<f64>> {
        self.balls
            .penalize(x, |d, radius, scale| norm_cdf((d - radius) / scale))
    }
}

impl UpdatablePenalizationFunction for SoftLocalPenalizer {
    fn update(
        &mut self,
        pending_points: &ArrayView2<f64>,
        lipschitz_constant: f64,
        eta: f64,
    ) -> Result<()> {
        self.balls.update(pending_points, lipschitz_constant, eta)
    }
}

/// Hard local penalizer: `min(|x - p| / (radius + scale), 1)`
#[derive(Debug)]
pub struct HardLocalPenalizer {
    balls: PenaltyBalls,
}

impl HardLocalPenalizer {
    pub fn new(
        model: Arc<dyn ProbabilisticModel>,
        pending_points: &ArrayView2<f64>,
        lipschitz_constant: f64,
        eta: f64,
    ) -> Result<Self> {
        Ok(HardLocalPenalizer {
            balls: PenaltyBalls::new(model, pending_points, lipschitz_constant, eta)?,
        })
    }
}

impl PenalizationFunction for HardLocalPenalizer {
    fn call(&self, x: &ArrayView2<f64>) -> Result<Array2<f64>> {
        self.balls.penalize(x, |d, radius, scale| {
            let border = radius + scale;
            if border > 0. { (d / border).min(1.) } else { 1. }
        })
    }
}

impl UpdatablePenalizationFunction for HardLocalPenalizer {
    fn update(
        &mut self,
        pending_points: &ArrayView2<f64>,
        lipschitz_constant: f64,
        eta: f64,
    ) -> Result<()> {
        self.balls.update(pending_points, lipschitz_constant, eta)
    }
}
