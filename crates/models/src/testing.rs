//! Deterministic test doubles implementing the model capabilities
//!
//! Available with the `testing` feature to let downstream crates exercise
//! the capability contracts without a real surrogate training algorithm.

use crate::dataset::Dataset;
use crate::errors::{ModelError, Result};
use crate::model_interfaces::{
    ProbabilisticModel, TrainableProbabilisticModel, sample_marginals,
};
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use rand_xoshiro::Xoshiro256Plus;
use std::sync::{Arc, Mutex};

/// Boxes a model as a trait object, handy to build a [`ModelStack`](crate::ModelStack)
pub fn boxed<M: TrainableProbabilisticModel + 'static>(
    model: M,
) -> Box<dyn TrainableProbabilisticModel> {
    Box::new(model)
}

/// Affine model `y = x.w + b` with constant noise variance per output
#[derive(Clone, Debug)]
pub struct LinearModel {
    weights: Array2<f64>,
    bias: Array1<f64>,
    noise: Array1<f64>,
    data: Option<Dataset>,
}

impl LinearModel {
    /// `weights` has shape `[D, E]`, `bias` and `noise` have shape `[E]`
    pub fn new(weights: Array2<f64>, bias: Array1<f64>, noise: Array1<f64>) -> Self {
        LinearModel {
            weights,
            bias,
            noise,
            data: None,
        }
    }

    pub fn bias(&self) -> &Array1<f64> {
        &self.bias
    }

    pub fn data(&self) -> Option<&Dataset> {
        self.data.as_ref()
    }

    fn check_input(&self, x: &ArrayView2<f64>) -> Result<()> {
        if x.ncols() != self.weights.nrows() {
            return Err(ModelError::DimensionMismatch {
                what: "input points".to_string(),
                expected: vec![x.nrows(), self.weights.nrows()],
                actual: x.shape().to_vec(),
            });
        }
        Ok(())
    }

    fn check_dataset(&self, dataset: &Dataset) -> Result<()> {
        if dataset.query_point_dim() != self.weights.nrows()
            || dataset.observation_dim() != self.weights.ncols()
        {
            return Err(ModelError::DimensionMismatch {
                what: "dataset".to_string(),
                expected: vec![self.weights.nrows(), self.weights.ncols()],
                actual: vec![dataset.query_point_dim(), dataset.observation_dim()],
            });
        }
        Ok(())
    }
}

impl ProbabilisticModel for LinearModel {
    fn predict(&self, x: &ArrayView2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        self.check_input(x)?;
        let mean = x.dot(&self.weights) + &self.bias;
        let var = Array2::from_shape_fn(mean.dim(), |(_, j)| self.noise[j]);
        Ok((mean, var))
    }

    fn predict_joint(&self, x: &ArrayView2<f64>) -> Result<(Array2<f64>, Array3<f64>)> {
        let (mean, _) = self.predict(x)?;
        let b = x.nrows();
        let cov = Array3::from_shape_fn((self.noise.len(), b, b), |(e, i, j)| {
            if i == j { self.noise[e] } else { 0. }
        });
        Ok((mean, cov))
    }

    fn sample(
        &self,
        x: &ArrayView2<f64>,
        num_samples: usize,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Array3<f64>> {
        let (mean, var) = self.predict(x)?;
        sample_marginals(&mean, &var, num_samples, rng)
    }
}

impl TrainableProbabilisticModel for LinearModel {
    fn update(&mut self, dataset: &Dataset) -> Result<()> {
        self.check_dataset(dataset)?;
        self.data = Some(dataset.clone());
        Ok(())
    }

    /// Refits the bias as the mean residual of the observations
    fn optimize(&mut self, dataset: &Dataset) -> Result<()> {
        self.check_dataset(dataset)?;
        let residuals = dataset.observations() - &dataset.query_points().dot(&self.weights);
        self.bias = residuals.mean_axis(Axis(0)).ok_or_else(|| {
            ModelError::OptimizationFailure("cannot fit bias on empty dataset".to_string())
        })?;
        Ok(())
    }
}

/// Shared record of the datasets received by a [`RecordingModel`]
#[derive(Clone, Debug, Default)]
pub struct UpdateLog {
    updates: Arc<Mutex<Vec<Dataset>>>,
    optimizations: Arc<Mutex<Vec<Dataset>>>,
}

impl UpdateLog {
    pub fn updates(&self) -> Vec<Dataset> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn optimizations(&self) -> Vec<Dataset> {
        self.optimizations
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default()
    }
}

/// Model predicting zero mean and unit variance which records the datasets it is trained on.
/// Joint prediction and sampling are not supported.
#[derive(Clone, Debug)]
pub struct RecordingModel {
    input_dim: usize,
    event_size: usize,
    log: UpdateLog,
}

impl RecordingModel {
    pub fn new(input_dim: usize, event_size: usize, log: UpdateLog) -> Self {
        RecordingModel {
            input_dim,
            event_size,
            log,
        }
    }

    fn check_dataset(&self, dataset: &Dataset) -> Result<()> {
        if dataset.query_point_dim() != self.input_dim
            || dataset.observation_dim() != self.event_size
        {
            return Err(ModelError::DimensionMismatch {
                what: "dataset".to_string(),
                expected: vec![self.input_dim, self.event_size],
                actual: vec![dataset.query_point_dim(), dataset.observation_dim()],
            });
        }
        Ok(())
    }
}

impl ProbabilisticModel for RecordingModel {
    fn predict(&self, x: &ArrayView2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        Ok((
            Array2::zeros((x.nrows(), self.event_size)),
            Array2::ones((x.nrows(), self.event_size)),
        ))
    }
}

impl TrainableProbabilisticModel for RecordingModel {
    fn update(&mut self, dataset: &Dataset) -> Result<()> {
        self.check_dataset(dataset)?;
        if let Ok(mut updates) = self.log.updates.lock() {
            updates.push(dataset.clone());
        }
        Ok(())
    }

    fn optimize(&mut self, dataset: &Dataset) -> Result<()> {
        self.check_dataset(dataset)?;
        if let Ok(mut optimizations) = self.log.optimizations.lock() {
            optimizations.push(dataset.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_linear_model_update_dimension_mismatch() {
        let mut model = LinearModel::new(array![[1.], [2.]], array![0.], array![1.]);
        let ok = Dataset::new(array![[0., 1.]], array![[2.]]).unwrap();
        assert!(model.update(&ok).is_ok());
        let bad = Dataset::new(array![[0., 1., 2.]], array![[2.]]).unwrap();
        match model.update(&bad) {
            Err(ModelError::DimensionMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, vec![2, 1]);
                assert_eq!(actual, vec![3, 1]);
            }
            res => panic!("unexpected {res:?}"),
        }
        assert_eq!(model.data(), Some(&ok));
    }

    #[test]
    fn test_linear_model_optimize_bias() {
        let mut model = LinearModel::new(array![[1.]], array![0.], array![1.]);
        let data = Dataset::new(array![[0.], [1.]], array![[2.], [3.]]).unwrap();
        model.optimize(&data).unwrap();
        assert_abs_diff_eq!(model.bias(), &array![2.]);

        let empty = Dataset::new(Array2::zeros((0, 1)), Array2::zeros((0, 1))).unwrap();
        assert!(matches!(
            model.optimize(&empty),
            Err(ModelError::OptimizationFailure(_))
        ));
    }
}
