//! Probabilistic model capabilities
//!
//! This module defines the capability traits any surrogate wrapper implements to be
//! used by acquisition builders ([`ProbabilisticModel`]) and to be trained by the
//! optimization loop or a [`ModelStack`](crate::ModelStack) ([`TrainableProbabilisticModel`]).
//!
//! Shape conventions, for an output event of size `E`:
//!
//! | operation | input | output |
//! |---|---|---|
//! | `predict` | `[N, D]` | mean `[N, E]`, variance `[N, E]` |
//! | `predict_joint` | `[B, D]` | mean `[B, E]`, covariance `[E, B, B]` |
//! | `sample` | `[N, D]` | samples `[S, N, E]` |

use crate::dataset::Dataset;
use crate::errors::{ModelError, Result};
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256Plus;
use std::fmt::Debug;

/// A model providing a predictive distribution over its outputs
pub trait ProbabilisticModel: Debug + Send + Sync {
    /// Returns the mean and variance of the independent marginal distributions
    /// at each point of `x` (shape `[N, D]`). Both have shape `[N, E]`.
    ///
    /// Prediction never alters the model state.
    fn predict(&self, x: &ArrayView2<f64>) -> Result<(Array2<f64>, Array2<f64>)>;

    /// Returns the mean `[B, E]` and covariance `[E, B, B]` of the joint distribution
    /// over the batch of points `x` (shape `[B, D]`).
    fn predict_joint(&self, _x: &ArrayView2<f64>) -> Result<(Array2<f64>, Array3<f64>)> {
        Err(ModelError::UnsupportedCapability {
            model: format!("{self:?}"),
            capability: "joint prediction",
        })
    }

    /// Returns `num_samples` draws from the independent marginal distributions at `x`
    /// (shape `[N, D]`) as an array of shape `[S, N, E]`.
    ///
    /// Draws only depend on `rng` state so a seeded generator gives reproducible samples.
    fn sample(
        &self,
        _x: &ArrayView2<f64>,
        _num_samples: usize,
        _rng: &mut Xoshiro256Plus,
    ) -> Result<Array3<f64>> {
        Err(ModelError::UnsupportedCapability {
            model: format!("{self:?}"),
            capability: "sampling",
        })
    }
}

/// A probabilistic model which can take new data into account and be retrained
pub trait TrainableProbabilisticModel: ProbabilisticModel {
    /// Incorporates `dataset` without optimizing hyperparameters.
    ///
    /// Query points and observations widths are constant over the model lifetime,
    /// a dataset with other widths fails with [`ModelError::DimensionMismatch`].
    fn update(&mut self, dataset: &Dataset) -> Result<()>;

    /// Optimizes the model (hyper)parameters against `dataset`.
    ///
    /// `dataset` may differ from the one given to the last [`update`](Self::update).
    fn optimize(&mut self, dataset: &Dataset) -> Result<()>;
}

/// Checks `new_data` has the same trailing dimensions than `existing_data`
pub fn check_data_compatibility(new_data: &Dataset, existing_data: &Dataset) -> Result<()> {
    if new_data.query_point_dim() != existing_data.query_point_dim() {
        return Err(ModelError::DimensionMismatch {
            what: "query points".to_string(),
            expected: existing_data.query_points().shape().to_vec(),
            actual: new_data.query_points().shape().to_vec(),
        });
    }
    if new_data.observation_dim() != existing_data.observation_dim() {
        return Err(ModelError::DimensionMismatch {
            what: "observations".to_string(),
            expected: existing_data.observations().shape().to_vec(),
            actual: new_data.observations().shape().to_vec(),
        });
    }
    Ok(())
}

/// Draws `num_samples` independent gaussian samples given marginal `mean` and `variance`
/// of shape `[N, E]`, returns samples of shape `[S, N, E]`
pub fn sample_marginals(
    mean: &Array2<f64>,
    variance: &Array2<f64>,
    num_samples: usize,
    rng: &mut Xoshiro256Plus,
) -> Result<Array3<f64>> {
    if mean.dim() != variance.dim() {
        return Err(ModelError::ShapeAssertion(format!(
            "mean {:?} and variance {:?} shapes differ",
            mean.shape(),
            variance.shape()
        )));
    }
    let (n, e) = mean.dim();
    let mut samples = Array3::<f64>::random_using((num_samples, n, e), StandardNormal, rng);
    let std = variance.mapv(|v| v.max(0.).sqrt());
    samples.axis_iter_mut(Axis(0)).for_each(|mut draw| {
        Zip::from(&mut draw)
            .and(mean)
            .and(&std)
            .for_each(|z, &m, &s| *z = m + s * *z);
    });
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use ndarray_rand::rand::SeedableRng;

    #[derive(Debug)]
    struct MarginalOnly;

    impl ProbabilisticModel for MarginalOnly {
        fn predict(&self, x: &ArrayView2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
            Ok((Array2::zeros((x.nrows(), 1)), Array2::ones((x.nrows(), 1))))
        }
    }

    #[test]
    fn test_unsupported_capabilities() {
        let model = MarginalOnly;
        let x = array![[0.], [1.]];
        assert!(model.predict(&x.view()).is_ok());
        assert!(matches!(
            model.predict_joint(&x.view()),
            Err(ModelError::UnsupportedCapability {
                capability: "joint prediction",
                ..
            })
        ));
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        assert!(matches!(
            model.sample(&x.view(), 3, &mut rng),
            Err(ModelError::UnsupportedCapability {
                capability: "sampling",
                ..
            })
        ));
    }

    #[test]
    fn test_check_data_compatibility() {
        let existing = Dataset::new(array![[0., 1.]], array![[1.]]).unwrap();
        let ok = Dataset::new(array![[2., 3.], [4., 5.]], array![[1.], [2.]]).unwrap();
        assert!(check_data_compatibility(&ok, &existing).is_ok());

        let bad_x = Dataset::new(array![[2., 3., 4.]], array![[1.]]).unwrap();
        match check_data_compatibility(&bad_x, &existing) {
            Err(ModelError::DimensionMismatch {
                what,
                expected,
                actual,
            }) => {
                assert_eq!(what, "query points");
                assert_eq!(expected, vec![1, 2]);
                assert_eq!(actual, vec![1, 3]);
            }
            res => panic!("unexpected {res:?}"),
        }

        let bad_y = Dataset::new(array![[2., 3.]], array![[1., 2.]]).unwrap();
        assert!(check_data_compatibility(&bad_y, &existing).is_err());
    }

    #[test]
    fn test_sample_marginals_reproducible() {
        let mean = array![[1., -1.], [0., 2.]];
        let var = array![[0.5, 0.1], [0., 1.]];
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let s1 = sample_marginals(&mean, &var, 4, &mut rng).unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let s2 = sample_marginals(&mean, &var, 4, &mut rng).unwrap();
        assert_eq!(s1.dim(), (4, 2, 2));
        assert_eq!(s1, s2);
        // zero variance gives the mean
        for s in s1.axis_iter(Axis(0)) {
            assert_abs_diff_eq!(s[[1, 0]], 0.);
        }
    }

    #[test]
    fn test_sample_marginals_mean() {
        let mean = array![[3.]];
        let var = array![[1.]];
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let s = sample_marginals(&mean, &var, 10000, &mut rng).unwrap();
        assert_abs_diff_eq!(s.mean().unwrap(), 3., epsilon = 5e-2);
    }
}
