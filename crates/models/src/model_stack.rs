//! Model stacking
//!
//! A [`ModelStack`] presents several independently trained models as a single
//! [`TrainableProbabilisticModel`] whose outputs are the concatenation of the
//! constituents outputs in constructor order. Outputs of two different constituents
//! are assumed independent, a constituent may itself be multi-output.

use crate::dataset::Dataset;
use crate::errors::{ModelError, Result};
use crate::model_interfaces::{ProbabilisticModel, TrainableProbabilisticModel};
use log::debug;
use ndarray::{Array2, Array3, ArrayView2, Axis, concatenate};
use rand_xoshiro::Xoshiro256Plus;

/// A stack of trainable models, each one owning `event_size` contiguous output columns
#[derive(Debug)]
pub struct ModelStack {
    models: Vec<Box<dyn TrainableProbabilisticModel>>,
    event_sizes: Vec<usize>,
    /// Query point dimension of the first dataset dispatched to every model
    query_point_dim: Option<usize>,
}

impl ModelStack {
    /// Constructor from models paired with the sizes of their output events.
    ///
    /// The order of the given models determines the order of the stack output columns.
    /// At least one model is required and every event size is strictly positive.
    pub fn new(
        models_with_event_sizes: Vec<(Box<dyn TrainableProbabilisticModel>, usize)>,
    ) -> Result<Self> {
        if models_with_event_sizes.is_empty() {
            return Err(ModelError::ShapeAssertion(
                "ModelStack requires at least one model".to_string(),
            ));
        }
        if let Some(i) = models_with_event_sizes.iter().position(|(_, e)| *e == 0) {
            return Err(ModelError::ShapeAssertion(format!(
                "ModelStack model #{i} has a null event size"
            )));
        }
        let (models, event_sizes) = models_with_event_sizes.into_iter().unzip();
        Ok(ModelStack {
            models,
            event_sizes,
            query_point_dim: None,
        })
    }

    /// Event sizes of the constituents in constructor order
    pub fn event_sizes(&self) -> &[usize] {
        &self.event_sizes
    }

    /// Output dimension of the stack, sum of the constituents event sizes
    pub fn event_size(&self) -> usize {
        self.event_sizes.iter().sum()
    }

    /// Number of stacked models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Read-only access to the constituents, they are mutated only through the stack
    pub fn models(&self) -> impl Iterator<Item = &dyn TrainableProbabilisticModel> {
        self.models.iter().map(|m| m.as_ref())
    }

    /// Query point dimension established by the first successful update or optimization
    pub fn query_point_dim(&self) -> Option<usize> {
        self.query_point_dim
    }

    /// Splits the dataset per model once its query point dimension is checked
    fn split(&self, dataset: &Dataset) -> Result<Vec<Dataset>> {
        if let Some(dim) = self.query_point_dim
            && dim != dataset.query_point_dim()
        {
            return Err(ModelError::DimensionMismatch {
                what: "query points width".to_string(),
                expected: vec![dim],
                actual: vec![dataset.query_point_dim()],
            });
        }
        dataset.split_observations(&self.event_sizes)
    }

    fn check_event(&self, i: usize, what: &str, width: usize) -> Result<()> {
        if width != self.event_sizes[i] {
            return Err(ModelError::ShapeAssertion(format!(
                "ModelStack model #{i} {what} has {width} outputs, declared event size is {}",
                self.event_sizes[i]
            )));
        }
        Ok(())
    }
}

impl ProbabilisticModel for ModelStack {
    /// Returns predictions of all the stacked models concatenated along the event axis,
    /// mean and variance have shape `[N, sum(E_i)]`
    fn predict(&self, x: &ArrayView2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        let mut means = Vec::with_capacity(self.len());
        let mut vars = Vec::with_capacity(self.len());
        for (i, model) in self.models.iter().enumerate() {
            let (mean, var) = model.predict(x)?;
            self.check_event(i, "mean", mean.ncols())?;
            self.check_event(i, "variance", var.ncols())?;
            means.push(mean);
            vars.push(var);
        }
        let means = means.iter().map(|m| m.view()).collect::<Vec<_>>();
        let vars = vars.iter().map(|v| v.view()).collect::<Vec<_>>();
        Ok((concatenate(Axis(1), &means)?, concatenate(Axis(1), &vars)?))
    }

    /// Returns joint predictions of all the stacked models: mean has shape `[B, sum(E_i)]`,
    /// covariance blocks are stacked along the leading axis giving shape `[sum(E_i), B, B]`
    fn predict_joint(&self, x: &ArrayView2<f64>) -> Result<(Array2<f64>, Array3<f64>)> {
        let mut means = Vec::with_capacity(self.len());
        let mut covs = Vec::with_capacity(self.len());
        for (i, model) in self.models.iter().enumerate() {
            let (mean, cov) = model.predict_joint(x)?;
            self.check_event(i, "joint mean", mean.ncols())?;
            self.check_event(i, "covariance", cov.len_of(Axis(0)))?;
            means.push(mean);
            covs.push(cov);
        }
        let means = means.iter().map(|m| m.view()).collect::<Vec<_>>();
        let covs = covs.iter().map(|c| c.view()).collect::<Vec<_>>();
        Ok((concatenate(Axis(1), &means)?, concatenate(Axis(0), &covs)?))
    }

    /// Returns samples of all the stacked models concatenated along the event axis,
    /// shape is `[S, N, sum(E_i)]`. Models are sampled in constructor order with the same `rng`.
    fn sample(
        &self,
        x: &ArrayView2<f64>,
        num_samples: usize,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Array3<f64>> {
        let mut samples = Vec::with_capacity(self.len());
        for (i, model) in self.models.iter().enumerate() {
            let s = model.sample(x, num_samples, rng)?;
            self.check_event(i, "samples", s.len_of(Axis(2)))?;
            samples.push(s);
        }
        let samples = samples.iter().map(|s| s.view()).collect::<Vec<_>>();
        Ok(concatenate(Axis(2), &samples)?)
    }
}

impl TrainableProbabilisticModel for ModelStack {
    /// Updates every stacked model with its own observation columns.
    /// Widths are checked and the dataset split before any model is updated,
    /// the first model error stops the dispatch.
    fn update(&mut self, dataset: &Dataset) -> Result<()> {
        let chunks = self.split(dataset)?;
        debug!("ModelStack update with {} points", dataset.len());
        for (model, chunk) in self.models.iter_mut().zip(chunks.iter()) {
            model.update(chunk)?;
        }
        self.query_point_dim = Some(dataset.query_point_dim());
        Ok(())
    }

    /// Optimizes every stacked model with its own observation columns.
    /// Widths are checked and the dataset split before any model is optimized.
    fn optimize(&mut self, dataset: &Dataset) -> Result<()> {
        let chunks = self.split(dataset)?;
        debug!("ModelStack optimization with {} points", dataset.len());
        for (model, chunk) in self.models.iter_mut().zip(chunks.iter()) {
            model.optimize(chunk)?;
        }
        self.query_point_dim = Some(dataset.query_point_dim());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LinearModel, RecordingModel, UpdateLog, boxed};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, concatenate, s};
    use ndarray_rand::rand::SeedableRng;

    fn stack_1_2() -> (ModelStack, LinearModel, LinearModel) {
        let m1 = LinearModel::new(array![[1.], [2.]], array![0.5], array![0.1]);
        let m2 = LinearModel::new(array![[0., 1.], [1., 0.]], array![-1., 1.], array![0.2, 0.3]);
        let stack = ModelStack::new(vec![
            (boxed(m1.clone()), 1),
            (boxed(m2.clone()), 2),
        ])
        .unwrap();
        (stack, m1, m2)
    }

    #[test]
    fn test_stack_requires_models() {
        assert!(matches!(
            ModelStack::new(vec![]),
            Err(ModelError::ShapeAssertion(_))
        ));
        let m = LinearModel::new(array![[1.]], array![0.], array![1.]);
        assert!(matches!(
            ModelStack::new(vec![(boxed(m), 0)]),
            Err(ModelError::ShapeAssertion(_))
        ));
    }

    #[test]
    fn test_stack_predict_is_concatenation() {
        let (stack, m1, m2) = stack_1_2();
        assert_eq!(stack.event_size(), 3);
        let x = array![[0., 1.], [2., 3.], [-1., 0.5]];
        let (mean, var) = stack.predict(&x.view()).unwrap();
        assert_eq!(mean.dim(), (3, 3));
        assert_eq!(var.dim(), (3, 3));

        let (mean1, var1) = m1.predict(&x.view()).unwrap();
        let (mean2, var2) = m2.predict(&x.view()).unwrap();
        assert_eq!(mean.slice(s![.., 0..1]), mean1);
        assert_eq!(var.slice(s![.., 0..1]), var1);
        assert_eq!(mean.slice(s![.., 1..3]), mean2);
        assert_eq!(var.slice(s![.., 1..3]), var2);
    }

    #[test]
    fn test_stack_predict_joint() {
        let (stack, m1, m2) = stack_1_2();
        let x = array![[0., 1.], [2., 3.]];
        let (mean, cov) = stack.predict_joint(&x.view()).unwrap();
        assert_eq!(mean.dim(), (2, 3));
        assert_eq!(cov.dim(), (3, 2, 2));

        let (_, cov1) = m1.predict_joint(&x.view()).unwrap();
        let (_, cov2) = m2.predict_joint(&x.view()).unwrap();
        assert_eq!(cov.slice(s![0..1, .., ..]), cov1);
        assert_eq!(cov.slice(s![1..3, .., ..]), cov2);
    }

    #[test]
    fn test_stack_sample() {
        let (stack, _, _) = stack_1_2();
        let x = array![[0., 1.], [2., 3.]];
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let samples = stack.sample(&x.view(), 5, &mut rng).unwrap();
        assert_eq!(samples.dim(), (5, 2, 3));
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let again = stack.sample(&x.view(), 5, &mut rng).unwrap();
        assert_eq!(samples, again);
    }

    #[test]
    fn test_single_model_stack_is_transparent() {
        let m = LinearModel::new(array![[1.], [-2.]], array![0.5], array![0.25]);
        let stack = ModelStack::new(vec![(boxed(m.clone()), 1)]).unwrap();
        let x = array![[0., 1.], [2., 3.], [1., 1.]];

        assert_eq!(stack.predict(&x.view()).unwrap(), m.predict(&x.view()).unwrap());
        assert_eq!(
            stack.predict_joint(&x.view()).unwrap(),
            m.predict_joint(&x.view()).unwrap()
        );
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let s_stack = stack.sample(&x.view(), 10, &mut rng).unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let s_model = m.sample(&x.view(), 10, &mut rng).unwrap();
        assert_eq!(s_stack, s_model);
    }

    #[test]
    fn test_stack_update_routes_columns() {
        let log1 = UpdateLog::default();
        let log2 = UpdateLog::default();
        let mut stack = ModelStack::new(vec![
            (boxed(RecordingModel::new(2, 1, log1.clone())), 1),
            (boxed(RecordingModel::new(2, 2, log2.clone())), 2),
        ])
        .unwrap();

        let dataset = Dataset::new(
            array![[0., 1.], [2., 3.]],
            array![[1., 2., 3.], [4., 5., 6.]],
        )
        .unwrap();
        stack.update(&dataset).unwrap();

        let updates1 = log1.updates();
        let updates2 = log2.updates();
        assert_eq!(updates1.len(), 1);
        assert_eq!(updates2.len(), 1);
        assert_eq!(updates1[0].query_points(), dataset.query_points());
        assert_eq!(updates2[0].query_points(), dataset.query_points());
        assert_eq!(updates1[0].observations(), &array![[1.], [4.]]);
        assert_eq!(updates2[0].observations(), &array![[2., 3.], [5., 6.]]);

        stack.optimize(&dataset).unwrap();
        assert_eq!(log1.optimizations().len(), 1);
        assert_eq!(log2.optimizations()[0].observations(), &array![[2., 3.], [5., 6.]]);
    }

    #[test]
    fn test_stack_update_width_mismatch_touches_nothing() {
        let log1 = UpdateLog::default();
        let log2 = UpdateLog::default();
        let mut stack = ModelStack::new(vec![
            (boxed(RecordingModel::new(2, 1, log1.clone())), 1),
            (boxed(RecordingModel::new(2, 2, log2.clone())), 2),
        ])
        .unwrap();
        let dataset = Dataset::new(array![[0., 1.]], array![[1., 2.]]).unwrap();

        assert!(matches!(
            stack.update(&dataset),
            Err(ModelError::DimensionMismatch { expected, actual, .. })
                if expected == vec![3] && actual == vec![2]
        ));
        assert!(matches!(
            stack.optimize(&dataset),
            Err(ModelError::DimensionMismatch { .. })
        ));
        assert!(log1.updates().is_empty());
        assert!(log2.updates().is_empty());
        assert!(log1.optimizations().is_empty());
    }

    #[test]
    fn test_stack_stops_at_failing_model() {
        let log1 = UpdateLog::default();
        let log2 = UpdateLog::default();
        let log3 = UpdateLog::default();
        let mut stack = ModelStack::new(vec![
            (boxed(RecordingModel::new(2, 1, log1.clone())), 1),
            (boxed(RecordingModel::new(3, 1, log2.clone())), 1),
            (boxed(RecordingModel::new(2, 1, log3.clone())), 1),
        ])
        .unwrap();
        let dataset = Dataset::new(array![[0., 1.]], array![[1., 2., 3.]]).unwrap();

        assert!(matches!(
            stack.update(&dataset),
            Err(ModelError::DimensionMismatch { expected, actual, .. })
                if expected == vec![3, 1] && actual == vec![2, 1]
        ));
        // models before the failing one keep their update, later ones are not reached
        assert_eq!(log1.updates().len(), 1);
        assert!(log2.updates().is_empty());
        assert!(log3.updates().is_empty());
        assert_eq!(stack.query_point_dim(), None);
    }

    #[test]
    fn test_stack_query_point_dim_mismatch_touches_nothing() {
        let log1 = UpdateLog::default();
        let log2 = UpdateLog::default();
        let mut stack = ModelStack::new(vec![
            (boxed(RecordingModel::new(2, 1, log1.clone())), 1),
            (boxed(RecordingModel::new(2, 2, log2.clone())), 2),
        ])
        .unwrap();
        let dataset = Dataset::new(array![[0., 1.]], array![[1., 2., 3.]]).unwrap();
        stack.update(&dataset).unwrap();
        assert_eq!(stack.query_point_dim(), Some(2));

        let wider = Dataset::new(array![[0., 1., 2.]], array![[1., 2., 3.]]).unwrap();
        assert!(matches!(
            stack.update(&wider),
            Err(ModelError::DimensionMismatch { expected, actual, .. })
                if expected == vec![2] && actual == vec![3]
        ));
        assert!(matches!(
            stack.optimize(&wider),
            Err(ModelError::DimensionMismatch { .. })
        ));
        assert_eq!(log1.updates().len(), 1);
        assert_eq!(log2.updates().len(), 1);
        assert!(log1.optimizations().is_empty());
    }

    #[test]
    fn test_stack_detects_wrong_event_size() {
        let m = LinearModel::new(array![[1., 0.], [0., 1.]], array![0., 0.], array![1., 1.]);
        // declared with event size 1 while predicting 2 outputs
        let stack = ModelStack::new(vec![(boxed(m), 1)]).unwrap();
        let x = array![[0., 1.]];
        assert!(matches!(
            stack.predict(&x.view()),
            Err(ModelError::ShapeAssertion(_))
        ));
    }

    #[test]
    fn test_stack_of_stacks() {
        let (inner, m1, m2) = stack_1_2();
        let m3 = LinearModel::new(array![[3.], [1.]], array![1.], array![0.5]);
        let outer = ModelStack::new(vec![
            (boxed(inner), 3),
            (boxed(m3.clone()), 1),
        ])
        .unwrap();
        let x = array![[1., 2.]];
        let (mean, _) = outer.predict(&x.view()).unwrap();
        let expected = concatenate![
            Axis(1),
            m1.predict(&x.view()).unwrap().0,
            m2.predict(&x.view()).unwrap().0,
            m3.predict(&x.view()).unwrap().0
        ];
        assert_abs_diff_eq!(mean, expected);
    }
}
