//! Observers evaluate query points and return tagged datasets
//!
//! The [`FailureAwareObserver`] handles objectives failing on parts of the search space,
//! failures being reported as NaN values. It returns two datasets: the successful evaluations
//! to train the objective model, and the validity of every query point to train a failure
//! classifier, whose predicted mean is the probability of a valid evaluation.

use crate::errors::{AcquisitionError, Result};
use crate::utils::filter_nans;
use log::info;
use ndarray::{Array2, ArrayView2, Axis};
use std::fmt;
use tagbo_models::{Dataset, Datasets, Tag};

/// Default tag of the successful objective evaluations
pub const OBJECTIVE: &str = "OBJECTIVE";
/// Default tag of the evaluation validity labels
pub const FAILURE: &str = "FAILURE";

/// Evaluates query points `[N, D]` and returns the resulting tagged datasets
pub trait Observer {
    fn observe(&mut self, x: &ArrayView2<f64>) -> Result<Datasets>;
}

/// Observer of an objective function returning NaN (or infinite) values on failure.
///
/// The objective dataset only holds rows where every value is finite, the failure dataset
/// holds every query point labelled `1.0` when valid and `0.0` when failed.
pub struct FailureAwareObserver<F> {
    objective: F,
    objective_tag: Tag,
    failure_tag: Tag,
}

impl<F> fmt::Debug for FailureAwareObserver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureAwareObserver")
            .field("objective_tag", &self.objective_tag)
            .field("failure_tag", &self.failure_tag)
            .finish()
    }
}

impl<F: FnMut(&ArrayView2<f64>) -> Array2<f64>> FailureAwareObserver<F> {
    pub fn new(objective: F) -> Self {
        FailureAwareObserver {
            objective,
            objective_tag: Tag::from(OBJECTIVE),
            failure_tag: Tag::from(FAILURE),
        }
    }

    pub fn objective_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.objective_tag = tag.into();
        self
    }

    pub fn failure_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.failure_tag = tag.into();
        self
    }
}

impl<F: FnMut(&ArrayView2<f64>) -> Array2<f64>> Observer for FailureAwareObserver<F> {
    fn observe(&mut self, x: &ArrayView2<f64>) -> Result<Datasets> {
        if self.objective_tag == self.failure_tag {
            return Err(AcquisitionError::ObserverError(format!(
                "objective and failure datasets share the tag {}",
                self.objective_tag
            )));
        }
        let y = (self.objective)(x);
        if y.nrows() != x.nrows() {
            return Err(AcquisitionError::ObserverError(format!(
                "{} values for {} query points",
                y.nrows(),
                x.nrows()
            )));
        }
        let (valid, invalid) = filter_nans(&y);
        if !invalid.is_empty() {
            info!("{} point(s) failed during evaluation", invalid.len());
        }

        let objective = Dataset::new(x.select(Axis(0), &valid), y.select(Axis(0), &valid))?;
        let mut labels = Array2::zeros((x.nrows(), 1));
        valid.iter().for_each(|&i| labels[[i, 0]] = 1.);
        let failure = Dataset::new(x.to_owned(), labels)?;

        let mut datasets = Datasets::new();
        datasets.insert(self.objective_tag.clone(), objective);
        datasets.insert(self.failure_tag.clone(), failure);
        Ok(datasets)
    }
}

/// Appends `new` datasets to `datasets` tag by tag, unknown tags are inserted as is
pub fn merge_datasets(datasets: &mut Datasets, new: Datasets) -> Result<()> {
    for (tag, data) in new {
        let merged = match datasets.get(&tag) {
            Some(existing) => existing.concat(&data)?,
            None => data,
        };
        datasets.insert(tag, merged);
    }
    Ok(())
}
