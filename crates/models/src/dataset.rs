//! Training data and tag addressing
//!
//! A [`Dataset`] pairs query points `[N, D]` with observations `[N, L]`, index aligned.
//! A [`Tag`] names one (model, dataset) pair of a multi-output problem: tagged mappings
//! ([`Datasets`], `Models`) are the only way builders address individual models.

use crate::errors::{ModelError, Result};
use ndarray::{Array2, Axis, concatenate, s};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// An opaque key identifying one (model, dataset) pair
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Tag(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Tag(name.to_string())
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag(name)
    }
}

impl Borrow<str> for Tag {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tagged datasets as produced by an observer
pub type Datasets = BTreeMap<Tag, Dataset>;

/// Immutable container of query points and matching observations
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    query_points: Array2<f64>,
    observations: Array2<f64>,
}

impl Dataset {
    /// Constructor from query points `[N, D]` and observations `[N, L]`
    ///
    /// Fails with a dimension mismatch when leading lengths differ.
    pub fn new(query_points: Array2<f64>, observations: Array2<f64>) -> Result<Self> {
        if query_points.nrows() != observations.nrows() {
            return Err(ModelError::DimensionMismatch {
                what: "observations rows".to_string(),
                expected: vec![query_points.nrows()],
                actual: vec![observations.nrows()],
            });
        }
        Ok(Dataset {
            query_points,
            observations,
        })
    }

    pub fn query_points(&self) -> &Array2<f64> {
        &self.query_points
    }

    pub fn observations(&self) -> &Array2<f64> {
        &self.observations
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.query_points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Search space dimension `D`
    pub fn query_point_dim(&self) -> usize {
        self.query_points.ncols()
    }

    /// Observation width `L`
    pub fn observation_dim(&self) -> usize {
        self.observations.ncols()
    }

    /// Returns a new dataset made of `self` points followed by `other` points
    ///
    /// Trailing dimensions of query points and observations have to match.
    pub fn concat(&self, other: &Dataset) -> Result<Dataset> {
        if self.query_point_dim() != other.query_point_dim() {
            return Err(ModelError::DimensionMismatch {
                what: "query points".to_string(),
                expected: self.query_points.shape().to_vec(),
                actual: other.query_points.shape().to_vec(),
            });
        }
        if self.observation_dim() != other.observation_dim() {
            return Err(ModelError::DimensionMismatch {
                what: "observations".to_string(),
                expected: self.observations.shape().to_vec(),
                actual: other.observations.shape().to_vec(),
            });
        }
        Dataset::new(
            concatenate(Axis(0), &[self.query_points.view(), other.query_points.view()])?,
            concatenate(Axis(0), &[self.observations.view(), other.observations.view()])?,
        )
    }

    /// Returns the dataset restricted to the points at the given indices
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            query_points: self.query_points.select(Axis(0), indices),
            observations: self.observations.select(Axis(0), indices),
        }
    }

    /// Splits observations columns into contiguous chunks of the given sizes,
    /// each chunk paired with the same query points.
    ///
    /// Sizes have to sum to the observation width, nothing is built otherwise.
    pub fn split_observations(&self, sizes: &[usize]) -> Result<Vec<Dataset>> {
        let total: usize = sizes.iter().sum();
        if total != self.observation_dim() {
            return Err(ModelError::DimensionMismatch {
                what: "observations width".to_string(),
                expected: vec![total],
                actual: vec![self.observation_dim()],
            });
        }
        let mut start = 0;
        let chunks = sizes
            .iter()
            .map(|&size| {
                let chunk = Dataset {
                    query_points: self.query_points.clone(),
                    observations: self
                        .observations
                        .slice(s![.., start..start + size])
                        .to_owned(),
                };
                start += size;
                chunk
            })
            .collect();
        Ok(chunks)
    }
}

/// Returns the dataset registered for `tag` or a missing tag error
pub fn dataset_for<'a>(datasets: &'a Datasets, tag: &Tag) -> Result<&'a Dataset> {
    datasets.get(tag).ok_or_else(|| ModelError::MissingTag {
        tag: tag.to_string(),
        registry: "datasets",
    })
}
