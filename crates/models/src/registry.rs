//! Explicit model registry
//!
//! The [`ModelRegistry`] is a dispatch table from a model kind name to a constructor
//! building a trainable model from initial data. It is built by the caller at setup time
//! and passed around explicitly, there is no global registration.
//!
//! ```ignore
//! let registry = ModelRegistry::new()
//!     .register("gpr", |data| {
//!         Ok(Box::new(MyGpr::fit(data)?) as Box<dyn TrainableProbabilisticModel>)
//!     })
//!     .register("vgp", |data| {
//!         Ok(Box::new(MyVgp::new(data)?) as Box<dyn TrainableProbabilisticModel>)
//!     });
//! let configs = BTreeMap::from([
//!     (Tag::from("OBJECTIVE"), ModelConfig::new("gpr").optimize(true)),
//!     (Tag::from("FAILURE"), ModelConfig::new("vgp")),
//! ]);
//! let models = registry.build_all(&configs, &initial_data)?;
//! ```

use crate::dataset::{Dataset, Datasets, Tag, dataset_for};
use crate::errors::{ModelError, Result};
use crate::model_interfaces::TrainableProbabilisticModel;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A constructor of trainable model given initial training data
pub type ModelConstructor =
    Box<dyn Fn(&Dataset) -> Result<Box<dyn TrainableProbabilisticModel>> + Send + Sync>;

/// Specification of a model to be built with a [`ModelRegistry`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Name of the constructor registered in the registry
    pub kind: String,
    /// Whether the model is optimized against its initial data once built
    pub optimize: bool,
}

impl ModelConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        ModelConfig {
            kind: kind.into(),
            optimize: false,
        }
    }

    /// Sets whether the built model is optimized on its initial data
    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }
}

/// Dispatch table from model kind names to model constructors
#[derive(Default)]
pub struct ModelRegistry {
    constructors: BTreeMap<String, ModelConstructor>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("kinds", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the constructor used for `kind`
    pub fn register<F>(mut self, kind: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&Dataset) -> Result<Box<dyn TrainableProbabilisticModel>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Box::new(constructor));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered kinds in lexicographic order
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(|k| k.as_str())
    }

    /// Builds the model specified by `config` from `dataset`,
    /// optimizing it when requested
    pub fn build(
        &self,
        config: &ModelConfig,
        dataset: &Dataset,
    ) -> Result<Box<dyn TrainableProbabilisticModel>> {
        let constructor = self
            .constructors
            .get(&config.kind)
            .ok_or_else(|| ModelError::UnknownModelKind(config.kind.clone()))?;
        let mut model = constructor(dataset)?;
        if config.optimize {
            info!("Optimize {} model on {} points", config.kind, dataset.len());
            model.optimize(dataset)?;
        }
        Ok(model)
    }

    /// Builds one model per tagged configuration, each one from the dataset of the same tag
    pub fn build_all(
        &self,
        configs: &BTreeMap<Tag, ModelConfig>,
        datasets: &Datasets,
    ) -> Result<BTreeMap<Tag, Box<dyn TrainableProbabilisticModel>>> {
        configs
            .iter()
            .map(|(tag, config)| {
                let dataset = dataset_for(datasets, tag)?;
                info!("Build {} model for tag {tag}", config.kind);
                Ok((tag.clone(), self.build(config, dataset)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProbabilisticModel;
    use crate::testing::LinearModel;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2, array};

    fn registry() -> ModelRegistry {
        ModelRegistry::new().register("linear", |data: &Dataset| {
            let mut model = LinearModel::new(
                Array2::zeros((data.query_point_dim(), data.observation_dim())),
                Array1::zeros(data.observation_dim()),
                Array1::ones(data.observation_dim()),
            );
            model.update(data)?;
            Ok(Box::new(model) as Box<dyn TrainableProbabilisticModel>)
        })
    }

    #[test]
    fn test_build_with_optimization() {
        let data = Dataset::new(array![[0.], [1.]], array![[1.], [3.]]).unwrap();
        let reg = registry();
        assert!(reg.contains("linear"));
        assert_eq!(reg.kinds().collect::<Vec<_>>(), vec!["linear"]);

        let model = reg.build(&ModelConfig::new("linear"), &data).unwrap();
        let (mean, _) = model.predict(&array![[0.5]].view()).unwrap();
        assert_abs_diff_eq!(mean[[0, 0]], 0.);

        let model = reg
            .build(&ModelConfig::new("linear").optimize(true), &data)
            .unwrap();
        let (mean, _) = model.predict(&array![[0.5]].view()).unwrap();
        assert_abs_diff_eq!(mean[[0, 0]], 2.);
    }

    #[test]
    fn test_unknown_kind() {
        let data = Dataset::new(array![[0.]], array![[1.]]).unwrap();
        assert!(matches!(
            registry().build(&ModelConfig::new("gpr"), &data),
            Err(ModelError::UnknownModelKind(kind)) if kind == "gpr"
        ));
    }

    #[test]
    fn test_build_all_by_tag() {
        let mut datasets = Datasets::new();
        datasets.insert(
            Tag::from("OBJECTIVE"),
            Dataset::new(array![[0., 0.]], array![[1.]]).unwrap(),
        );
        datasets.insert(
            Tag::from("FAILURE"),
            Dataset::new(array![[0., 0.], [1., 1.]], array![[1.], [0.]]).unwrap(),
        );
        let mut configs = BTreeMap::new();
        configs.insert(Tag::from("OBJECTIVE"), ModelConfig::new("linear").optimize(true));
        configs.insert(Tag::from("FAILURE"), ModelConfig::new("linear"));
        let models = registry().build_all(&configs, &datasets).unwrap();
        assert_eq!(models.len(), 2);
        assert!(models.contains_key("OBJECTIVE"));

        configs.insert(Tag::from("CONSTRAINT"), ModelConfig::new("linear"));
        assert!(matches!(
            registry().build_all(&configs, &datasets),
            Err(ModelError::MissingTag { tag, .. }) if tag == "CONSTRAINT"
        ));
    }

    #[test]
    fn test_model_config_serde() {
        let config = ModelConfig::new("gpr").optimize(true);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"kind":"gpr","optimize":true}"#);
        let back: ModelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
