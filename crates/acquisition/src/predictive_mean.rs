use crate::errors::Result;
use crate::interface::SingleModelAcquisitionBuilder;
use crate::types::{AcquisitionFunction, check_batch_size};
use log::info;
use ndarray::{Array2, ArrayView3, Axis};
use std::sync::Arc;
use tagbo_models::{Dataset, ProbabilisticModel};

/// Builder of the predicted mean of the first model output.
///
/// With a classifier trained on `1.0`/`0.0` validity labels, the predicted mean is the
/// probability of a successful evaluation, to be combined with an objective acquisition
/// by a [`Product`](crate::Product).
#[derive(Clone, Copy, Debug, Default)]
pub struct PredictiveMean;

/// Predicted mean of the first output at the single point of each batch
#[derive(Debug)]
pub struct PredictiveMeanFunction {
    model: Arc<dyn ProbabilisticModel>,
}

impl AcquisitionFunction for PredictiveMeanFunction {
    fn call(&self, x: &ArrayView3<f64>) -> Result<Array2<f64>> {
        check_batch_size(x, 1)?;
        let points = x.index_axis(Axis(1), 0);
        let (mean, _) = self.model.predict(&points)?;
        Ok(mean.column(0).to_owned().insert_axis(Axis(1)))
    }
}

impl SingleModelAcquisitionBuilder for PredictiveMean {
    fn prepare_acquisition_function(
        &mut self,
        model: &Arc<dyn ProbabilisticModel>,
        _dataset: Option<&Dataset>,
    ) -> Result<Box<dyn AcquisitionFunction>> {
        info!("Build predictive mean");
        Ok(Box::new(PredictiveMeanFunction {
            model: model.clone(),
        }))
    }
}
