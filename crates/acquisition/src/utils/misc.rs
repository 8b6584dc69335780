use libm::erfc;
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix2, Zip};
use ndarray_stats::QuantileExt;
use tagbo_models::ProbabilisticModel;

use crate::errors::{AcquisitionError, Result};

/// Env variable to set the log level of the acquisition rules (default "info")
pub const TAGBO_LOG: &str = "TAGBO_LOG";

/// Initializes the stdout logger, level being taken from `TAGBO_LOG`.
/// Does nothing if a logger is already set.
pub fn init_logger() {
    let env = env_logger::Env::new().filter_or(TAGBO_LOG, "info");
    let mut builder = env_logger::Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();
}

/// Cumulative distribution function of Standard Normal at x
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Returns the indices of valid (all finite) and invalid rows in `ydata`
pub fn filter_nans(ydata: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> (Vec<usize>, Vec<usize>) {
    let mut valid_idxs = vec![];
    let mut invalid_idxs = vec![];
    for (i, yrow) in ydata.rows().into_iter().enumerate() {
        if yrow.iter().all(|v| v.is_finite()) {
            valid_idxs.push(i);
        } else {
            invalid_idxs.push(i);
        }
    }
    (valid_idxs, invalid_idxs)
}

const FD_STEP: f64 = 1e-6;

/// Norms of the gradient of the first output predicted mean at each row of `x`,
/// estimated by central finite differences
pub fn mean_gradient_norms(
    model: &dyn ProbabilisticModel,
    x: &ArrayView2<f64>,
) -> Result<Array1<f64>> {
    let (n, dim) = x.dim();
    let mut sq_norms = Array1::<f64>::zeros(n);
    for j in 0..dim {
        let mut x_plus = x.to_owned();
        let mut x_minus = x.to_owned();
        x_plus.column_mut(j).mapv_inplace(|v| v + FD_STEP);
        x_minus.column_mut(j).mapv_inplace(|v| v - FD_STEP);
        let (m_plus, _) = model.predict(&x_plus.view())?;
        let (m_minus, _) = model.predict(&x_minus.view())?;
        Zip::from(&mut sq_norms)
            .and(m_plus.column(0))
            .and(m_minus.column(0))
            .for_each(|s, &p, &m| {
                let d = (p - m) / (2. * FD_STEP);
                *s += d * d;
            });
    }
    Ok(sq_norms.mapv(f64::sqrt))
}

/// Lipschitz constant under which the objective is considered flat
const MIN_LIPSCHITZ: f64 = 1e-5;
/// Lipschitz constant used in place of a too small estimate
const FLAT_LIPSCHITZ: f64 = 10.;

/// Estimates the Lipschitz constant of the first output predicted mean as the largest
/// gradient norm over `samples`, and `eta` as the smallest predicted mean at `samples`
/// and `query_points` (the best observed value so far for a minimization).
pub fn lipschitz_and_eta(
    model: &dyn ProbabilisticModel,
    samples: &ArrayView2<f64>,
    query_points: &ArrayView2<f64>,
) -> Result<(f64, f64)> {
    if samples.nrows() == 0 {
        return Err(AcquisitionError::InvalidArgument(
            "no sample point to estimate Lipschitz constant".to_string(),
        ));
    }
    let norms = mean_gradient_norms(model, samples)?;
    let lipschitz = norms
        .max()
        .map(|&l| if l < MIN_LIPSCHITZ { FLAT_LIPSCHITZ } else { l })
        .unwrap_or(FLAT_LIPSCHITZ);

    let points = ndarray::concatenate(Axis(0), &[samples.view(), query_points.view()])?;
    let (mean, _) = model.predict(&points.view())?;
    let eta = *mean.column(0).min().map_err(|_| {
        AcquisitionError::InvalidArgument("cannot estimate eta from NaN predictions".to_string())
    })?;
    Ok((lipschitz, eta))
}

/// Pairwise euclidean distances between rows of `x` `[N, D]` and rows of `y` `[M, D]`
pub fn pairwise_distances(x: &ArrayView2<f64>, y: &ArrayView2<f64>) -> Array2<f64> {
    Array2::from_shape_fn((x.nrows(), y.nrows()), |(i, j)| {
        Zip::from(x.row(i))
            .and(y.row(j))
            .fold(0., |acc, &a, &b| acc + (a - b) * (a - b))
            .sqrt()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use tagbo_models::testing::LinearModel;

    #[test]
    fn test_norm() {
        assert_abs_diff_eq!(norm_cdf(0.), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(norm_cdf(1.96), 0.9750021048517795, epsilon = 1e-9);
    }

    #[test]
    fn test_filter_nans() {
        let y = array![[1., 2.], [f64::NAN, 0.], [3., f64::INFINITY], [0., 0.]];
        assert_eq!(filter_nans(&y), (vec![0, 3], vec![1, 2]));
    }

    #[test]
    fn test_lipschitz_and_eta() {
        let model = LinearModel::new(array![[3.], [4.]], array![1.], array![1.]);
        let samples = array![[0., 0.], [1., 1.]];
        let query_points = array![[-1., 0.]];
        let (l, eta) = lipschitz_and_eta(&model, &samples.view(), &query_points.view()).unwrap();
        assert_abs_diff_eq!(l, 5., epsilon = 1e-5);
        assert_abs_diff_eq!(eta, -2., epsilon = 1e-12);

        // flat model
        let model = LinearModel::new(array![[0.], [0.]], array![1.], array![1.]);
        let (l, eta) = lipschitz_and_eta(&model, &samples.view(), &query_points.view()).unwrap();
        assert_abs_diff_eq!(l, 10.);
        assert_abs_diff_eq!(eta, 1.);
    }

    #[test]
    fn test_pairwise_distances() {
        let x = array![[0., 0.], [3., 4.]];
        let y = array![[0., 0.]];
        assert_eq!(pairwise_distances(&x.view(), &y.view()), array![[0.], [5.]]);
    }
}
