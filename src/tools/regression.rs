use argmin::core::{
    CostFunction,
    Error,
    Executor,
    State,
};
use argmin::solver::neldermead::NelderMead;
use log::*;
use statrs::statistics::Statistics;

use crate::error::{
    CrosstalkError,
    Result,
};

const MAX_ITERS: u64 = 1000;
const SD_TOLERANCE: f64 = 1e-10;

/// Straight line `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope:     f64,
}

impl LineFit {
    pub fn predict(
        &self,
        x: f64,
    ) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Check (pinball) loss of a line on centred abscissae.
///
/// Params are `[intercept at the mean of x, slope]`.
struct CheckLoss {
    x: Vec<f64>,
    y: Vec<f64>,
    q: f64,
}

impl CostFunction for CheckLoss {
    type Output = f64;
    type Param = Vec<f64>;

    fn cost(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Output, Error> {
        let (a, b) = (params[0], params[1]);
        Ok(self
            .x
            .iter()
            .zip(self.y.iter())
            .map(|(x, y)| {
                let r = y - a - b * x;
                if r < 0.0 {
                    (self.q - 1.0) * r
                }
                else {
                    self.q * r
                }
            })
            .sum())
    }
}

/// Fits a line by quantile regression at quantile `q` (`q = 0.5` is least
/// absolute deviations).
///
/// The check loss is minimised with Nelder–Mead, starting from the ordinary
/// least squares line.
pub fn quantile_regression(
    x: &[f64],
    y: &[f64],
    q: f64,
) -> Result<LineFit> {
    if x.len() != y.len() {
        return Err(CrosstalkError::Parameter(format!(
            "regression input lengths differ: x={}, y={}",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(CrosstalkError::Parameter(
            "regression needs at least one point".into(),
        ));
    }
    if !(q > 0.0 && q < 1.0) {
        return Err(CrosstalkError::Parameter(format!(
            "regression quantile must lie in (0, 1), got {}",
            q
        )));
    }

    let x_mean = x.iter().mean();
    let y_mean = y.iter().mean();
    let xc = x.iter().map(|v| v - x_mean).collect::<Vec<_>>();

    let sxx: f64 = xc.iter().map(|v| v * v).sum();
    let sxy: f64 = xc.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
    let slope0 = if sxx > 0.0 { sxy / sxx } else { 0.0 };

    let y_scale = y
        .iter()
        .map(|v| (v - y_mean).abs())
        .fold(0.0, f64::max);
    let x_scale = xc.iter().map(|v| v.abs()).fold(0.0, f64::max);
    let step_a = (0.1 * y_scale).max(1e-6);
    let step_b = if x_scale > 0.0 {
        (0.1 * y_scale / x_scale).max(1e-6)
    }
    else {
        1e-6
    };

    let simplex = vec![
        vec![y_mean, slope0],
        vec![y_mean + step_a, slope0],
        vec![y_mean, slope0 + step_b],
    ];

    let problem = CheckLoss {
        x: xc,
        y: y.to_vec(),
        q,
    };
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(SD_TOLERANCE)
        .map_err(|e| CrosstalkError::Parameter(e.to_string()))?;

    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(MAX_ITERS))
        .run()
        .map_err(|e| {
            CrosstalkError::Model(format!("quantile regression failed: {}", e))
        })?;

    let best = res.state().get_best_param().cloned().ok_or_else(|| {
        CrosstalkError::Model("quantile regression produced no estimate".into())
    })?;

    let fit = LineFit {
        intercept: best[0] - best[1] * x_mean,
        slope:     best[1],
    };
    trace!(
        "Quantile regression (q={}, n={}): intercept={:.4}, slope={:.6}",
        q,
        x.len(),
        fit.intercept,
        fit.slope
    );
    Ok(fit)
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn exact_line_is_recovered() {
        let x = (0..50).map(|v| v as f64 * 10.0).collect::<Vec<_>>();
        let y = x.iter().map(|v| 5.0 + 0.25 * v).collect::<Vec<_>>();

        let fit = quantile_regression(&x, &y, 0.5).unwrap();
        assert_approx_eq!(fit.slope, 0.25, 1e-3);
        assert_approx_eq!(fit.intercept, 5.0, 0.5);
        assert_approx_eq!(fit.predict(100.0), 30.0, 0.5);
    }

    #[test]
    fn median_fit_ignores_outliers() {
        let x = (0..41).map(|v| v as f64).collect::<Vec<_>>();
        let mut y = x.iter().map(|v| 2.0 * v).collect::<Vec<_>>();
        y[5] = 500.0;
        y[20] = -300.0;
        y[33] = 1000.0;

        let fit = quantile_regression(&x, &y, 0.5).unwrap();
        assert_approx_eq!(fit.slope, 2.0, 1e-2);
        assert_approx_eq!(fit.intercept, 0.0, 0.5);
    }

    #[test]
    fn constant_abscissa_gives_flat_line() {
        let x = vec![3.0; 9];
        let y = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let fit = quantile_regression(&x, &y, 0.5).unwrap();
        assert_approx_eq!(fit.predict(3.0), 5.0, 1e-2);
    }

    #[rstest]
    #[case::mismatched(vec![1.0, 2.0], vec![1.0], 0.5)]
    #[case::empty(vec![], vec![], 0.5)]
    #[case::quantile_zero(vec![1.0], vec![1.0], 0.0)]
    #[case::quantile_one(vec![1.0], vec![1.0], 1.0)]
    fn invalid_input_is_rejected(
        #[case] x: Vec<f64>,
        #[case] y: Vec<f64>,
        #[case] q: f64,
    ) {
        let err = quantile_regression(&x, &y, q).unwrap_err();
        assert!(matches!(err, CrosstalkError::Parameter(_)));
    }
}
