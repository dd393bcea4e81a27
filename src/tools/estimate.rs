use itertools::Itertools;
use log::*;
use nalgebra::Matrix4;
use ndarray::{
    Array2,
    Axis,
    Zip,
};
use rayon::prelude::*;

use crate::data_structs::{
    Channel,
    CrosstalkModel,
    IntensityFrame,
};
use crate::error::{
    CrosstalkError,
    Result,
};
use crate::tools::regression::quantile_regression;
use crate::utils::{
    argmin,
    quantile,
    split_even,
};
use crate::with_field_fn;

/// Receives progress of a running estimation.
///
/// Passed in by the caller so the estimator itself keeps no global state.
pub trait EstimationObserver: Sync {
    /// `percent` is in `[0, 100]`.
    fn on_progress(
        &self,
        _percent: f64,
        _message: &str,
    ) {
    }

    fn on_iteration(
        &self,
        _record: &IterationRecord,
    ) {
    }
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EstimationObserver for NoopObserver {}

/// Forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl EstimationObserver for LogObserver {
    fn on_progress(
        &self,
        percent: f64,
        message: &str,
    ) {
        debug!("[{:>5.1}%] {}", percent, message);
    }

    fn on_iteration(
        &self,
        record: &IterationRecord,
    ) {
        info!(
            "Crosstalk iteration {}: {} pairs fitted, max |slope| = {:.5}",
            record.iteration,
            record.slopes.len(),
            record.max_abs_slope
        );
    }
}

/// Leakage slope fitted for one ordered channel pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairSlope {
    /// Channel whose high-signal region was used.
    pub source:    Channel,
    /// Channel whose leakage floor was regressed on the source.
    pub target:    Channel,
    pub slope:     f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration:     usize,
    pub slopes:        Vec<PairSlope>,
    pub max_abs_slope: f64,
}

/// Result of a crosstalk estimation.
#[derive(Debug, Clone)]
pub struct Estimation {
    /// Column-normalised mixing matrix.
    pub model:      CrosstalkModel,
    pub iterations: Vec<IterationRecord>,
    pub converged:  bool,
}

/// Iterative estimator of the mixing matrix.
///
/// For every ordered channel pair `(i, j)` the rows where channel `i` lies
/// between the `quantile_low` and `quantile_high` quantiles are split into
/// chunks of about `bin_rows` consecutive rows. The row with the smallest
/// channel `j` value of each chunk marks the leakage floor of `i` into `j`,
/// and the slope of a quantile regression of `j` on `i` over those floors is
/// the leakage coefficient. The data are unmixed with the fitted matrix and
/// the procedure repeats until every slope falls below `epsilon`.
#[derive(Debug, Clone, PartialEq)]
pub struct CrosstalkEstimator {
    pub quantile_low:        f64,
    pub quantile_high:       f64,
    pub bin_rows:            usize,
    pub epsilon:             f64,
    pub max_iter:            usize,
    pub regression_quantile: f64,
}

impl Default for CrosstalkEstimator {
    fn default() -> Self {
        Self {
            quantile_low:        0.6,
            quantile_high:       0.99,
            bin_rows:            8,
            epsilon:             0.05,
            max_iter:            11,
            regression_quantile: 0.5,
        }
    }
}

impl CrosstalkEstimator {
    with_field_fn!(quantile_low, f64);

    with_field_fn!(quantile_high, f64);

    with_field_fn!(bin_rows, usize);

    with_field_fn!(epsilon, f64);

    with_field_fn!(max_iter, usize);

    with_field_fn!(regression_quantile, f64);

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.quantile_low)
            || !(0.0..=1.0).contains(&self.quantile_high)
            || self.quantile_low >= self.quantile_high
        {
            return Err(CrosstalkError::Parameter(format!(
                "quantile window [{}, {}] must satisfy 0 <= low < high <= 1",
                self.quantile_low, self.quantile_high
            )));
        }
        if self.bin_rows == 0 {
            return Err(CrosstalkError::Parameter(
                "bin_rows must be positive".into(),
            ));
        }
        if !(self.epsilon > 0.0) {
            return Err(CrosstalkError::Parameter(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.max_iter < 2 {
            return Err(CrosstalkError::Parameter(format!(
                "max_iter must be at least 2, got {}",
                self.max_iter
            )));
        }
        if !(self.regression_quantile > 0.0 && self.regression_quantile < 1.0) {
            return Err(CrosstalkError::Parameter(format!(
                "regression quantile must lie in (0, 1), got {}",
                self.regression_quantile
            )));
        }
        Ok(())
    }

    pub fn estimate(
        &self,
        frame: &IntensityFrame,
    ) -> Result<Estimation> {
        self.estimate_with(frame, &NoopObserver)
    }

    pub fn estimate_with(
        &self,
        frame: &IntensityFrame,
        observer: &dyn EstimationObserver,
    ) -> Result<Estimation> {
        self.validate()?;
        if frame.is_empty() {
            return Err(CrosstalkError::Model(
                "cannot estimate crosstalk from an empty frame".into(),
            ));
        }

        observer.on_progress(0.0, "Starting crosstalk estimation");

        let mut data = frame.data().clone();
        let mut total = Matrix4::<f64>::identity();
        let mut iterations = Vec::new();
        let mut converged = false;
        let max_iterations = self.max_iter - 1;

        for iteration in 1..self.max_iter {
            let slopes = self.fit_pairs(&data)?;

            for (pair_idx, pair) in slopes.iter().enumerate() {
                let percent = ((iteration - 1) as f64
                    + pair_idx as f64 / 12.0)
                    / max_iterations as f64
                    * 100.0;
                observer.on_progress(
                    percent.min(95.0),
                    &format!(
                        "Iteration {}/{} | {} vs {}",
                        iteration, max_iterations, pair.source, pair.target
                    ),
                );
            }

            if slopes.is_empty() {
                return Err(CrosstalkError::Model(format!(
                    "not enough positions ({}) to estimate crosstalk",
                    frame.len()
                )));
            }

            let max_abs_slope = slopes
                .iter()
                .map(|p| p.slope.abs())
                .fold(0.0, f64::max);
            let record = IterationRecord {
                iteration,
                slopes: slopes.clone(),
                max_abs_slope,
            };
            observer.on_iteration(&record);
            iterations.push(record);

            // Largest magnitude, so strongly negative slopes keep iterating.
            if max_abs_slope < self.epsilon {
                observer.on_progress(
                    95.0,
                    &format!("Converged at iteration {}", iteration),
                );
                converged = true;
                break;
            }

            let mut step = Matrix4::<f64>::identity();
            for pair in slopes.iter() {
                step[(pair.target.index(), pair.source.index())] = pair.slope;
            }
            let step_model = CrosstalkModel::try_new(step)?;
            data = unmix_unclamped(&step_model, &data);
            total *= step;

            observer.on_progress(
                (iteration as f64 / max_iterations as f64 * 100.0).min(95.0),
                &format!("Finished iteration {}/{}", iteration, max_iterations),
            );
        }

        if !converged {
            warn!(
                "Crosstalk estimation did not converge within {} iterations",
                max_iterations
            );
        }

        let model = CrosstalkModel::try_new(total)?.column_normalized()?;
        observer.on_progress(100.0, "Crosstalk estimation finished");

        Ok(Estimation {
            model,
            iterations,
            converged,
        })
    }

    /// Fits the leakage slope of every ordered channel pair that has enough
    /// high-signal rows.
    fn fit_pairs(
        &self,
        data: &Array2<f64>,
    ) -> Result<Vec<PairSlope>> {
        let selections = Channel::ALL
            .iter()
            .map(|source| self.select_rows(data, *source))
            .collect_vec();

        let pairs = Channel::ALL
            .iter()
            .cartesian_product(Channel::ALL.iter())
            .filter(|(source, target)| source != target)
            .map(|(source, target)| (*source, *target))
            .collect_vec();

        let fitted = pairs
            .par_iter()
            .map(|(source, target)| {
                self.fit_pair(data, &selections[source.index()], *source, *target)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(fitted.into_iter().flatten().collect())
    }

    /// Rows where `source` lies inside the quantile window, in order.
    fn select_rows(
        &self,
        data: &Array2<f64>,
        source: Channel,
    ) -> Vec<usize> {
        let values = data.column(source.index()).to_vec();
        let (Some(low), Some(high)) = (
            quantile(&values, self.quantile_low),
            quantile(&values, self.quantile_high),
        )
        else {
            return Vec::new();
        };

        values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v >= low && **v <= high)
            .map(|(idx, _)| idx)
            .collect()
    }

    fn fit_pair(
        &self,
        data: &Array2<f64>,
        rows: &[usize],
        source: Channel,
        target: Channel,
    ) -> Result<Option<PairSlope>> {
        let n_bins = rows.len() / self.bin_rows;
        if n_bins == 0 {
            debug!(
                "Skipping {} vs {}: {} rows in the quantile window",
                source,
                target,
                rows.len()
            );
            return Ok(None);
        }

        let (xs, ys): (Vec<f64>, Vec<f64>) = split_even(rows.len(), n_bins)
            .into_iter()
            .filter_map(|range| {
                let chunk = &rows[range];
                let targets = chunk
                    .iter()
                    .map(|r| data[(*r, target.index())])
                    .collect_vec();
                argmin(&targets)
                    .map(|k| (data[(chunk[k], source.index())], targets[k]))
            })
            .unzip();

        if xs.is_empty() {
            return Ok(None);
        }

        let fit = quantile_regression(&xs, &ys, self.regression_quantile)?;
        Ok(Some(PairSlope {
            source,
            target,
            slope: fit.slope,
            intercept: fit.intercept,
        }))
    }
}

/// Unmixes every row without flooring; intermediate estimates may go
/// negative.
fn unmix_unclamped(
    model: &CrosstalkModel,
    data: &Array2<f64>,
) -> Array2<f64> {
    let mut out = Array2::zeros(data.raw_dim());
    Zip::from(out.axis_iter_mut(Axis(0)))
        .and(data.axis_iter(Axis(0)))
        .par_for_each(|mut dst, src| {
            let unmixed = model.unmix([src[0], src[1], src[2], src[3]]);
            for (d, u) in dst.iter_mut().zip(unmixed) {
                *d = u;
            }
        });
    out
}
