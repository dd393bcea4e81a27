use log::*;
use nalgebra::{
    DMatrix,
    DVector,
};
use ndarray::{
    Array1,
    Array2,
    ArrayView1,
};
use rayon::prelude::*;

use crate::data_structs::{
    Channel,
    IntensityFrame,
};
use crate::error::{
    CrosstalkError,
    Result,
};
use crate::utils::linspace;
use crate::with_field_fn;

const PINV_EPS: f64 = 1e-12;

/// Savitzky–Golay smoothing filter.
///
/// Interior points are replaced by the value at the window centre of a
/// least-squares polynomial of degree `polyorder` fitted to the surrounding
/// `window` points. The first and last `window / 2` points are evaluated
/// from the polynomial fitted to the first and last full window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SavitzkyGolay {
    pub window:    usize,
    pub polyorder: usize,
}

impl Default for SavitzkyGolay {
    fn default() -> Self {
        Self {
            window:    21,
            polyorder: 3,
        }
    }
}

impl SavitzkyGolay {
    with_field_fn!(window, usize);

    with_field_fn!(polyorder, usize);

    pub fn validate(&self) -> Result<()> {
        if self.window < 3 || self.window % 2 == 0 {
            return Err(CrosstalkError::Parameter(format!(
                "smoothing window must be odd and at least 3, got {}",
                self.window
            )));
        }
        if self.polyorder >= self.window {
            return Err(CrosstalkError::Parameter(format!(
                "polyorder ({}) must be less than the window ({})",
                self.polyorder, self.window
            )));
        }
        Ok(())
    }

    /// `(polyorder + 1, window)` matrix mapping a window of samples to the
    /// coefficients of its fitted polynomial in the centred offset.
    fn fit_matrix(&self) -> Result<DMatrix<f64>> {
        let half = (self.window / 2) as f64;
        let vander = DMatrix::from_fn(self.window, self.polyorder + 1, |i, k| {
            (i as f64 - half).powi(k as i32)
        });
        vander
            .pseudo_inverse(PINV_EPS)
            .map_err(|e| CrosstalkError::Parameter(e.to_string()))
    }

    pub fn apply(
        &self,
        signal: ArrayView1<f64>,
    ) -> Result<Array1<f64>> {
        self.validate()?;
        let n = signal.len();
        if n < self.window {
            return Err(CrosstalkError::Parameter(format!(
                "signal of length {} is shorter than the smoothing window {}",
                n, self.window
            )));
        }

        let fit = self.fit_matrix()?;
        let half = self.window / 2;
        let center = fit.row(0);

        let mut out = Array1::zeros(n);
        for i in half..n - half {
            out[i] = (0..self.window)
                .map(|k| center[k] * signal[i - half + k])
                .sum();
        }

        let eval = |coeffs: &DVector<f64>, offset: f64| {
            coeffs
                .iter()
                .rev()
                .fold(0.0, |acc, c| acc * offset + c)
        };
        let window_coeffs = |start: usize| {
            let window = DVector::from_iterator(
                self.window,
                signal.iter().skip(start).take(self.window).copied(),
            );
            &fit * window
        };

        let head = window_coeffs(0);
        for i in 0..half {
            out[i] = eval(&head, i as f64 - half as f64);
        }
        let tail = window_coeffs(n - self.window);
        for i in n - half..n {
            out[i] = eval(&tail, (i + self.window - n) as f64 - half as f64);
        }

        Ok(out)
    }
}

/// Iterative polynomial baseline estimate.
///
/// A polynomial of degree `degree` is fitted to the signal, the signal is
/// clipped to the fit, and the fit is repeated until the coefficients move
/// by less than `tol` relative to their norm or `max_iter` fits were made.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineRemoval {
    pub degree:   usize,
    pub max_iter: usize,
    pub tol:      f64,
}

impl Default for BaselineRemoval {
    fn default() -> Self {
        Self {
            degree:   6,
            max_iter: 100,
            tol:      1e-3,
        }
    }
}

impl BaselineRemoval {
    with_field_fn!(degree, usize);

    with_field_fn!(max_iter, usize);

    with_field_fn!(tol, f64);

    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 || !(self.tol > 0.0) {
            return Err(CrosstalkError::Parameter(format!(
                "baseline removal needs max_iter > 0 and tol > 0 (got {}, {})",
                self.max_iter, self.tol
            )));
        }
        Ok(())
    }

    /// Baseline of `signal`.
    pub fn baseline(
        &self,
        signal: ArrayView1<f64>,
    ) -> Result<Array1<f64>> {
        self.validate()?;
        let n = signal.len();
        if n == 0 {
            return Ok(Array1::zeros(0));
        }

        let order = self.degree + 1;
        // Abscissa scaled so the highest power is comparable to the signal.
        let max_abs = signal.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()));
        let x = linspace(0.0, max_abs.powf(1.0 / order as f64), n);

        let vander = DMatrix::from_fn(n, order, |i, k| {
            x[i].powi((order - 1 - k) as i32)
        });
        let pinv = vander
            .clone()
            .pseudo_inverse(PINV_EPS)
            .map_err(|e| CrosstalkError::Parameter(e.to_string()))?;

        let mut y = DVector::from_iterator(n, signal.iter().copied());
        let mut coeffs = DVector::from_element(order, 1.0);
        let mut base = y.clone();

        for iteration in 0..self.max_iter {
            let next = &pinv * &y;
            let change = (&next - &coeffs).norm() / coeffs.norm().max(f64::MIN_POSITIVE);
            if change < self.tol {
                trace!("Baseline converged after {} fits", iteration);
                break;
            }
            coeffs = next;
            base = &vander * &coeffs;
            y.zip_apply(&base, |v, b| *v = v.min(b));
        }

        Ok(Array1::from_iter(base.iter().copied()))
    }

    pub fn apply(
        &self,
        signal: ArrayView1<f64>,
    ) -> Result<Array1<f64>> {
        let baseline = self.baseline(signal)?;
        Ok(&signal - &baseline)
    }
}

/// Signal conditioning applied to every channel before correction:
/// smoothing first, then baseline removal. Either stage may be disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Preprocessor {
    pub smoothing: Option<SavitzkyGolay>,
    pub baseline:  Option<BaselineRemoval>,
}

impl Preprocessor {
    with_field_fn!(smoothing, Option<SavitzkyGolay>);

    with_field_fn!(baseline, Option<BaselineRemoval>);

    pub fn is_noop(&self) -> bool {
        self.smoothing.is_none() && self.baseline.is_none()
    }

    /// Conditions every channel independently. Values that drop below zero
    /// are floored.
    pub fn apply(
        &self,
        frame: &IntensityFrame,
    ) -> Result<IntensityFrame> {
        if self.is_noop() || frame.is_empty() {
            return Ok(frame.clone());
        }

        let columns = Channel::ALL
            .par_iter()
            .map(|channel| self.apply_channel(frame.channel(*channel)))
            .collect::<Result<Vec<_>>>()?;

        let mut data = Array2::zeros((frame.len(), 4));
        for (channel, column) in Channel::ALL.iter().zip(columns) {
            data.column_mut(channel.index()).assign(&column);
        }
        debug!(
            "Preprocessed {} positions (smoothing: {}, baseline: {})",
            frame.len(),
            self.smoothing.is_some(),
            self.baseline.is_some()
        );
        IntensityFrame::from_array_floored(data)
    }

    fn apply_channel(
        &self,
        signal: ArrayView1<f64>,
    ) -> Result<Array1<f64>> {
        let mut values = signal.to_owned();
        if let Some(smoothing) = &self.smoothing {
            values = smoothing.apply(values.view())?;
        }
        if let Some(baseline) = &self.baseline {
            values = baseline.apply(values.view())?;
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use rstest::rstest;

    use super::*;

    fn cubic(t: f64) -> f64 {
        50.0 + 2.0 * t + 0.1 * t * t - 0.001 * t * t * t
    }

    #[test]
    fn smoothing_preserves_low_order_polynomials() {
        let signal = Array1::from_iter((0..60).map(|t| cubic(t as f64)));
        let smoothed = SavitzkyGolay::default().apply(signal.view()).unwrap();

        for (got, want) in smoothed.iter().zip(signal.iter()) {
            assert_approx_eq!(got, want, 1e-6);
        }
    }

    #[test]
    fn smoothing_reduces_alternating_noise() {
        let signal = Array1::from_iter(
            (0..80).map(|t| 100.0 + if t % 2 == 0 { 5.0 } else { -5.0 }),
        );
        let smoothed = SavitzkyGolay::default().apply(signal.view()).unwrap();
        for v in smoothed.iter().skip(10).take(60) {
            assert!((v - 100.0).abs() < 1.0);
        }
    }

    #[rstest]
    #[case::even_window(SavitzkyGolay::default().with_window(20))]
    #[case::tiny_window(SavitzkyGolay::default().with_window(1))]
    #[case::high_order(SavitzkyGolay::default().with_window(5).with_polyorder(5))]
    fn invalid_smoothing_is_rejected(#[case] filter: SavitzkyGolay) {
        let signal = Array1::from_elem(40, 1.0);
        let err = filter.apply(signal.view()).unwrap_err();
        assert!(matches!(err, CrosstalkError::Parameter(_)));
    }

    #[test]
    fn short_signal_is_rejected() {
        let signal = Array1::from_elem(10, 1.0);
        let err = SavitzkyGolay::default().apply(signal.view()).unwrap_err();
        assert!(matches!(err, CrosstalkError::Parameter(_)));
    }

    #[test]
    fn polynomial_drift_is_flattened() {
        let signal = Array1::from_iter((0..500).map(|t| 100.0 + 0.5 * t as f64));
        let corrected = BaselineRemoval::default().apply(signal.view()).unwrap();
        for v in corrected.iter() {
            assert!(v.abs() < 1e-6, "residual {}", v);
        }
    }

    #[test]
    fn peaks_survive_baseline_removal() {
        let peaks = [120.0, 260.0, 400.0];
        let signal = Array1::from_iter((0..500).map(|t| {
            let t = t as f64;
            let drift = 100.0 + 0.5 * t;
            let peak: f64 = peaks
                .iter()
                .map(|c| 1000.0 * (-(t - c).powi(2) / 18.0).exp())
                .sum();
            drift + peak
        }));
        let corrected = BaselineRemoval::default().apply(signal.view()).unwrap();

        for center in peaks {
            assert!(corrected[center as usize] > 800.0);
        }
        let off_peak = (0..500)
            .filter(|t| peaks.iter().all(|c| (*t as f64 - c).abs() > 20.0))
            .map(|t| corrected[t].abs())
            .sum::<f64>()
            / 500.0;
        assert!(off_peak < 10.0, "mean off-peak residual {}", off_peak);
    }

    #[test]
    fn preprocessor_floors_negative_values() {
        let frame = IntensityFrame::try_from_columns(
            (0..100).map(|t| 10.0 + t as f64).collect(),
            (0..100).map(|t| if t == 50 { 500.0 } else { 0.0 }).collect(),
            vec![5.0; 100],
            (0..100).map(|t| (t % 7) as f64).collect(),
        )
        .unwrap();
        let processed = Preprocessor::default()
            .with_smoothing(Some(SavitzkyGolay::default()))
            .with_baseline(Some(BaselineRemoval::default()))
            .apply(&frame)
            .unwrap();

        assert_eq!(processed.len(), frame.len());
        assert!(processed.data().iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn noop_preprocessor_returns_input() {
        let frame = IntensityFrame::try_from_rows(&[[1.0, 2.0, 3.0, 4.0]]).unwrap();
        let processed = Preprocessor::default().apply(&frame).unwrap();
        assert_eq!(processed, frame);
    }
}
