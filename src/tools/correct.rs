use log::*;
use ndarray::{
    Array2,
    Axis,
    Zip,
};
use polars::prelude::*;

use crate::data_structs::{
    ChannelLayout,
    CrosstalkModel,
    IntensityFrame,
};
use crate::error::Result;
use crate::tools::estimate::{
    CrosstalkEstimator,
    Estimation,
    EstimationObserver,
    NoopObserver,
};

/// Where the mixing matrix used for correction comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// A calibration constant, applied to every frame.
    Fixed(CrosstalkModel),
    /// Fitted from each frame before it is unmixed.
    Estimated(CrosstalkEstimator),
}

impl Default for ModelSource {
    fn default() -> Self {
        ModelSource::Fixed(CrosstalkModel::identity())
    }
}

/// Result of a detailed correction.
#[derive(Debug, Clone)]
pub struct Correction {
    pub frame:      IntensityFrame,
    /// Model that was applied. `None` only for empty input under an
    /// estimating corrector, where nothing could be fitted.
    pub model:      Option<CrosstalkModel>,
    pub estimation: Option<Estimation>,
}

/// Removes crosstalk from four-channel intensity traces.
///
/// Every position is multiplied by the inverse mixing matrix and negative
/// results are floored at zero. Input frames are never modified.
///
/// ```
/// use xtalk::{CrosstalkCorrector, IntensityFrame};
///
/// let corrector = CrosstalkCorrector::try_from_rows([
///     [1.0, 0.0, 0.0, 0.0],
///     [2.0, 1.0, 0.0, 0.0],
///     [0.0, 0.0, 1.0, 0.0],
///     [0.0, 0.0, 0.0, 1.0],
/// ])?;
/// let frame = IntensityFrame::try_from_rows(&[[50.0, 50.0, 50.0, 50.0]])?;
/// let row = corrector.correct(&frame)?.row(0).unwrap();
/// // C would be 50 - 2 * 50; it is floored instead.
/// assert_eq!(row[1], 0.0);
/// assert!((row[0] - 50.0).abs() < 1e-9);
/// # Ok::<(), xtalk::CrosstalkError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrosstalkCorrector {
    source: ModelSource,
}

impl CrosstalkCorrector {
    pub fn new(model: CrosstalkModel) -> Self {
        Self {
            source: ModelSource::Fixed(model),
        }
    }

    /// Corrector that fits the mixing matrix from every frame it corrects.
    pub fn estimating(estimator: CrosstalkEstimator) -> Self {
        Self {
            source: ModelSource::Estimated(estimator),
        }
    }

    pub fn try_from_rows(rows: [[f64; 4]; 4]) -> Result<Self> {
        Ok(Self::new(CrosstalkModel::try_from_rows(rows)?))
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn correct(
        &self,
        frame: &IntensityFrame,
    ) -> Result<IntensityFrame> {
        Ok(self.correct_detailed(frame)?.frame)
    }

    pub fn correct_detailed(
        &self,
        frame: &IntensityFrame,
    ) -> Result<Correction> {
        self.correct_observed(frame, &NoopObserver)
    }

    /// Corrects a frame, reporting estimation progress to `observer`.
    pub fn correct_observed(
        &self,
        frame: &IntensityFrame,
        observer: &dyn EstimationObserver,
    ) -> Result<Correction> {
        let (model, estimation) = match &self.source {
            ModelSource::Fixed(model) => (Some(model.clone()), None),
            ModelSource::Estimated(_) if frame.is_empty() => (None, None),
            ModelSource::Estimated(estimator) => {
                let estimation = estimator.estimate_with(frame, observer)?;
                (Some(estimation.model.clone()), Some(estimation))
            },
        };

        let frame = match &model {
            Some(model) if !frame.is_empty() => apply_unmixing(model, frame)?,
            _ => {
                debug!("Nothing to correct: empty frame");
                IntensityFrame::empty()
            },
        };

        Ok(Correction {
            frame,
            model,
            estimation,
        })
    }

    /// Corrects a table with four channel columns. The returned table keeps
    /// the column labels and order of the input.
    pub fn correct_df(
        &self,
        df: &DataFrame,
    ) -> Result<DataFrame> {
        let layout = ChannelLayout::try_from_df(df)?;
        let frame = IntensityFrame::try_from_df(df)?;
        let corrected = self.correct(&frame)?;
        layout.to_df(&corrected)
    }
}

fn apply_unmixing(
    model: &CrosstalkModel,
    frame: &IntensityFrame,
) -> Result<IntensityFrame> {
    let mut out = Array2::zeros(frame.data().raw_dim());
    Zip::from(out.axis_iter_mut(Axis(0)))
        .and(frame.data().axis_iter(Axis(0)))
        .par_for_each(|mut dst, src| {
            let unmixed = model.unmix([src[0], src[1], src[2], src[3]]);
            for (d, u) in dst.iter_mut().zip(unmixed) {
                *d = u;
            }
        });
    // Overflow surfaces as a non-finite value and is rejected, not floored.
    IntensityFrame::from_array_floored(out)
}
