//! # xtalk
//!
//! `xtalk` removes dye crosstalk from four-channel (A, C, G, T) intensity
//! traces produced by fluorescence sequencing instruments. The emission
//! spectra of the four dyes overlap, so every observed channel is a linear
//! mixture of the true base signal and leakage from the other three
//! channels. Given a mixing matrix (fixed calibration or estimated from the
//! trace itself), the crate recovers the unmixed per-base intensities.
//!
//! If you do not want to use xtalk as crate, check out the `xtalk` CLI in
//! the `console` workspace member.
//!
//! ## Key Features
//!
//! * **Validated data model**: [`IntensityFrame`] guarantees four finite,
//!   non-negative channels per position and converts from/to Polars
//!   DataFrames with case-insensitive channel labels.
//! * **Crosstalk correction**: [`CrosstalkCorrector`] applies the inverse of a
//!   [`CrosstalkModel`] to every position in parallel and floors
//!   over-corrected values at zero.
//! * **Model estimation**: [`CrosstalkEstimator`] fits the mixing matrix from
//!   the data with iterated quantile regressions on high-signal regions.
//! * **Signal conditioning**: Savitzky–Golay smoothing and polynomial
//!   baseline removal ([`Preprocessor`]).
//! * **Batch processing**: [`BatchProcessor`] corrects many sequences on a
//!   Rayon pool and reports a tagged outcome per sequence.
//!
//! Number of threads to be used can be configured with setting
//! `XTALK_NUM_THREADS` environment variable.
//!
//! ## Structure
//!
//! * [`data_structs`]: channels, intensity frames and the crosstalk model.
//! * [`tools`]: correction, estimation, preprocessing, simulation and batch
//!   processing.
//! * [`utils`]: thread pool, statistics helpers and builder macros.
//! * [`error`]: the typed [`CrosstalkError`].
//!
//! ## Usage
//!
//! ```
//! use xtalk::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let frame = IntensityFrame::try_from_rows(&[
//!         [100.0, 80.0, 90.0, 70.0],
//!         [200.0, 180.0, 190.0, 170.0],
//!     ])?;
//!
//!     let corrector = CrosstalkCorrector::new(CrosstalkModel::identity());
//!     let clean = corrector.correct(&frame)?;
//!     assert_eq!(clean, frame);
//!     Ok(())
//! }
//! ```

#[ctor::ctor]
fn init() {
    if let Ok(n) = std::env::var("XTALK_NUM_THREADS") {
        std::env::set_var("POLARS_MAX_THREADS", n)
    }
}

pub mod data_structs;
pub mod error;
pub mod prelude;
pub mod tools;
pub mod utils;

pub use crate::data_structs::{
    Channel,
    CrosstalkModel,
    IntensityFrame,
};
pub use crate::error::{
    CrosstalkError,
    ErrorKind,
};
pub use crate::tools::batch::{
    BatchProcessor,
    BatchSummary,
    Sequence,
    SequenceOutcome,
    SequenceReport,
};
pub use crate::tools::correct::{
    Correction,
    CrosstalkCorrector,
    ModelSource,
};
pub use crate::tools::estimate::{
    CrosstalkEstimator,
    Estimation,
    EstimationObserver,
    IterationRecord,
    LogObserver,
    NoopObserver,
    PairSlope,
};
pub use crate::tools::preprocess::{
    BaselineRemoval,
    Preprocessor,
    SavitzkyGolay,
};
pub use crate::tools::synth::SyntheticTrace;
