//! This module provides the crosstalk correction pipeline and the tools
//! around it.
//!
//! Key submodules:
//!
//! - [`correct`]: the [`CrosstalkCorrector`](correct::CrosstalkCorrector),
//!   which validates a frame, unmixes every position and floors negative
//!   results.
//! - [`estimate`]: iterative data-driven estimation of the mixing matrix.
//! - [`regression`]: quantile (L1) line fits used by the estimator.
//! - [`preprocess`]: Savitzky–Golay smoothing and polynomial baseline
//!   removal.
//! - [`synth`]: seeded synthetic traces with known crosstalk.
//! - [`batch`]: parallel processing of many sequences with per-sequence
//!   outcomes.
pub mod batch;
pub mod correct;
pub mod estimate;
pub mod preprocess;
pub mod regression;
pub mod synth;
