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
    LogObserver,
    NoopObserver,
};
pub use crate::tools::preprocess::{
    BaselineRemoval,
    Preprocessor,
    SavitzkyGolay,
};
pub use crate::tools::synth::SyntheticTrace;
