use std::fmt::Display;
use std::sync::Arc;

use hashbrown::HashMap;
use itertools::Itertools;
use log::*;
use polars::prelude::DataFrame;
use rayon::prelude::*;

use crate::data_structs::{
    CrosstalkModel,
    IntensityFrame,
};
use crate::error::{
    CrosstalkError,
    ErrorKind,
    Result,
};
use crate::tools::correct::CrosstalkCorrector;
use crate::tools::estimate::{
    EstimationObserver,
    LogObserver,
};
use crate::tools::preprocess::Preprocessor;
use crate::utils::THREAD_POOL;
use crate::{
    getter_fn,
    with_field_fn,
};

/// One named trace to be corrected.
#[derive(Debug, Clone)]
pub struct Sequence {
    name:      String,
    frame:     IntensityFrame,
    /// Instrument calibration the applied model is compared against.
    reference: Option<CrosstalkModel>,
    /// Dye labels in canonical channel order, when known.
    dye_names: Option<[String; 4]>,
}

impl Sequence {
    getter_fn!(name, String);

    getter_fn!(frame, IntensityFrame);

    getter_fn!(reference, Option<CrosstalkModel>);

    getter_fn!(dye_names, Option<[String; 4]>);

    with_field_fn!(reference, Option<CrosstalkModel>);

    with_field_fn!(dye_names, Option<[String; 4]>);

    pub fn new(
        name: impl Into<String>,
        frame: IntensityFrame,
    ) -> Self {
        Self {
            name: name.into(),
            frame,
            reference: None,
            dye_names: None,
        }
    }

    pub fn try_from_df(
        name: impl Into<String>,
        df: &DataFrame,
    ) -> Result<Self> {
        Ok(Self::new(name, IntensityFrame::try_from_df(df)?))
    }
}

/// Per-sequence result of a batch run.
#[derive(Debug, Clone)]
pub enum SequenceOutcome {
    Corrected {
        frame:             IntensityFrame,
        model:             CrosstalkModel,
        /// Mean absolute difference to the sequence's reference calibration.
        matrix_difference: Option<f64>,
    },
    /// The sequence has no positions.
    Empty,
    Failed {
        kind:    ErrorKind,
        message: String,
    },
}

impl SequenceOutcome {
    fn from_error(error: CrosstalkError) -> Self {
        SequenceOutcome::Failed {
            kind:    error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_corrected(&self) -> bool {
        matches!(self, SequenceOutcome::Corrected { .. })
    }

    /// Category of a sequence that was not corrected.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SequenceOutcome::Corrected { .. } => None,
            SequenceOutcome::Empty => Some(ErrorKind::EmptyInput),
            SequenceOutcome::Failed { kind, .. } => Some(*kind),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SequenceReport {
    pub name:    String,
    pub outcome: SequenceOutcome,
}

/// Corrects many sequences in parallel. Each sequence is processed on its
/// own; a failing sequence never affects the others.
#[derive(Clone)]
pub struct BatchProcessor {
    corrector:    CrosstalkCorrector,
    preprocessor: Preprocessor,
    observer:     Arc<dyn EstimationObserver + Send + Sync>,
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new(CrosstalkCorrector::default())
    }
}

impl BatchProcessor {
    getter_fn!(corrector, CrosstalkCorrector);

    getter_fn!(preprocessor, Preprocessor);

    with_field_fn!(preprocessor, Preprocessor);

    with_field_fn!(observer, Arc<dyn EstimationObserver + Send + Sync>);

    pub fn new(corrector: CrosstalkCorrector) -> Self {
        Self {
            corrector,
            preprocessor: Preprocessor::default(),
            observer: Arc::new(LogObserver),
        }
    }

    /// Processes every sequence on the crate thread pool. Reports come back
    /// in input order.
    pub fn process(
        &self,
        sequences: &[Sequence],
    ) -> Vec<SequenceReport> {
        info!("Processing {} sequences", sequences.len());
        let reports: Vec<SequenceReport> = THREAD_POOL.install(|| {
            sequences
                .par_iter()
                .map(|sequence| {
                    SequenceReport {
                        name:    sequence.name.clone(),
                        outcome: self.process_one(sequence),
                    }
                })
                .collect()
        });
        info!("{}", BatchSummary::from_reports(&reports));
        reports
    }

    pub fn process_one(
        &self,
        sequence: &Sequence,
    ) -> SequenceOutcome {
        if sequence.frame.is_empty() {
            warn!("Sequence {} has no positions", sequence.name);
            return SequenceOutcome::Empty;
        }

        match self.correct_sequence(sequence) {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_configuration() {
                    error!("Sequence {} failed: {}", sequence.name, e);
                }
                else {
                    warn!("Sequence {} failed: {}", sequence.name, e);
                }
                SequenceOutcome::from_error(e)
            },
        }
    }

    fn correct_sequence(
        &self,
        sequence: &Sequence,
    ) -> Result<SequenceOutcome> {
        let prepared = self.preprocessor.apply(&sequence.frame)?;
        let correction = self
            .corrector
            .correct_observed(&prepared, self.observer.as_ref())?;
        let model = correction.model.ok_or_else(|| {
            CrosstalkError::Model(format!(
                "no model was applied to sequence {}",
                sequence.name
            ))
        })?;

        let matrix_difference = sequence
            .reference
            .as_ref()
            .map(|reference| model.difference(reference));
        if let Some(diff) = matrix_difference {
            debug!(
                "Sequence {}: mean difference to reference calibration {:.4}",
                sequence.name, diff
            );
        }
        if let Some(dyes) = &sequence.dye_names {
            debug!("Sequence {} dyes: {}", sequence.name, dyes.join(", "));
        }

        Ok(SequenceOutcome::Corrected {
            frame: correction.frame,
            model,
            matrix_difference,
        })
    }
}

/// Aggregate counts over a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total:     usize,
    pub corrected: usize,
    pub empty:     usize,
    pub failed:    HashMap<ErrorKind, usize>,
}

impl BatchSummary {
    pub fn from_reports(reports: &[SequenceReport]) -> Self {
        let mut summary = BatchSummary {
            total: reports.len(),
            ..Default::default()
        };
        for report in reports {
            match &report.outcome {
                SequenceOutcome::Corrected { .. } => summary.corrected += 1,
                SequenceOutcome::Empty => summary.empty += 1,
                SequenceOutcome::Failed { kind, .. } => {
                    *summary.failed.entry(*kind).or_insert(0) += 1
                },
            }
        }
        summary
    }

    pub fn n_failed(&self) -> usize {
        self.failed.values().sum()
    }
}

impl Display for BatchSummary {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{} of {} sequences failed", self.n_failed(), self.total)?;
        if !self.failed.is_empty() {
            let counts = self
                .failed
                .iter()
                .sorted_by(|(ka, na), (kb, nb)| nb.cmp(na).then(ka.cmp(kb)))
                .map(|(kind, n)| format!("{} {}", n, kind))
                .join(", ");
            write!(f, " ({})", counts)?;
        }
        if self.empty > 0 {
            write!(f, ", {} empty", self.empty)?;
        }
        Ok(())
    }
}
