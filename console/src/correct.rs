use std::path::{
    Path,
    PathBuf,
};

use anyhow::anyhow;
use clap::Args;
use console::style;
use log::*;
use rayon::prelude::*;
use xtalk::data_structs::ChannelLayout;
use xtalk::prelude::*;
use xtalk::utils::THREAD_POOL;

use crate::io::{
    read_model,
    read_trace,
    write_trace,
};
use crate::utils::{
    expand_wildcards_single,
    UtilsArgs,
};

#[derive(Args, Debug, Clone)]
pub(crate) struct CorrectArgs {
    #[arg(
        value_parser,
        num_args = 1..,
        required = true,
        help = "Paths to ';'-separated trace files (wildcards allowed)."
    )]
    files: Vec<String>,

    #[arg(
        short = 'o',
        long,
        required = true,
        help = "Directory for the corrected '<name>_clean.csv' files."
    )]
    output: PathBuf,

    #[arg(
        short = 'm',
        long,
        help = "JSON calibration with the mixing matrix. Estimated per file when omitted."
    )]
    matrix: Option<PathBuf>,

    #[arg(
        long,
        default_value = "AGCT",
        help = "Channel order of the first four columns."
    )]
    columns: String,

    #[arg(
        long,
        default_value_t = false,
        help_heading = "PREPROCESSING",
        help = "Apply Savitzky-Golay smoothing before correction."
    )]
    smooth: bool,
    #[arg(
        long,
        default_value_t = 21,
        help_heading = "PREPROCESSING",
        help = "Smoothing window length (odd)."
    )]
    window: usize,
    #[arg(
        long,
        default_value_t = 3,
        help_heading = "PREPROCESSING",
        help = "Smoothing polynomial order."
    )]
    polyorder: usize,
    #[arg(
        long,
        default_value_t = false,
        help_heading = "PREPROCESSING",
        help = "Subtract a polynomial baseline before correction."
    )]
    baseline: bool,
    #[arg(
        long,
        default_value_t = 6,
        help_heading = "PREPROCESSING",
        help = "Degree of the baseline polynomial."
    )]
    degree: usize,
}

impl CorrectArgs {
    fn corrector(&self) -> anyhow::Result<CrosstalkCorrector> {
        match &self.matrix {
            Some(path) => {
                let model = read_model(path)?;
                info!("Loaded calibration from {}", path.display());
                Ok(CrosstalkCorrector::new(model))
            },
            None => Ok(CrosstalkCorrector::estimating(CrosstalkEstimator::default())),
        }
    }

    fn preprocessor(&self) -> Preprocessor {
        Preprocessor::default()
            .with_smoothing(self.smooth.then(|| {
                SavitzkyGolay::default()
                    .with_window(self.window)
                    .with_polyorder(self.polyorder)
            }))
            .with_baseline(
                self.baseline
                    .then(|| BaselineRemoval::default().with_degree(self.degree)),
            )
    }

    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> anyhow::Result<()> {
        let order = Channel::parse_order(&self.columns)?;
        let paths = self
            .files
            .iter()
            .flat_map(|path| expand_wildcards_single(path))
            .collect::<Vec<_>>();

        if paths.is_empty() {
            return Err(anyhow!("No input files matched"));
        }
        for path in paths.iter() {
            if !path.is_file() {
                return Err(anyhow!(
                    "Path {} is not a file.",
                    style(path.display()).red()
                ));
            }
        }
        if self.output.exists() && !self.output.is_dir() {
            return Err(anyhow!(
                "Output path {} is not a directory.",
                style(self.output.display()).red()
            ));
        }
        std::fs::create_dir_all(&self.output)?;

        let processor =
            BatchProcessor::new(self.corrector()?).with_preprocessor(self.preprocessor());
        let layout = ChannelLayout::from_order(order);
        let progress_bar = utils.progress_bar(paths.len())?;

        let reports = THREAD_POOL.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let report = self.process_file(&processor, path, &order);
                    progress_bar.inc(1);
                    report
                })
                .collect::<Vec<_>>()
        });
        progress_bar.finish_and_clear();

        for (path, report) in paths.iter().zip(reports.iter()) {
            match &report.outcome {
                SequenceOutcome::Corrected {
                    frame, model, ..
                } => {
                    let out = self.output.join(clean_name(path));
                    write_trace(&out, frame, &layout)?;
                    debug!("{} corrected with\n{}", report.name, crate::io::format_model(model));
                    info!("Wrote {}", out.display());
                },
                SequenceOutcome::Empty => {
                    eprintln!("{}: {}", report.name, style("no positions").yellow())
                },
                SequenceOutcome::Failed { message, .. } => {
                    eprintln!("{}: {}", report.name, style(message).red())
                },
            }
        }

        println!("{}", BatchSummary::from_reports(&reports));
        Ok(())
    }

    fn process_file(
        &self,
        processor: &BatchProcessor,
        path: &Path,
        order: &[Channel; 4],
    ) -> SequenceReport {
        let name = path.display().to_string();
        let loaded = read_trace(path, order)
            .and_then(|df| Ok(Sequence::try_from_df(name.clone(), &df)?));

        let outcome = match loaded {
            Ok(sequence) => processor.process_one(&sequence),
            Err(e) => {
                // Unreadable files are reported like malformed tables.
                SequenceOutcome::Failed {
                    kind:    e
                        .downcast_ref::<CrosstalkError>()
                        .map(|e| e.kind())
                        .unwrap_or(ErrorKind::Schema),
                    message: format!("{:#}", e),
                }
            },
        };
        SequenceReport { name, outcome }
    }
}

fn clean_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "trace".to_string());
    format!("{}_clean.csv", stem)
}
