use std::path::PathBuf;

use clap::Args;
use console::style;
use indicatif::ProgressBar;
use xtalk::prelude::*;
use xtalk::IterationRecord;

use crate::io::{
    format_model,
    read_trace,
    write_model,
};
use crate::utils::UtilsArgs;

#[derive(Args, Debug, Clone)]
pub(crate) struct EstimateArgs {
    #[arg(help = "Path to a ';'-separated trace file.")]
    file: PathBuf,

    #[arg(short = 'o', long, help = "Save the estimated model as JSON.")]
    output: Option<PathBuf>,

    #[arg(
        long,
        default_value = "AGCT",
        help = "Channel order of the first four columns."
    )]
    columns: String,

    #[arg(long, default_value_t = 0.6, help_heading = "ESTIMATION")]
    quantile_low: f64,
    #[arg(long, default_value_t = 0.99, help_heading = "ESTIMATION")]
    quantile_high: f64,
    #[arg(
        long,
        default_value_t = 8,
        help_heading = "ESTIMATION",
        help = "Rows per chunk when searching for leakage floors."
    )]
    bin_rows: usize,
    #[arg(
        long,
        default_value_t = 0.05,
        help_heading = "ESTIMATION",
        help = "Stop once every fitted slope is below this value."
    )]
    epsilon: f64,
    #[arg(long, default_value_t = 11, help_heading = "ESTIMATION")]
    max_iter: usize,
}

/// Mirrors estimation progress on a progress bar.
struct BarObserver(ProgressBar);

impl EstimationObserver for BarObserver {
    fn on_progress(
        &self,
        percent: f64,
        message: &str,
    ) {
        self.0.set_position(percent.round() as u64);
        self.0.set_message(message.to_string());
    }

    fn on_iteration(
        &self,
        record: &IterationRecord,
    ) {
        LogObserver.on_iteration(record);
    }
}

impl EstimateArgs {
    pub fn run(
        &self,
        utils: &UtilsArgs,
    ) -> anyhow::Result<()> {
        let order = Channel::parse_order(&self.columns)?;
        let frame = IntensityFrame::try_from_df(&read_trace(&self.file, &order)?)?;

        let estimator = CrosstalkEstimator::default()
            .with_quantile_low(self.quantile_low)
            .with_quantile_high(self.quantile_high)
            .with_bin_rows(self.bin_rows)
            .with_epsilon(self.epsilon)
            .with_max_iter(self.max_iter);

        let observer = BarObserver(utils.progress_bar(100)?);
        let estimation = estimator.estimate_with(&frame, &observer)?;
        observer.0.finish_and_clear();

        for record in estimation.iterations.iter() {
            println!(
                "iteration {:>2}: max |slope| = {:.5}",
                record.iteration, record.max_abs_slope
            );
        }
        if estimation.converged {
            println!("{}", style("Converged").green());
        }
        else {
            println!("{}", style("Did not converge").yellow());
        }
        println!("{}", format_model(&estimation.model));

        if let Some(path) = &self.output {
            write_model(path, &estimation.model)?;
            println!("Saved model to {}", path.display());
        }
        Ok(())
    }
}
