use std::path::PathBuf;

use clap::Args;
use glob::glob;
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use log::LevelFilter;

#[derive(Args, Debug, Clone)]
pub struct UtilsArgs {
    #[arg(
        long,
        global = true,
        default_value_t = 0,
        help_heading = "UTILS",
        help = "Number of threads to use. 0 uses all available cores."
    )]
    pub threads:  usize,
    #[arg(
        short = 'v',
        long,
        global = true,
        action = clap::ArgAction::Count,
        help_heading = "UTILS",
        help = "Increase logging verbosity (-v info, -vv debug, -vvv trace)."
    )]
    pub verbose:  u8,
    #[arg(
        long,
        global = true,
        default_value_t = false,
        help_heading = "UTILS",
        help = "Display progress bar."
    )]
    pub progress: bool,
}

impl UtilsArgs {
    /// Installs the logger and sizes the library thread pool. Must run
    /// before any library call touches the pool.
    pub fn setup(&self) -> anyhow::Result<()> {
        let level = match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };
        let mut builder = pretty_env_logger::formatted_builder();
        builder.filter_level(level);
        if let Ok(filters) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filters);
        }
        builder.try_init()?;

        if self.threads > 0 {
            // The library's load-time hook has already copied the variable.
            std::env::set_var("XTALK_NUM_THREADS", self.threads.to_string());
            std::env::set_var("POLARS_MAX_THREADS", self.threads.to_string());
        }
        log::debug!("Using {} threads", xtalk::utils::n_threads());
        Ok(())
    }

    pub fn progress_bar(
        &self,
        total: usize,
    ) -> anyhow::Result<ProgressBar> {
        if self.progress {
            init_pbar(total)
        }
        else {
            Ok(ProgressBar::hidden())
        }
    }
}

pub fn init_pbar(total: usize) -> anyhow::Result<ProgressBar> {
    let progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}, ETA: {eta}] \
                 [{bar:40.cyan/blue}] {pos:>5.green}/{len:5} {msg}",
            )?
            .progress_chars("#>-"),
    );
    progress_bar.set_message("Processing...");
    Ok(progress_bar)
}

pub fn expand_wildcards_single(path: &str) -> Vec<PathBuf> {
    if path.contains('*') || path.contains('?') {
        match glob(path) {
            Ok(matches) => matches.filter_map(Result::ok).collect(),
            Err(e) => {
                log::error!("Error processing wildcard '{}': {}", path, e);
                Vec::new()
            },
        }
    }
    else {
        vec![PathBuf::from(path)]
    }
}
