use std::path::PathBuf;

use clap::Args;
use log::*;
use xtalk::data_structs::ChannelLayout;
use xtalk::prelude::*;

use crate::io::{
    write_model,
    write_trace,
};
use crate::utils::UtilsArgs;

#[derive(Args, Debug, Clone)]
pub(crate) struct SimulateArgs {
    #[arg(short = 'o', long, required = true, help = "Path of the generated trace.")]
    output: PathBuf,

    #[arg(long, help = "Save the true mixing matrix as JSON.")]
    matrix_out: Option<PathBuf>,

    #[arg(short = 'n', long, default_value_t = 1000, help = "Number of bases.")]
    length: usize,

    #[arg(long, help = "Random seed.")]
    seed: Option<u64>,

    #[arg(
        long,
        default_value_t = 0.007,
        help = "Noise standard deviation relative to the peak height."
    )]
    noise: f64,

    #[arg(
        long,
        default_value = "AGCT",
        help = "Channel order of the written columns."
    )]
    columns: String,
}

impl SimulateArgs {
    pub fn run(
        &self,
        _utils: &UtilsArgs,
    ) -> anyhow::Result<()> {
        let order = Channel::parse_order(&self.columns)?;
        let sample = SyntheticTrace::default()
            .with_n(self.length)
            .with_noise_level(self.noise)
            .with_seed(self.seed)
            .generate()?;

        write_trace(&self.output, &sample.frame, &ChannelLayout::from_order(order))?;
        info!(
            "Wrote {} positions to {}",
            sample.frame.len(),
            self.output.display()
        );

        if let Some(path) = &self.matrix_out {
            write_model(path, &sample.model)?;
            info!("Wrote true mixing matrix to {}", path.display());
        }
        Ok(())
    }
}
