mod correct;
mod estimate;
mod io;
mod simulate;
pub mod utils;

use clap::{
    Parser,
    Subcommand,
};
use correct::CorrectArgs;
use estimate::EstimateArgs;
use simulate::SimulateArgs;
use utils::UtilsArgs;
use wild::ArgsOs;

#[derive(Parser, Debug)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None,)]
struct Cli {
    #[command(subcommand)]
    command: MainMenu,
}

#[derive(Subcommand, Debug)]
enum MainMenu {
    /// Remove crosstalk from one or more trace files.
    Correct {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  CorrectArgs,
    },

    /// Estimate the crosstalk matrix of a trace.
    Estimate {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  EstimateArgs,
    },

    /// Generate a synthetic trace with known crosstalk.
    Simulate {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  SimulateArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let args: ArgsOs = wild::args_os();
    let cli = Cli::parse_from(args);

    match cli.command {
        MainMenu::Correct { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
        MainMenu::Estimate { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
        MainMenu::Simulate { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
    }
    Ok(())
}
