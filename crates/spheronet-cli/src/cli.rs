use super::commands;
use crate::logging::setup_logging;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// No log output at all
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Also write the log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Run on the CPU even when a GPU is available
    #[arg(long, global = true)]
    cpu: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict ddG for every mutation of a CSV table and correlate with experiment
    PredictDdg(commands::predict_ddg::PredictDdgArgs),
    /// Train the residue classifier on a directory of feature files
    Train(commands::train::TrainArgs),
    /// Mean loss and top-1 accuracy of a checkpoint on one data split
    Infer(commands::infer::InferArgs),
    /// Re-score a saved result bundle and print its correlation
    Correlate(commands::correlate::CorrelateArgs),
}

impl Cli {
    pub fn execute(self) -> anyhow::Result<()> {
        setup_logging(self.verbose, self.quiet, self.log_file.as_deref())?;
        match self.command {
            Commands::PredictDdg(args) => commands::predict_ddg::execute(args, self.cpu),
            Commands::Train(args) => commands::train::execute(args, self.cpu),
            Commands::Infer(args) => commands::infer::execute(args, self.cpu),
            Commands::Correlate(args) => commands::correlate::execute(args),
        }
    }
}
