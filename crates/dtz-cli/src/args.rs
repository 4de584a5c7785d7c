//! CLI arguments for the `dtz` binary.

use clap::{Parser, Subcommand};
use dtz_common::limits::DEFAULT_FUEL;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dtz", version, about = "Compiler for the dtz language")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a file and print (or write) the residual JavaScript.
    Compile {
        file: PathBuf,
        /// Write the residual to a file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Compile-time evaluation fuel budget.
        #[arg(long, default_value_t = DEFAULT_FUEL)]
        fuel: u64,
        /// Emit diagnostics as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Compile a file and run the residual with `node`.
    Run {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_FUEL)]
        fuel: u64,
    },
    /// Type-check only; exit non-zero on diagnostics.
    Check {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_FUEL)]
        fuel: u64,
        /// Emit diagnostics as JSON.
        #[arg(long)]
        json: bool,
    },
}
