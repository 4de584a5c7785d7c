//! CLI plumbing for the `dtz` binary.

pub mod args;
pub use args::{CliArgs, Command};

pub mod driver;
pub use driver::{CompileOutcome, compile_text, run_cli};
