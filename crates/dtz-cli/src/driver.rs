//! Compilation driver: source text in, residual JS (or diagnostics) out.
//!
//! Exit codes: 0 success, 1 user error (compile or I/O), 2 CLI misuse
//! (handled by clap before we get here).

use anyhow::{Context, Result};
use crate::args::{CliArgs, Command};
use dtz_checker::{check_source, erase};
use dtz_common::diagnostics::Diagnostic;
use dtz_emitter::{cluster_statements, print_program};
use dtz_eval::EvalOptions;
use std::path::Path;
use std::process::Command as Process;
use tracing::debug;

/// The result of compiling one source text.
pub enum CompileOutcome {
    Success { js: String },
    Failure { diagnostic: Diagnostic },
}

/// Compile source text end to end: parse, check, erase, cluster, print.
pub fn compile_text(source: &str, fuel: u64) -> CompileOutcome {
    match check_source(source, EvalOptions { fuel }) {
        Ok(checked) => {
            let stmts = erase(&checked);
            let mut next_cluster = 0;
            let stmts = cluster_statements(stmts, &mut next_cluster);
            debug!(statements = stmts.len(), "residual ready");
            CompileOutcome::Success {
                js: print_program(&stmts),
            }
        }
        Err(diagnostic) => CompileOutcome::Failure { diagnostic },
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read `{}`", path.display()))
}

fn write_output(path: &Path, js: &str) -> Result<()> {
    std::fs::write(path, js).with_context(|| format!("cannot write `{}`", path.display()))
}

fn report(diagnostic: &Diagnostic, source: &str, json: bool) {
    if json {
        match serde_json::to_string_pretty(diagnostic) {
            Ok(out) => eprintln!("{out}"),
            Err(_) => eprintln!("{}", diagnostic.render(source)),
        }
    } else {
        eprintln!("{}", diagnostic.render(source));
    }
}

/// Run the parsed CLI. Returns the process exit code.
pub fn run_cli(args: CliArgs) -> i32 {
    match args.command {
        Command::Compile {
            file,
            out,
            fuel,
            json,
        } => {
            let source = match read_source(&file) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!("error: {err:#}");
                    return 1;
                }
            };
            match compile_text(&source, fuel) {
                CompileOutcome::Success { js } => match out {
                    Some(out) => match write_output(&out, &js) {
                        Ok(()) => 0,
                        Err(err) => {
                            eprintln!("error: {err:#}");
                            1
                        }
                    },
                    None => {
                        print!("{js}");
                        0
                    }
                },
                CompileOutcome::Failure { diagnostic } => {
                    report(&diagnostic, &source, json);
                    1
                }
            }
        }

        Command::Run { file, fuel } => {
            let source = match read_source(&file) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!("error: {err:#}");
                    return 1;
                }
            };
            match compile_text(&source, fuel) {
                CompileOutcome::Success { js } => run_with_node(&js),
                CompileOutcome::Failure { diagnostic } => {
                    report(&diagnostic, &source, false);
                    1
                }
            }
        }

        Command::Check { file, fuel, json } => {
            let source = match read_source(&file) {
                Ok(source) => source,
                Err(err) => {
                    eprintln!("error: {err:#}");
                    return 1;
                }
            };
            match check_source(&source, EvalOptions { fuel }) {
                Ok(_) => 0,
                Err(diagnostic) => {
                    report(&diagnostic, &source, json);
                    1
                }
            }
        }
    }
}

/// Evaluate the residual in the host JS runtime.
fn run_with_node(js: &str) -> i32 {
    let status = Process::new("node").arg("-e").arg(js).status();
    match status {
        Ok(status) => status.code().unwrap_or(1),
        Err(err) => {
            eprintln!("error: cannot launch `node`: {err}");
            1
        }
    }
}
