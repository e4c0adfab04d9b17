//! CLI argument parsing for autotest

use crate::synthesizer::Dialect;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "autotest")]
#[command(version)]
#[command(about = "Record function calls and synthesize deterministic regression tests", long_about = None)]
pub struct Cli {
    /// Trace file (CSV) to record into, or to generate tests from with --test
    #[arg(short = 'f', long = "file", value_name = "TRACE")]
    pub file: PathBuf,

    /// Generate tests from an existing trace file and run them
    #[arg(long = "test")]
    pub test: bool,

    /// Source file to scan for impure annotations (repeatable)
    #[arg(short = 's', long = "source", value_name = "PATH")]
    pub sources: Vec<PathBuf>,

    /// Record from a saved instrumentation event log instead of running a command
    #[arg(long = "events", value_name = "PATH", conflicts_with_all = ["command", "test"])]
    pub events: Option<PathBuf>,

    /// Where to write the generated test suite
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Test framework of the generated suite
    #[arg(long = "dialect", value_enum)]
    pub dialect: Option<Dialect>,

    /// Loader function called by generated Rust tests (default support::load_module)
    #[arg(long = "module-loader", value_name = "PATH")]
    pub module_loader: Option<String>,

    /// Test runner command ({file} and {stem} are substituted)
    #[arg(long = "runner", value_name = "CMD")]
    pub runner: Option<String>,

    /// Generate the suite without running it
    #[arg(long = "no-run")]
    pub no_run: bool,

    /// Configuration file (defaults to ./autotest.toml when present)
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long = "debug")]
    pub debug: bool,

    /// Instrumented command to record (everything after --)
    #[arg(last = true, conflicts_with = "test")]
    pub command: Option<Vec<String>>,
}
