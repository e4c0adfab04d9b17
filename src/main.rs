use anyhow::{bail, Context, Result};
use autotest::annotation::AnnotationScanner;
use autotest::cli::Cli;
use autotest::config::AutotestConfig;
use autotest::recorder::{Recorder, RecordingSession};
use autotest::synthesizer::{self, SynthesisOptions};
use autotest::trace_store::{self, TraceWriter};
use autotest::{events, runner};
use clap::Parser;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; warnings always, everything with --debug
fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::TRACE
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Create the parent directory of `path` if needed
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Warn when the module a Rust suite declares is not next to it
fn warn_missing_support(output: &Path, module: &str) {
    let dir = output.parent().unwrap_or_else(|| Path::new(""));
    let nested = dir.join(module).join("mod.rs");
    let flat = dir.join(format!("{}.rs", module));
    if !nested.exists() && !flat.exists() {
        eprintln!(
            "[autotest: Warning - suite declares `mod {};` but {} does not exist; it must define load_module]",
            module,
            nested.display()
        );
    }
}

/// Fold command-line overrides into the file configuration
fn merge_config(args: &Cli) -> Result<AutotestConfig> {
    let mut config = AutotestConfig::load(args.config.as_deref())?;
    if !args.sources.is_empty() {
        config.sources = args.sources.clone();
    }
    if let Some(dialect) = args.dialect {
        config.dialect = dialect;
    }
    if let Some(output) = &args.output {
        config.test_output = Some(output.clone());
    }
    if let Some(loader) = &args.module_loader {
        config.module_loader = loader.clone();
    }
    if let Some(spec) = &args.runner {
        config.runner = Some(runner::parse_runner(spec)?);
    }
    Ok(config)
}

/// Record a fresh trace from an instrumented command or a saved event log
fn run_record(args: &Cli, config: &AutotestConfig) -> Result<()> {
    let scanner = AnnotationScanner::new(&config.marker, &config.definition_pattern)?;
    let impure = scanner.scan_files(&config.sources)?;
    let annotated = impure.len();
    eprintln!("[autotest: {} impure function(s) annotated]", annotated);
    for id in impure.sorted() {
        tracing::debug!("impure: {}", id);
    }

    ensure_parent_dir(&args.file)?;
    let writer = TraceWriter::open(&args.file)
        .with_context(|| format!("Failed to open trace file {}", args.file.display()))?;
    let mut recorder = Recorder::new(RecordingSession::new(writer, impure));

    match (&args.events, &args.command) {
        (Some(path), None) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open event log {}", path.display()))?;
            events::replay_events(BufReader::new(file), &mut recorder, &mut io::stdout(), false)?;
        }
        (None, Some(command)) => {
            events::trace_command(command, &mut recorder)?;
        }
        (Some(_), Some(_)) => {
            bail!("Cannot specify both --events and a command. Choose one.");
        }
        (None, None) => {
            bail!("Must specify either --events FILE or a command. Usage: autotest -f TRACE -- COMMAND [ARGS...]");
        }
    }

    let (_, summary) = recorder.finish()?;
    eprintln!(
        "[autotest: {} record(s) written to {}]",
        summary.records_written,
        args.file.display()
    );
    if summary.inconsistencies > 0 {
        eprintln!(
            "[autotest: Warning - {} stack inconsistency(ies) detected]",
            summary.inconsistencies
        );
    }
    if annotated > 0 && summary.impure_calls == 0 && summary.records_written > 0 {
        eprintln!(
            "[autotest: Warning - no annotated impure function was called; \
             check that --source paths match the file paths the instrumentation reports]"
        );
    }
    if summary.discarded_frames > 0 {
        eprintln!(
            "[autotest: {} unfinished call(s) discarded]",
            summary.discarded_frames
        );
    }
    Ok(())
}

/// Generate a suite from an existing trace and optionally run it
fn run_generate(args: &Cli, config: &AutotestConfig) -> Result<()> {
    let rows = trace_store::read_rows(&args.file)
        .with_context(|| format!("Failed to read trace file {}", args.file.display()))?;

    let opts = SynthesisOptions {
        dialect: config.dialect,
        module_loader: config.module_loader.clone(),
        trace_label: Some(args.file.display().to_string()),
    };
    let synthesis = synthesizer::synthesize(&rows, &opts);

    let output = config.test_output_path();
    ensure_parent_dir(&output)?;
    fs::write(&output, &synthesis.source)
        .with_context(|| format!("Failed to write test suite {}", output.display()))?;
    eprintln!(
        "[autotest: {} test(s) written to {}]",
        synthesis.generated,
        output.display()
    );

    if let Some(module) = opts.support_module() {
        warn_missing_support(&output, module);
    }

    for skipped in &synthesis.skipped {
        eprintln!(
            "[autotest: Skipped row {} ({}): {}]",
            skipped.row, skipped.function_id, skipped.reason
        );
    }

    if !args.no_run {
        runner::run_tests(&config.runner_command(), &output)?;
    }

    if !synthesis.skipped.is_empty() {
        bail!(
            "{} trace row(s) could not be decoded",
            synthesis.skipped.len()
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = merge_config(&args)?;

    if args.test {
        run_generate(&args, &config)
    } else {
        run_record(&args, &config)
    }
}
