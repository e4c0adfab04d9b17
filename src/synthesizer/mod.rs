//! Test synthesis from stored traces
//!
//! Each trace row becomes one independent test case:
//!
//! 1. every impure function in the row's impure outputs is replaced by a
//!    replay mock yielding the recorded outputs in order;
//! 2. the recorded function is called with the recorded arguments;
//! 3. the outcome is checked: an exception when the exception flag is set,
//!    null *or* nothing when the recorded return value is null (the
//!    instrumentation cannot tell the two apart), deep equality otherwise.
//!
//! Rows that fail to decode are skipped and reported; the rest of the suite
//! is still generated. Output is deterministic for a given row sequence.

mod jasmine;
mod rust;

pub use jasmine::JasmineEmitter;
pub use rust::RustEmitter;

use crate::codec;
use crate::trace_store::{StoredRow, TraceRecord};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Module a generated Rust suite declares when its loader lives under it
pub const SUPPORT_MODULE: &str = "support";

/// Default loader path used by generated Rust tests
pub const DEFAULT_MODULE_LOADER: &str = "support::load_module";

/// Target test framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `#[test]` functions driving an `autotest::harness::FunctionTable`
    #[default]
    Rust,
    /// Jasmine specs using rewire to swap module functions
    Jasmine,
}

impl Dialect {
    fn emitter(self) -> Box<dyn TestEmitter> {
        match self {
            Dialect::Rust => Box::new(RustEmitter),
            Dialect::Jasmine => Box::new(JasmineEmitter),
        }
    }

    /// Conventional file extension of generated suites
    pub fn extension(self) -> &'static str {
        match self {
            Dialect::Rust => "rs",
            Dialect::Jasmine => "js",
        }
    }
}

/// Options controlling generated source
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub dialect: Dialect,
    /// Rust only: path of a `fn(&str) -> FunctionTable` that loads a target
    /// module by file name
    pub module_loader: String,
    /// Where the rows came from, mentioned in the generated header
    pub trace_label: Option<String>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            module_loader: DEFAULT_MODULE_LOADER.to_string(),
            trace_label: None,
        }
    }
}

impl SynthesisOptions {
    /// Module a Rust suite declares to reach its loader, e.g. `support`
    pub fn support_module(&self) -> Option<&str> {
        match self.dialect {
            Dialect::Rust => rust::support_module(&self.module_loader),
            Dialect::Jasmine => None,
        }
    }
}

/// Generated suite plus bookkeeping
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    pub source: String,
    pub generated: usize,
    pub skipped: Vec<SkippedRecord>,
}

/// A row left out of the suite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub row: usize,
    pub function_id: String,
    pub reason: String,
}

/// How the recorded call is expected to end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Throws,
    NullOrAbsent,
    Equals,
}

/// One decoded record with its position in the trace
#[derive(Debug, Clone, Copy)]
pub struct TestCase<'a> {
    pub row: usize,
    pub record: &'a TraceRecord,
}

impl<'a> TestCase<'a> {
    pub fn new(row: usize, record: &'a TraceRecord) -> Self {
        Self { row, record }
    }

    pub fn function_name(&self) -> &'a str {
        self.record.function_id.name()
    }

    pub fn file(&self) -> &'a str {
        self.record.function_id.file()
    }

    pub fn expectation(&self) -> Expectation {
        if self.record.exception {
            Expectation::Throws
        } else if self.record.return_value.is_null() {
            Expectation::NullOrAbsent
        } else {
            Expectation::Equals
        }
    }

    /// Human readable identity: `file,function,args`
    pub fn label(&self) -> String {
        let args: Vec<String> = self.record.arguments.iter().map(codec::encode).collect();
        format!("{},{},{}", self.file(), self.function_name(), args.join(","))
    }

    /// File name without directories or extension
    pub fn file_stem(&self) -> String {
        Path::new(self.file())
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Source generator for one test framework
pub trait TestEmitter {
    /// Text placed once at the top of the suite
    fn prelude(&self, opts: &SynthesisOptions) -> String;

    /// Text for a single test case
    fn emit_case(&self, case: &TestCase<'_>, opts: &SynthesisOptions) -> String;
}

/// Generate a suite from raw stored rows, skipping rows that fail to decode
pub fn synthesize(rows: &[StoredRow], opts: &SynthesisOptions) -> Synthesis {
    let emitter = opts.dialect.emitter();
    let mut out = Synthesis {
        source: emitter.prelude(opts),
        ..Synthesis::default()
    };

    for (index, row) in rows.iter().enumerate() {
        let row_number = if row.row > 0 { row.row } else { index + 1 };
        match row.decode() {
            Ok(record) => {
                out.source
                    .push_str(&emitter.emit_case(&TestCase::new(row_number, &record), opts));
                out.generated += 1;
            }
            Err(e) => {
                tracing::warn!("skipping trace row {} ({}): {}", row_number, row.function_id, e);
                out.skipped.push(SkippedRecord {
                    row: row_number,
                    function_id: row.function_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    out
}

/// Generate a suite from already decoded records
pub fn synthesize_records(records: &[TraceRecord], opts: &SynthesisOptions) -> Synthesis {
    let emitter = opts.dialect.emitter();
    let mut source = emitter.prelude(opts);
    for (index, record) in records.iter().enumerate() {
        source.push_str(&emitter.emit_case(&TestCase::new(index + 1, record), opts));
    }
    Synthesis {
        source,
        generated: records.len(),
        skipped: Vec::new(),
    }
}
