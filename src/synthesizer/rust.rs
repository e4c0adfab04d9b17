//! Rust test emitter
//!
//! Generated tests load the target module through the configured loader,
//! substitute impure functions with [`ReplayMock`](crate::harness::ReplayMock)s
//! and check the call through the `expect_*` helpers of [`crate::harness`].
//! Values are embedded in their encoded form and decoded at test time.
//!
//! The generated file is meant to sit in `tests/` as its own integration
//! test crate, so the loader must resolve from there. The default loader,
//! `support::load_module`, makes the suite declare `mod support;`: the
//! project provides `tests/support/mod.rs` with
//!
//! ```text
//! pub fn load_module(file: &str) -> autotest::harness::FunctionTable
//! ```
//!
//! returning the functions of `file` registered by name. That module is
//! hand-written and survives regeneration. Any other loader path (an
//! external crate, say) is used as given.

use super::{Expectation, SynthesisOptions, TestCase, TestEmitter, SUPPORT_MODULE};
use crate::codec;
use crate::value::Value;

/// Emits `#[test]` functions
#[derive(Debug, Clone, Copy, Default)]
pub struct RustEmitter;

impl TestEmitter for RustEmitter {
    fn prelude(&self, opts: &SynthesisOptions) -> String {
        let mut out = String::new();
        match &opts.trace_label {
            Some(label) => out.push_str(&format!(
                "//! Regression tests synthesized by autotest from {}.\n",
                label.replace('\n', " ")
            )),
            None => out.push_str("//! Regression tests synthesized by autotest.\n"),
        }
        out.push_str("//! Regenerate from the trace instead of editing by hand.\n");
        out.push_str("#![allow(unused_imports)]\n\n");
        if let Some(module) = support_module(&opts.module_loader) {
            out.push_str(&format!("mod {};\n\n", module));
        }
        out.push_str("use autotest::harness::{\n");
        out.push_str(
            "    expect_equals, expect_null_or_absent, expect_throws, recorded_value, recorded_values,\n",
        );
        out.push_str("    ReplayMock,\n};\n");
        out
    }

    fn emit_case(&self, case: &TestCase<'_>, opts: &SynthesisOptions) -> String {
        let record = case.record;
        let label = case.label();
        let file = case.file();
        let mut out = String::new();

        out.push_str(&format!("\n/// {}\n", label.replace('\n', " ")));
        out.push_str("#[test]\n");
        out.push_str(&format!("fn {}() {{\n", test_ident(case)));
        out.push_str(&format!(
            "    let module = {}({:?});\n",
            opts.module_loader, file
        ));

        for (id, outputs) in &record.impure_outputs {
            let name = id.name();
            out.push_str(&format!(
                "    let replay = ReplayMock::new({:?}, recorded_values({}));\n",
                name,
                raw_string(&codec::encode(&Value::Array(outputs.clone())))
            ));
            out.push_str(&format!(
                "    module\n        .substitute({:?}, replay.into_fn())\n        .expect({:?});\n",
                name,
                format!("{} is defined in {}", name, file)
            ));
        }

        out.push_str(&format!(
            "    let args = recorded_values({});\n",
            raw_string(&codec::encode(&Value::Array(record.arguments.clone())))
        ));
        let call = format!("module.call({:?}, &args)", case.function_name());

        match case.expectation() {
            Expectation::Throws => {
                out.push_str(&format!("    expect_throws({}, {:?});\n", call, label));
            }
            Expectation::NullOrAbsent => {
                out.push_str(&format!("    expect_null_or_absent({}, {:?});\n", call, label));
            }
            Expectation::Equals => {
                out.push_str(&format!(
                    "    let expected = recorded_value({});\n",
                    raw_string(&codec::encode(&record.return_value))
                ));
                out.push_str(&format!(
                    "    expect_equals({}, &expected, {:?});\n",
                    call, label
                ));
            }
        }

        out.push_str("}\n");
        out
    }
}

/// The support module a loader path lives in, if any
pub(crate) fn support_module(loader: &str) -> Option<&str> {
    loader
        .split_once("::")
        .map(|(module, _)| module)
        .filter(|module| *module == SUPPORT_MODULE)
}

/// `<function>_<file stem>_<line>_row<n>`, reduced to a snake_case identifier
fn test_ident(case: &TestCase<'_>) -> String {
    let line = case
        .record
        .function_id
        .line()
        .map(|l| l.to_string())
        .unwrap_or_default();
    let raw = format!(
        "{}_{}_{}_row{}",
        case.function_name(),
        case.file_stem(),
        line,
        case.row
    );

    let mut ident = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' };
        if c == '_' && ident.ends_with('_') {
            continue;
        }
        ident.push(c);
    }
    if ident.starts_with(|c: char| c.is_ascii_digit() || c == '_') {
        ident.insert_str(0, "t");
    }
    ident
}

/// Raw string literal with enough `#`s to hold `text`
fn raw_string(text: &str) -> String {
    let mut hashes = 1;
    while text.contains(&format!("\"{}", "#".repeat(hashes))) {
        hashes += 1;
    }
    let fence = "#".repeat(hashes);
    format!("r{}\"{}\"{}", fence, text, fence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_id::FunctionId;
    use crate::trace_store::{ImpureOutputLog, TraceRecord};

    fn emit(record: &TraceRecord, row: usize) -> String {
        RustEmitter.emit_case(&TestCase::new(row, record), &SynthesisOptions::default())
    }

    #[test]
    fn test_ident_sanitized() {
        let record = TraceRecord {
            function_id: FunctionId::new("printResult", "/a/b-c/my mod.js", 19),
            arguments: vec![],
            impure_outputs: ImpureOutputLog::new(),
            return_value: Value::Null,
            exception: false,
        };
        assert_eq!(test_ident(&TestCase::new(7, &record)), "printresult_my_mod_19_row7");
    }

    #[test]
    fn test_ident_leading_digit() {
        let record = TraceRecord {
            function_id: FunctionId::from_raw("1f@x.js::2"),
            arguments: vec![],
            impure_outputs: ImpureOutputLog::new(),
            return_value: Value::Null,
            exception: false,
        };
        assert!(test_ident(&TestCase::new(1, &record)).starts_with("t1f_"));
    }

    #[test]
    fn test_raw_string_fences() {
        assert_eq!(raw_string("[1]"), "r#\"[1]\"#");
        assert_eq!(raw_string("[\"#x\"]"), "r##\"[\"#x\"]\"##");
    }

    #[test]
    fn test_emits_replay_mock_and_equality() {
        let mut impures = ImpureOutputLog::new();
        impures.insert(
            FunctionId::new("rand", "m.js", 24),
            vec![Value::Number(0.1), Value::Number(0.7)],
        );
        let record = TraceRecord {
            function_id: FunctionId::new("outer", "m.js", 30),
            arguments: vec![],
            impure_outputs: impures,
            return_value: Value::Number(0.8),
            exception: false,
        };
        let src = emit(&record, 1);
        assert!(src.contains("fn outer_m_30_row1() {"));
        assert!(src.contains("let module = support::load_module(\"m.js\");"));
        assert!(src.contains(
            "let replay = ReplayMock::new(\"rand\", recorded_values(r#\"[0.1,0.7]\"#));"
        ));
        assert!(src.contains(".substitute(\"rand\", replay.into_fn())"));
        assert!(src.contains("let expected = recorded_value(r#\"0.8\"#);"));
        assert!(src.contains("expect_equals(module.call(\"outer\", &args), &expected, \"m.js,outer,\");"));
    }

    #[test]
    fn test_custom_loader() {
        let record = TraceRecord {
            function_id: FunctionId::new("g", "m.js", 1),
            arguments: vec![],
            impure_outputs: ImpureOutputLog::new(),
            return_value: Value::Null,
            exception: false,
        };
        let opts = SynthesisOptions {
            module_loader: "targets::load".to_string(),
            ..SynthesisOptions::default()
        };
        let src = RustEmitter.emit_case(&TestCase::new(1, &record), &opts);
        assert!(src.contains("let module = targets::load(\"m.js\");"));
    }

    #[test]
    fn test_prelude_mentions_trace() {
        let opts = SynthesisOptions {
            trace_label: Some("test/outputs.csv".to_string()),
            ..SynthesisOptions::default()
        };
        let prelude = RustEmitter.prelude(&opts);
        assert!(prelude.contains("from test/outputs.csv"));
        assert!(prelude.contains("use autotest::harness::{"));
        assert!(prelude.contains("\nmod support;\n"));
    }

    #[test]
    fn test_other_loaders_declare_no_module() {
        let opts = SynthesisOptions {
            module_loader: "targets::load".to_string(),
            ..SynthesisOptions::default()
        };
        assert!(!RustEmitter.prelude(&opts).contains("mod "));
        assert_eq!(support_module("support::load_module"), Some("support"));
        assert_eq!(support_module("supporting::load"), None);
        assert_eq!(support_module("load_module"), None);
    }
}
