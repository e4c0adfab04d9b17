//! Jasmine spec emitter
//!
//! One `describe` block per record. The target file is loaded with `rewire`,
//! impure functions are swapped through `__set__`, and the function under test
//! is fetched with `__get__`. Values are written as JavaScript literals, so
//! the non-finite sentinels become `NaN`, `Infinity` and `-Infinity`.

use super::{Expectation, SynthesisOptions, TestCase, TestEmitter};
use crate::codec;
use crate::value::Value;

/// Emits Jasmine `describe`/`it` blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct JasmineEmitter;

impl TestEmitter for JasmineEmitter {
    fn prelude(&self, opts: &SynthesisOptions) -> String {
        let mut out = String::new();
        if let Some(label) = &opts.trace_label {
            out.push_str(&format!(
                "// Synthesized by autotest from {}\n",
                label.replace('\n', " ")
            ));
        }
        out.push_str("let rewire = require('rewire')\n");
        out
    }

    fn emit_case(&self, case: &TestCase<'_>, _opts: &SynthesisOptions) -> String {
        let record = case.record;
        let fn_name = js_string(case.function_name());
        let args = js_literal(&Value::Array(record.arguments.clone()));
        let mut out = String::new();

        out.push_str(&format!("describe({}, function() {{\n", js_string(&case.label())));
        out.push_str(&format!("  let file = rewire({});\n", js_string(case.file())));

        for (id, outputs) in &record.impure_outputs {
            let exhausted = js_string(&format!(
                "replay exhausted for {}: {} recorded output(s)",
                id.name(),
                outputs.len()
            ));
            out.push_str(&format!(
                "  file.__set__({}, (function() {{\n",
                js_string(id.name())
            ));
            out.push_str("    let counter = 0;\n");
            out.push_str(&format!(
                "    let returnValues = {};\n",
                js_literal(&Value::Array(outputs.clone()))
            ));
            out.push_str("    return function() {\n");
            out.push_str("      if (counter >= returnValues.length) {\n");
            out.push_str(&format!("        fail({});\n", exhausted));
            out.push_str(&format!("        throw new Error({});\n", exhausted));
            out.push_str("      }\n");
            out.push_str("      let value = returnValues[counter];\n");
            out.push_str("      counter += 1;\n");
            out.push_str("      return value;\n");
            out.push_str("    }\n");
            out.push_str("  })())\n");
        }

        let condition = match case.expectation() {
            Expectation::Throws => format!(
                "expect(file.__get__({}).bind(null, ...{})).toThrow();",
                fn_name, args
            ),
            Expectation::NullOrAbsent => format!(
                "expect([null, undefined]).toContain(file.__get__({})(...{}));",
                fn_name, args
            ),
            Expectation::Equals => format!(
                "expect(file.__get__({})(...{})).toEqual({});",
                fn_name,
                args,
                js_literal(&record.return_value)
            ),
        };

        out.push_str("  it('', function() {\n");
        out.push_str(&format!("    {}\n", condition));
        out.push_str("  });\n");
        out.push_str("});\n");
        out
    }
}

/// Quoted JavaScript string literal
fn js_string(s: &str) -> String {
    // JSON string syntax is valid JavaScript.
    codec::encode(&Value::String(s.to_string()))
}

/// JavaScript literal for a value
fn js_literal(value: &Value) -> String {
    match value {
        Value::Number(n) if n.is_nan() => "NaN".to_string(),
        Value::Number(n) if n.is_infinite() => {
            let literal = if *n > 0.0 { "Infinity" } else { "-Infinity" };
            literal.to_string()
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(js_literal).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", js_string(k), js_literal(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        scalar => codec::encode(scalar),
    }
}
