//! Module loader for the checked-in generated suite
//!
//! Stands in for `m.js`: `rand` is not deterministic in the real module, so
//! it returns a value the recorded trace never saw. Tests only pass when the
//! replayed outputs are used.

use autotest::harness::{FunctionTable, Thrown};
use autotest::value::Value;

fn number(outcome: Option<Value>) -> f64 {
    outcome.and_then(|v| v.as_f64()).unwrap_or(f64::NAN)
}

pub fn load_module(file: &str) -> FunctionTable {
    assert_eq!(file, "m.js", "no such module: {}", file);

    let module = FunctionTable::new();
    module.define("rand", |_, _| Ok(Some(Value::Number(0.9))));
    module.define("outer", |m, _| {
        let a = number(m.call("rand", &[])?);
        let b = number(m.call("rand", &[])?);
        Ok(Some(Value::Number(a + b)))
    });
    module.define("add", |_, args| {
        Ok(Some(Value::Number(args.iter().filter_map(Value::as_f64).sum())))
    });
    module.define("fail", |_, args| {
        Err(Thrown::new(format!("cannot handle {}", args[0])))
    });
    module.define("log", |_, _| Ok(None));
    module.define("inv", |_, args| {
        Ok(args.first().and_then(Value::as_f64).map(|x| Value::Number(1.0 / x)))
    });
    module
}
