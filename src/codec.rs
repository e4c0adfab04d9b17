//! Textual value codec for trace files
//!
//! Values are written as JSON. JSON has no literal for NaN or the infinities,
//! so those are written as the reserved strings `"NaN"`, `"Infinity"` and
//! `"-Infinity"` and turned back into numbers on decode.
//!
//! Known limitation: a recorded string whose content is exactly one of the
//! reserved literals decodes as the corresponding number.

use crate::value::Value;
use serde_json::Number;
use thiserror::Error;

pub const NAN_LITERAL: &str = "NaN";
pub const INFINITY_LITERAL: &str = "Infinity";
pub const NEG_INFINITY_LITERAL: &str = "-Infinity";

/// Largest magnitude at which every integer is exactly representable in f64
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Errors raised while decoding stored values
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid encoded value {input:?}: {source}")]
    Syntax {
        input: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Encode a value as a single line of text
pub fn encode(value: &Value) -> String {
    // Serializing a serde_json::Value cannot fail: keys are always strings.
    to_json(value).to_string()
}

/// Decode text produced by [`encode`]
pub fn decode(text: &str) -> Result<Value, CodecError> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|source| CodecError::Syntax {
            input: text.to_string(),
            source,
        })?;
    Ok(from_json(json))
}

/// Convert to a JSON tree, replacing non-finite numbers with their literals
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
    }
}

/// Convert from a JSON tree, mapping the reserved literals back to numbers.
/// Object keys are left untouched.
pub fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => match s.as_str() {
            NAN_LITERAL => Value::Number(f64::NAN),
            INFINITY_LITERAL => Value::Number(f64::INFINITY),
            NEG_INFINITY_LITERAL => Value::Number(f64::NEG_INFINITY),
            _ => Value::String(s),
        },
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_nan() {
        return serde_json::Value::String(NAN_LITERAL.to_string());
    }
    if n.is_infinite() {
        let literal = if n > 0.0 {
            INFINITY_LITERAL
        } else {
            NEG_INFINITY_LITERAL
        };
        return serde_json::Value::String(literal.to_string());
    }

    // Integral values print without a fraction; -0.0 keeps its sign as a float.
    let negative_zero = n == 0.0 && n.is_sign_negative();
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER && !negative_zero {
        return serde_json::Value::Number(Number::from(n as i64));
    }

    match Number::from_f64(n) {
        Some(num) => serde_json::Value::Number(num),
        None => serde_json::Value::String(NAN_LITERAL.to_string()),
    }
}
