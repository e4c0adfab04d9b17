//! Runtime support for generated Rust tests
//!
//! A target module exposes its functions through a [`FunctionTable`]: a
//! registry of named handles. Functions reach their collaborators through the
//! table, so a test can swap an impure function for a [`ReplayMock`] by name
//! and every caller inside the module sees the replacement.
//!
//! # Example
//!
//! ```
//! use autotest::harness::{expect_equals, FunctionTable, ReplayMock};
//! use autotest::value::Value;
//!
//! let module = FunctionTable::new();
//! module.define("rand", |_, _| Ok(Some(Value::Number(0.42))));
//! module.define("outer", |m, _| {
//!     let a = m.call("rand", &[])?.and_then(|v| v.as_f64()).unwrap_or(0.0);
//!     let b = m.call("rand", &[])?.and_then(|v| v.as_f64()).unwrap_or(0.0);
//!     Ok(Some(Value::Number(a + b)))
//! });
//!
//! let mock = ReplayMock::new("rand", vec![Value::Number(0.25), Value::Number(0.5)]);
//! module.substitute("rand", mock.into_fn()).unwrap();
//! expect_equals(module.call("outer", &[]), &Value::Number(0.75), "outer()");
//! ```

use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Error raised by a function under test
#[derive(Debug, Clone, PartialEq)]
pub struct Thrown {
    pub message: String,
}

impl Thrown {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of calling a function: `Ok(None)` is "returned nothing"
pub type Invocation = Result<Option<Value>, Thrown>;

/// A callable registered in a [`FunctionTable`]
pub type NativeFn = Rc<dyn Fn(&FunctionTable, &[Value]) -> Invocation>;

#[derive(Error, Debug, PartialEq)]
pub enum HarnessError {
    #[error("module has no function named {0:?}")]
    UnknownFunction(String),
}

/// Registry of replaceable function handles, keyed by name
#[derive(Default)]
pub struct FunctionTable {
    slots: RefCell<HashMap<String, NativeFn>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) a function
    pub fn define<F>(&self, name: &str, f: F)
    where
        F: Fn(&FunctionTable, &[Value]) -> Invocation + 'static,
    {
        self.slots.borrow_mut().insert(name.to_string(), Rc::new(f));
    }

    /// Replace an existing function, returning the previous handle
    pub fn substitute(&self, name: &str, f: NativeFn) -> Result<NativeFn, HarnessError> {
        let mut slots = self.slots.borrow_mut();
        match slots.get_mut(name) {
            Some(slot) => Ok(std::mem::replace(slot, f)),
            None => Err(HarnessError::UnknownFunction(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.borrow().contains_key(name)
    }

    /// Call a function by name. Calling an unknown name throws.
    pub fn call(&self, name: &str, args: &[Value]) -> Invocation {
        // Release the borrow before calling so the callee may call back in.
        let handle = self.slots.borrow().get(name).cloned();
        match handle {
            Some(f) => f(self, args),
            None => Err(Thrown::new(format!("{} is not a function", name))),
        }
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.borrow();
        let mut names: Vec<_> = slots.keys().collect();
        names.sort();
        f.debug_struct("FunctionTable").field("functions", &names).finish()
    }
}

/// Stub that returns recorded outputs in order, one per call.
///
/// Calling it more times than outputs were recorded panics: the code under
/// test has diverged from the recording and the test must fail.
#[derive(Debug)]
pub struct ReplayMock {
    function: String,
    outputs: Vec<Value>,
    cursor: Cell<usize>,
}

impl ReplayMock {
    pub fn new(function: &str, outputs: Vec<Value>) -> Self {
        Self {
            function: function.to_string(),
            outputs,
            cursor: Cell::new(0),
        }
    }

    /// Output at the cursor; advances the cursor
    pub fn next_output(&self) -> Value {
        let index = self.cursor.get();
        match self.outputs.get(index) {
            Some(value) => {
                self.cursor.set(index + 1);
                value.clone()
            }
            None => panic!(
                "replay exhausted for {}: {} recorded output(s)",
                self.function,
                self.outputs.len()
            ),
        }
    }

    /// Number of outputs handed out so far
    pub fn calls(&self) -> usize {
        self.cursor.get()
    }

    pub fn remaining(&self) -> usize {
        self.outputs.len() - self.cursor.get()
    }

    pub fn into_fn(self) -> NativeFn {
        Rc::new(move |_: &FunctionTable, _: &[Value]| Ok(Some(self.next_output())))
    }
}

/// Decode a value embedded in a generated test
pub fn recorded_value(text: &str) -> Value {
    match crate::codec::decode(text) {
        Ok(value) => value,
        Err(e) => panic!("corrupt recorded value: {}", e),
    }
}

/// Decode an embedded sequence (arguments or replay outputs)
pub fn recorded_values(text: &str) -> Vec<Value> {
    match recorded_value(text) {
        Value::Array(items) => items,
        other => panic!("recorded sequence is a {}, not an array", other.kind()),
    }
}

/// Assert the invocation threw
pub fn expect_throws(outcome: Invocation, label: &str) {
    if let Ok(value) = outcome {
        panic!(
            "{}: expected an exception, got {}",
            label,
            value.map_or_else(|| "nothing".to_string(), |v| v.to_string())
        );
    }
}

/// Assert the invocation returned null or nothing at all
pub fn expect_null_or_absent(outcome: Invocation, label: &str) {
    match outcome {
        Ok(None) | Ok(Some(Value::Null)) => {}
        Ok(Some(other)) => panic!("{}: expected null or nothing, got {}", label, other),
        Err(thrown) => panic!("{}: unexpected exception: {}", label, thrown),
    }
}

/// Assert the invocation returned a value deep-equal to `expected`
pub fn expect_equals(outcome: Invocation, expected: &Value, label: &str) {
    match outcome {
        Ok(Some(actual)) => {
            if &actual != expected {
                panic!("{}: expected {}, got {}", label, expected, actual);
            }
        }
        Ok(None) => panic!("{}: expected {}, got nothing", label, expected),
        Err(thrown) => panic!("{}: unexpected exception: {}", label, thrown),
    }
}
