//! Function identity: `name@file::line`
//!
//! One identifier per lexical definition. Uniqueness rests on the file and
//! line staying put between the recording run and the generated tests; edits
//! that shift line numbers make old traces point at the wrong definition.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite key identifying one function definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(String);

impl FunctionId {
    pub fn new(name: &str, file: &str, line: u32) -> Self {
        Self(format!("{}@{}::{}", name, file, line))
    }

    /// Wrap an already formatted identifier (as read back from a trace file)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Function name, the part before the first `@`
    pub fn name(&self) -> &str {
        match self.0.split_once('@') {
            Some((name, _)) => name,
            None => &self.0,
        }
    }

    /// Source file, between `@` and the last `::`
    pub fn file(&self) -> &str {
        match self.0.split_once('@') {
            Some((_, rest)) => rest.rsplit_once("::").map_or(rest, |(file, _)| file),
            None => "",
        }
    }

    /// Definition line, if the identifier carries one
    pub fn line(&self) -> Option<u32> {
        let (_, rest) = self.0.split_once('@')?;
        let (_, line) = rest.rsplit_once("::")?;
        line.parse().ok()
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FunctionId {
    fn from(raw: &str) -> Self {
        Self::from_raw(raw)
    }
}
