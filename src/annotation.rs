//! Impure-function annotation scanner
//!
//! Functions are declared impure by a marker comment on the line right above
//! their definition:
//!
//! ```text
//! // @impure
//! function rand() { ... }
//! ```
//!
//! The scan is line based. Marker state is recomputed on every line, so a
//! blank or unrelated line between the marker and the definition cancels it.
//! A syntax-tree scan would be more precise (markers inside strings, nested
//! definitions on one line); the line scan is the limited fallback.

use crate::function_id::FunctionId;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Default marker token
pub const DEFAULT_MARKER: &str = "@impure";

/// Default definition pattern; capture group 1 is the function name
pub const DEFAULT_DEFINITION_PATTERN: &str = r"function (\w+)\(";

/// Set of functions whose calls are summarized into their callers
#[derive(Debug, Clone, Default)]
pub struct ImpureSet {
    ids: HashSet<FunctionId>,
}

impl ImpureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: FunctionId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: &FunctionId) -> bool {
        self.ids.contains(id)
    }

    pub fn extend(&mut self, other: ImpureSet) {
        self.ids.extend(other.ids);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Identifiers in sorted order
    pub fn sorted(&self) -> Vec<&FunctionId> {
        let mut ids: Vec<_> = self.ids.iter().collect();
        ids.sort();
        ids
    }
}

impl FromIterator<FunctionId> for ImpureSet {
    fn from_iter<I: IntoIterator<Item = FunctionId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Line scanner for impure annotations
#[derive(Debug, Clone)]
pub struct AnnotationScanner {
    marker: String,
    definition: Regex,
}

impl AnnotationScanner {
    /// Create a scanner with a custom marker and definition pattern
    pub fn new(marker: &str, definition_pattern: &str) -> Result<Self> {
        if marker.is_empty() {
            anyhow::bail!("Annotation marker must not be empty");
        }
        let definition = Regex::new(definition_pattern)
            .with_context(|| format!("Invalid definition pattern: {}", definition_pattern))?;
        if definition.captures_len() < 2 {
            anyhow::bail!(
                "Definition pattern {} needs a capture group for the function name",
                definition_pattern
            );
        }
        Ok(Self {
            marker: marker.to_string(),
            definition,
        })
    }

    /// Scan source text. `file` is the label used in the resulting identifiers
    /// and must match the file name the instrumentation reports.
    pub fn scan_str(&self, file: &str, text: &str) -> ImpureSet {
        let mut found = ImpureSet::new();
        let mut marked = false;

        for (index, line) in text.lines().enumerate() {
            if marked {
                if let Some(name) = self.definition.captures(line).and_then(|c| c.get(1)) {
                    let id = FunctionId::new(name.as_str(), file, index as u32 + 1);
                    tracing::debug!("impure function {}", id);
                    found.insert(id);
                }
            }
            marked = line.contains(&self.marker);
        }

        found
    }

    /// Scan one source file. Identifiers use the canonical absolute path,
    /// the form instrumentation reports.
    pub fn scan_file<P: AsRef<Path>>(&self, path: P) -> Result<ImpureSet> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read source file {}", path.display()))?;
        let canonical = fs::canonicalize(path)
            .with_context(|| format!("Failed to resolve source file {}", path.display()))?;
        Ok(self.scan_str(&canonical.to_string_lossy(), &text))
    }

    /// Scan several files and union the results
    pub fn scan_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<ImpureSet> {
        let mut all = ImpureSet::new();
        for path in paths {
            all.extend(self.scan_file(path)?);
        }
        Ok(all)
    }
}

impl Default for AnnotationScanner {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            definition: Regex::new(DEFAULT_DEFINITION_PATTERN)
                .expect("default definition pattern is valid"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
function pure(a) { return a; }
// @impure
function rand() { return Math.random(); }

// @impure

function notImpure() {}
// @impure
function printResult(x) { console.log(x); }
";

    #[test]
    fn test_scan_marks_directly_preceded_definitions() {
        let set = AnnotationScanner::default().scan_str("mod.js", SOURCE);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&FunctionId::new("rand", "mod.js", 3)));
        assert!(set.contains(&FunctionId::new("printResult", "mod.js", 9)));
    }

    #[test]
    fn test_blank_line_resets_marker() {
        let set = AnnotationScanner::default().scan_str("mod.js", SOURCE);
        assert!(!set.contains(&FunctionId::new("notImpure", "mod.js", 7)));
    }

    #[test]
    fn test_unmarked_function_not_impure() {
        let set = AnnotationScanner::default().scan_str("mod.js", SOURCE);
        assert!(!set.contains(&FunctionId::new("pure", "mod.js", 1)));
    }

    #[test]
    fn test_custom_marker_and_pattern() {
        let scanner = AnnotationScanner::new("#[impure]", r"fn (\w+)\(").unwrap();
        let set = scanner.scan_str("lib.rs", "#[impure]\nfn now() -> u64 { 0 }\nfn pure() {}\n");
        assert_eq!(set.sorted(), vec![&FunctionId::new("now", "lib.rs", 2)]);
    }

    #[test]
    fn test_pattern_without_capture_group_rejected() {
        assert!(AnnotationScanner::new("@impure", r"function \w+\(").is_err());
    }

    #[test]
    fn test_empty_marker_rejected() {
        assert!(AnnotationScanner::new("", DEFAULT_DEFINITION_PATTERN).is_err());
    }

    #[test]
    fn test_marker_on_definition_line_does_not_mark_itself() {
        let set = AnnotationScanner::default().scan_str("m.js", "function f() {} // @impure\n");
        assert!(set.is_empty());
    }

    #[test]
    fn test_scan_file_uses_canonical_path() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        let path = dir.path().join("lib").join("mod.js");
        fs::write(&path, SOURCE).unwrap();

        let roundabout = dir.path().join("lib").join("..").join("lib").join("mod.js");
        let set = AnnotationScanner::default().scan_file(&roundabout).unwrap();
        let canonical = fs::canonicalize(&path).unwrap();
        assert!(set.contains(&FunctionId::new("rand", &canonical.to_string_lossy(), 3)));
    }

    #[test]
    fn test_scan_missing_file_errors() {
        let err = AnnotationScanner::default()
            .scan_file("/nonexistent/autotest/source.js")
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read source file"));
    }
}
