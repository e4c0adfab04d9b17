//! Append-only CSV trace log
//!
//! One row per completed non-impure call, columns in fixed order:
//!
//! ```text
//! fn,args,impures,returnValue,exception
//! ```
//!
//! `args`, `impures` and `returnValue` hold codec-encoded values; `exception`
//! is the literal `true` or `false`. Rows are never updated or deleted.

use crate::codec::{self, CodecError};
use crate::function_id::FunctionId;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

/// Column names, in storage order
pub const HEADER: [&str; 5] = ["fn", "args", "impures", "returnValue", "exception"];

/// Errors reading or writing a trace log
#[derive(Error, Debug)]
pub enum TraceStoreError {
    #[error("trace log I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("row {row}: {source}")]
    Codec {
        row: usize,
        #[source]
        source: CodecError,
    },

    #[error("row {row}: malformed trace row: {reason}")]
    MalformedRow { row: usize, reason: String },
}

/// Outputs of impure functions observed during one call, keyed by function,
/// each sequence in the order the impure calls returned
pub type ImpureOutputLog = BTreeMap<FunctionId, Vec<Value>>;

/// One completed non-impure call
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub function_id: FunctionId,
    pub arguments: Vec<Value>,
    pub impure_outputs: ImpureOutputLog,
    pub return_value: Value,
    pub exception: bool,
}

impl TraceRecord {
    /// Encode into a storage row
    pub fn to_row(&self) -> StoredRow {
        let impures = Value::Object(
            self.impure_outputs
                .iter()
                .map(|(id, outputs)| (id.to_string(), Value::Array(outputs.clone())))
                .collect(),
        );
        StoredRow {
            row: 0,
            function_id: self.function_id.to_string(),
            arguments: codec::encode(&Value::Array(self.arguments.clone())),
            impure_outputs: codec::encode(&impures),
            return_value: codec::encode(&self.return_value),
            exception: self.exception.to_string(),
            columns: HEADER.len(),
        }
    }
}

/// A row as stored, fields still encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    /// 1-based data row number (header excluded); 0 when not read from a file
    pub row: usize,
    pub function_id: String,
    pub arguments: String,
    pub impure_outputs: String,
    pub return_value: String,
    pub exception: String,
    /// Number of columns the row actually had
    columns: usize,
}

impl StoredRow {
    /// Missing columns are left empty; the count mismatch surfaces in `decode`
    fn from_fields(row: usize, fields: Vec<String>) -> Self {
        let columns = fields.len();
        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();
        Self {
            row,
            function_id: next(),
            arguments: next(),
            impure_outputs: next(),
            return_value: next(),
            exception: next(),
            columns,
        }
    }

    /// Number of columns the row had when read
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Decode the stored fields into a record
    pub fn decode(&self) -> Result<TraceRecord, TraceStoreError> {
        let row = self.row;
        let codec_err = |source: CodecError| TraceStoreError::Codec { row, source };
        let malformed = |reason: String| TraceStoreError::MalformedRow { row, reason };

        if self.columns != HEADER.len() {
            return Err(malformed(format!(
                "expected {} columns, found {}",
                HEADER.len(),
                self.columns
            )));
        }

        if self.function_id.is_empty() {
            return Err(malformed("empty function id".to_string()));
        }

        let arguments = match codec::decode(&self.arguments).map_err(codec_err)? {
            Value::Array(items) => items,
            other => return Err(malformed(format!("args is a {}, not an array", other.kind()))),
        };

        let impure_outputs = match codec::decode(&self.impure_outputs).map_err(codec_err)? {
            Value::Object(map) => map
                .into_iter()
                .map(|(id, outputs)| match outputs {
                    Value::Array(items) => Ok((FunctionId::from_raw(id), items)),
                    other => Err(malformed(format!(
                        "impure outputs of {} is a {}, not an array",
                        id,
                        other.kind()
                    ))),
                })
                .collect::<Result<ImpureOutputLog, _>>()?,
            other => {
                return Err(malformed(format!(
                    "impures is a {}, not an object",
                    other.kind()
                )))
            }
        };

        let return_value = codec::decode(&self.return_value).map_err(codec_err)?;

        let exception = match self.exception.trim() {
            "true" => true,
            "false" => false,
            other => return Err(malformed(format!("invalid exception flag {:?}", other))),
        };

        Ok(TraceRecord {
            function_id: FunctionId::from_raw(self.function_id.clone()),
            arguments,
            impure_outputs,
            return_value,
            exception,
        })
    }

    fn to_csv_line(&self) -> String {
        [
            &self.function_id,
            &self.arguments,
            &self.impure_outputs,
            &self.return_value,
            &self.exception,
        ]
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",")
    }
}

/// Destination for completed trace records
pub trait TraceSink {
    fn append(&mut self, record: &TraceRecord) -> Result<(), TraceStoreError>;

    fn flush(&mut self) -> Result<(), TraceStoreError> {
        Ok(())
    }
}

/// In-memory sink
impl TraceSink for Vec<TraceRecord> {
    fn append(&mut self, record: &TraceRecord) -> Result<(), TraceStoreError> {
        self.push(record.clone());
        Ok(())
    }
}

/// CSV trace writer; each row is flushed as soon as it is appended
#[derive(Debug)]
pub struct TraceWriter<W: Write> {
    out: W,
    rows_written: usize,
}

impl TraceWriter<File> {
    /// Open a trace file for appending. The header is written only when the
    /// file is new or empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TraceStoreError> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let empty = file.metadata()?.len() == 0;
        Self::new(file, empty)
    }
}

impl<W: Write> TraceWriter<W> {
    pub fn new(mut out: W, write_header: bool) -> Result<Self, TraceStoreError> {
        if write_header {
            writeln!(out, "{}", HEADER.join(","))?;
            out.flush()?;
        }
        Ok(Self {
            out,
            rows_written: 0,
        })
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TraceSink for TraceWriter<W> {
    fn append(&mut self, record: &TraceRecord) -> Result<(), TraceStoreError> {
        writeln!(self.out, "{}", record.to_row().to_csv_line())?;
        self.out.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TraceStoreError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Read raw rows from a trace file, skipping the header and blank lines
pub fn read_rows<P: AsRef<Path>>(path: P) -> Result<Vec<StoredRow>, TraceStoreError> {
    let text = fs::read_to_string(path)?;
    parse_rows(&text)
}

/// Parse raw rows from trace log text. A row with the wrong number of
/// columns is still returned and fails later in [`StoredRow::decode`].
pub fn parse_rows(text: &str) -> Result<Vec<StoredRow>, TraceStoreError> {
    let mut rows = Vec::new();
    for fields in split_records(text) {
        if fields.len() == 1 && fields[0].is_empty() {
            continue;
        }
        if rows.is_empty() && fields.iter().map(String::as_str).eq(HEADER) {
            continue;
        }
        rows.push(StoredRow::from_fields(rows.len() + 1, fields));
    }
    Ok(rows)
}

/// Read and decode every record; the first undecodable row is an error
pub fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<TraceRecord>, TraceStoreError> {
    read_rows(path)?.iter().map(StoredRow::decode).collect()
}

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split CSV text into records of unescaped fields
fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut fields));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(fields);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TraceRecord {
        let mut impures = ImpureOutputLog::new();
        impures.insert(
            FunctionId::new("rand", "m.js", 2),
            vec![Value::Number(0.1), Value::Number(f64::NAN)],
        );
        TraceRecord {
            function_id: FunctionId::new("outer", "m.js", 5),
            arguments: vec![Value::from("a,b"), Value::Number(3.0)],
            impure_outputs: impures,
            return_value: Value::Number(f64::INFINITY),
            exception: false,
        }
    }

    fn written(records: &[TraceRecord]) -> String {
        let mut writer = TraceWriter::new(Vec::new(), true).unwrap();
        for record in records {
            writer.append(record).unwrap();
        }
        String::from_utf8(writer.into_inner()).unwrap()
    }

    #[test]
    fn test_header_row() {
        let text = written(&[]);
        assert_eq!(text, "fn,args,impures,returnValue,exception\n");
    }

    #[test]
    fn test_row_layout() {
        let text = written(&[sample_record()]);
        let line = text.lines().nth(1).unwrap();
        assert_eq!(
            line,
            r#"outer@m.js::5,"[""a,b"",3]","{""rand@m.js::2"":[0.1,""NaN""]}","""Infinity""",false"#
        );
    }

    #[test]
    fn test_parse_written_rows() {
        let record = sample_record();
        let rows = parse_rows(&written(&[record.clone(), record.clone()])).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row, 1);
        assert_eq!(rows[1].row, 2);
        assert_eq!(rows[0].decode().unwrap(), record);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let text = format!("{}\n\n", written(&[sample_record()]));
        assert_eq!(parse_rows(&text).unwrap().len(), 1);
    }

    #[test]
    fn test_headerless_log_accepted() {
        let rows = parse_rows("f@a.js::1,[],{},null,true\n").unwrap();
        let record = rows[0].decode().unwrap();
        assert!(record.exception);
        assert!(record.return_value.is_null());
        assert!(record.impure_outputs.is_empty());
    }

    #[test]
    fn test_wrong_column_count() {
        let rows = parse_rows("f@a.js::1,[],{}\n").unwrap();
        assert_eq!(rows[0].columns(), 3);
        assert!(matches!(
            rows[0].decode(),
            Err(TraceStoreError::MalformedRow { row: 1, .. })
        ));
    }

    #[test]
    fn test_short_row_does_not_hide_neighbours() {
        let text = "a@m.js::1,[],{},1,false\nb@m.js::2,[],{}\nc@m.js::3,[],{},null,true\n";
        let rows = parse_rows(text).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].decode().is_ok());
        assert!(rows[1].decode().is_err());
        assert!(rows[2].decode().unwrap().exception);
    }

    #[test]
    fn test_bad_exception_flag() {
        let rows = parse_rows("f@a.js::1,[],{},null,maybe\n").unwrap();
        assert!(matches!(
            rows[0].decode(),
            Err(TraceStoreError::MalformedRow { .. })
        ));
    }

    #[test]
    fn test_codec_failure_reports_row() {
        let rows =
            parse_rows("f@a.js::1,[],{},null,false\ng@a.js::2,[oops,{},null,false\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].decode().is_ok());
        match rows[1].decode() {
            Err(TraceStoreError::Codec { row, .. }) => assert_eq!(row, 2),
            other => panic!("expected codec error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_value_is_codec_error() {
        let rows = parse_rows("g@a.js::2,\"[1,\",{},null,false\n").unwrap();
        match rows[0].decode() {
            Err(TraceStoreError::Codec { row, .. }) => assert_eq!(row, 1),
            other => panic!("expected codec error, got {:?}", other),
        }
    }

    #[test]
    fn test_crlf_line_endings() {
        let rows = parse_rows("fn,args,impures,returnValue,exception\r\nf@a.js::1,[],{},1,false\r\n")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decode().unwrap().return_value, Value::Number(1.0));
    }

    #[test]
    fn test_escape_field_simple() {
        assert_eq!(escape_field("hello"), "hello");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_embedded_newline_survives() {
        let mut record = sample_record();
        record.arguments = vec![Value::from("line1\nline2")];
        let rows = parse_rows(&written(&[record.clone()])).unwrap();
        assert_eq!(rows[0].decode().unwrap(), record);
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<TraceRecord> = Vec::new();
        TraceSink::append(&mut sink, &sample_record()).unwrap();
        assert_eq!(sink.len(), 1);
    }
}
