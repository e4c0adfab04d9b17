//! Call stack recorder
//!
//! Consumes entry/exit notifications from the instrumentation layer, keeps one
//! frame per in-flight call and emits a [`TraceRecord`] for every completed
//! call to a non-impure function.
//!
//! When an impure function returns, its return value is appended to the
//! impure output log of every frame still on the stack. Any of those
//! ancestors may later become the subject of a generated test, and that test
//! mocks impure functions for its whole call tree.

use crate::annotation::ImpureSet;
use crate::function_id::FunctionId;
use crate::trace_store::{ImpureOutputLog, TraceRecord, TraceSink, TraceStoreError};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Location of a called function as reported by the instrumentation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub name: String,
    pub file: String,
    pub line: u32,
}

impl CallSite {
    pub fn new(name: &str, file: &str, line: u32) -> Self {
        Self {
            name: name.to_string(),
            file: file.to_string(),
            line,
        }
    }

    pub fn function_id(&self) -> FunctionId {
        FunctionId::new(&self.name, &self.file, self.line)
    }
}

/// Receiver of instrumentation notifications
pub trait EntryExitListener {
    fn on_entry(&mut self, site: &CallSite, args: Vec<Value>) -> Result<(), TraceStoreError>;

    fn on_exit(
        &mut self,
        site: &CallSite,
        return_value: Value,
        exception: bool,
    ) -> Result<(), TraceStoreError>;
}

/// One in-flight call
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub function_id: FunctionId,
    pub arguments: Vec<Value>,
    pub impure_outputs: ImpureOutputLog,
}

/// Everything a recording run writes to: the trace sink and the set of
/// impure functions
#[derive(Debug)]
pub struct RecordingSession<S: TraceSink> {
    sink: S,
    impure: ImpureSet,
}

impl<S: TraceSink> RecordingSession<S> {
    pub fn new(sink: S, impure: ImpureSet) -> Self {
        Self { sink, impure }
    }

    pub fn is_impure(&self, id: &FunctionId) -> bool {
        self.impure.contains(id)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub records_written: usize,
    pub impure_calls: usize,
    pub inconsistencies: usize,
    /// Frames still open when the session ended; no record is emitted for them
    pub discarded_frames: usize,
}

/// Stack-based recorder for one session
#[derive(Debug)]
pub struct Recorder<S: TraceSink> {
    session: RecordingSession<S>,
    stack: Vec<CallFrame>,
    summary: SessionSummary,
}

impl<S: TraceSink> Recorder<S> {
    pub fn new(session: RecordingSession<S>) -> Self {
        Self {
            session,
            stack: Vec::new(),
            summary: SessionSummary::default(),
        }
    }

    /// Number of calls currently in flight
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Innermost in-flight call
    pub fn top(&self) -> Option<&CallFrame> {
        self.stack.last()
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    pub fn session(&self) -> &RecordingSession<S> {
        &self.session
    }

    /// End the session: flush the sink and drop unfinished frames
    pub fn finish(mut self) -> Result<(S, SessionSummary), TraceStoreError> {
        if !self.stack.is_empty() {
            self.summary.discarded_frames = self.stack.len();
            for frame in &self.stack {
                tracing::warn!("discarding unfinished call {}", frame.function_id);
            }
        }
        self.session.sink.flush()?;
        Ok((self.session.sink, self.summary))
    }
}

impl<S: TraceSink> EntryExitListener for Recorder<S> {
    fn on_entry(&mut self, site: &CallSite, args: Vec<Value>) -> Result<(), TraceStoreError> {
        self.stack.push(CallFrame {
            function_id: site.function_id(),
            arguments: args,
            impure_outputs: ImpureOutputLog::new(),
        });
        Ok(())
    }

    fn on_exit(
        &mut self,
        site: &CallSite,
        return_value: Value,
        exception: bool,
    ) -> Result<(), TraceStoreError> {
        let id = site.function_id();

        let Some(frame) = self.stack.pop() else {
            self.summary.inconsistencies += 1;
            tracing::warn!("stack inconsistency: exit from {} with no active call", id);
            return Ok(());
        };

        if frame.function_id != id {
            self.summary.inconsistencies += 1;
            tracing::warn!(
                "stack inconsistency: exit from {} but innermost call is {}",
                id,
                frame.function_id
            );
        }

        if self.session.is_impure(&id) {
            for ancestor in &mut self.stack {
                ancestor
                    .impure_outputs
                    .entry(id.clone())
                    .or_default()
                    .push(return_value.clone());
            }
            self.summary.impure_calls += 1;
            return Ok(());
        }

        let record = TraceRecord {
            function_id: id,
            arguments: frame.arguments,
            impure_outputs: frame.impure_outputs,
            return_value,
            exception,
        };
        tracing::debug!("recorded {}", record.function_id);
        self.session.sink.append(&record)?;
        self.summary.records_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(name: &str, line: u32) -> CallSite {
        CallSite::new(name, "mod.js", line)
    }

    fn recorder(impure: &[CallSite]) -> Recorder<Vec<TraceRecord>> {
        let set = impure.iter().map(CallSite::function_id).collect();
        Recorder::new(RecordingSession::new(Vec::new(), set))
    }

    #[test]
    fn test_single_call_emits_record() {
        let mut rec = recorder(&[]);
        let f = site("f", 1);
        rec.on_entry(&f, vec![Value::Number(2.0)]).unwrap();
        assert_eq!(rec.depth(), 1);
        rec.on_exit(&f, Value::Number(4.0), false).unwrap();
        assert_eq!(rec.depth(), 0);

        let (records, summary) = rec.finish().unwrap();
        assert_eq!(summary.records_written, 1);
        assert_eq!(records[0].function_id, f.function_id());
        assert_eq!(records[0].arguments, vec![Value::Number(2.0)]);
        assert_eq!(records[0].return_value, Value::Number(4.0));
        assert!(!records[0].exception);
    }

    #[test]
    fn test_impure_outputs_propagate_to_all_ancestors() {
        let (a, b, c) = (site("a", 1), site("b", 5), site("rand", 9));
        let mut rec = recorder(&[c.clone()]);

        rec.on_entry(&a, vec![]).unwrap();
        rec.on_entry(&b, vec![]).unwrap();
        rec.on_entry(&c, vec![]).unwrap();
        rec.on_exit(&c, Value::Number(0.25), false).unwrap();
        rec.on_exit(&b, Value::Null, false).unwrap();
        rec.on_exit(&a, Value::Null, false).unwrap();

        let (records, summary) = rec.finish().unwrap();
        assert_eq!(summary.records_written, 2);
        assert_eq!(summary.impure_calls, 1);
        for record in &records {
            assert_eq!(
                record.impure_outputs.get(&c.function_id()),
                Some(&vec![Value::Number(0.25)])
            );
        }
    }

    #[test]
    fn test_impure_call_at_top_level_is_dropped() {
        let r = site("rand", 2);
        let mut rec = recorder(&[r.clone()]);
        rec.on_entry(&r, vec![]).unwrap();
        rec.on_exit(&r, Value::Number(0.5), false).unwrap();
        let (records, summary) = rec.finish().unwrap();
        assert!(records.is_empty());
        assert_eq!(summary.impure_calls, 1);
    }

    #[test]
    fn test_mismatched_exit_is_non_fatal() {
        let (f, g) = (site("f", 1), site("g", 2));
        let mut rec = recorder(&[]);
        rec.on_entry(&f, vec![Value::from("x")]).unwrap();
        rec.on_exit(&g, Value::Number(1.0), false).unwrap();

        let (records, summary) = rec.finish().unwrap();
        assert_eq!(summary.inconsistencies, 1);
        // The popped frame supplies the arguments; the exit event names the record.
        assert_eq!(records[0].function_id, g.function_id());
        assert_eq!(records[0].arguments, vec![Value::from("x")]);
    }

    #[test]
    fn test_exit_on_empty_stack() {
        let mut rec = recorder(&[]);
        rec.on_exit(&site("f", 1), Value::Null, false).unwrap();
        assert_eq!(rec.depth(), 0);
        let (records, summary) = rec.finish().unwrap();
        assert!(records.is_empty());
        assert_eq!(summary.inconsistencies, 1);
    }

    #[test]
    fn test_unfinished_frames_discarded() {
        let mut rec = recorder(&[]);
        rec.on_entry(&site("main", 1), vec![]).unwrap();
        rec.on_entry(&site("inner", 4), vec![]).unwrap();
        let (records, summary) = rec.finish().unwrap();
        assert!(records.is_empty());
        assert_eq!(summary.discarded_frames, 2);
    }

    #[test]
    fn test_recursion_gets_own_frames() {
        let fact = site("fact", 3);
        let mut rec = recorder(&[]);
        rec.on_entry(&fact, vec![Value::Number(2.0)]).unwrap();
        rec.on_entry(&fact, vec![Value::Number(1.0)]).unwrap();
        assert_eq!(rec.top().unwrap().arguments, vec![Value::Number(1.0)]);
        rec.on_exit(&fact, Value::Number(1.0), false).unwrap();
        rec.on_exit(&fact, Value::Number(2.0), false).unwrap();

        let (records, summary) = rec.finish().unwrap();
        assert_eq!(summary.inconsistencies, 0);
        assert_eq!(records[0].arguments, vec![Value::Number(1.0)]);
        assert_eq!(records[1].arguments, vec![Value::Number(2.0)]);
    }

    #[test]
    fn test_exception_flag_recorded() {
        let f = site("boom", 1);
        let mut rec = recorder(&[]);
        rec.on_entry(&f, vec![]).unwrap();
        rec.on_exit(&f, Value::Null, true).unwrap();
        let (records, _) = rec.finish().unwrap();
        assert!(records[0].exception);
    }
}
