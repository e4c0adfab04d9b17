//! Instrumentation event protocol
//!
//! The instrumented program reports every call as one line of JSON:
//!
//! ```text
//! [AUTOTEST] {"event":"entry","name":"outer","file":"m.js","line":3,"args":[1]}
//! [AUTOTEST] {"event":"exit","name":"outer","file":"m.js","line":3,"returnValue":2,"exception":false}
//! ```
//!
//! Values follow the codec convention (`"NaN"`, `"Infinity"`, `"-Infinity"`).
//! On a child's stdout, only prefixed lines are events; everything else is
//! the program's own output and is passed through. In a saved event log the
//! prefix is optional.

use crate::codec;
use crate::recorder::{CallSite, EntryExitListener};
use crate::value::Value;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Command, ExitStatus, Stdio};

/// Line prefix marking an event on a mixed output stream
pub const EVENT_PREFIX: &str = "[AUTOTEST]";

/// Environment variable telling the instrumented program where to report
pub const EVENTS_ENV: &str = "AUTOTEST_EVENTS";

/// One entry or exit notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum InstrumentationEvent {
    Entry {
        name: String,
        file: String,
        line: u32,
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },
    Exit {
        name: String,
        file: String,
        line: u32,
        #[serde(rename = "returnValue", default)]
        return_value: serde_json::Value,
        #[serde(default)]
        exception: bool,
    },
}

impl InstrumentationEvent {
    pub fn entry(site: &CallSite, args: &[Value]) -> Self {
        Self::Entry {
            name: site.name.clone(),
            file: site.file.clone(),
            line: site.line,
            args: args.iter().map(codec::to_json).collect(),
        }
    }

    pub fn exit(site: &CallSite, return_value: &Value, exception: bool) -> Self {
        Self::Exit {
            name: site.name.clone(),
            file: site.file.clone(),
            line: site.line,
            return_value: codec::to_json(return_value),
            exception,
        }
    }

    pub fn site(&self) -> CallSite {
        match self {
            Self::Entry { name, file, line, .. } | Self::Exit { name, file, line, .. } => {
                CallSite::new(name, file, *line)
            }
        }
    }

    /// Parse an event line, with or without the prefix
    pub fn parse(line: &str) -> Result<Self> {
        let body = line.strip_prefix(EVENT_PREFIX).unwrap_or(line).trim();
        serde_json::from_str(body).with_context(|| format!("Invalid event: {}", body))
    }

    /// Prefixed wire form
    pub fn to_line(&self) -> String {
        // Serializing plain strings, numbers and JSON trees cannot fail.
        let body = serde_json::to_string(self).unwrap_or_default();
        format!("{} {}", EVENT_PREFIX, body)
    }

    /// Deliver this event to a listener
    pub fn dispatch<L: EntryExitListener + ?Sized>(self, listener: &mut L) -> Result<()> {
        let site = self.site();
        match self {
            Self::Entry { args, .. } => {
                let args = args.into_iter().map(codec::from_json).collect();
                listener.on_entry(&site, args)?;
            }
            Self::Exit {
                return_value,
                exception,
                ..
            } => {
                listener.on_exit(&site, codec::from_json(return_value), exception)?;
            }
        }
        Ok(())
    }
}

/// Counters for one event stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    pub entries: usize,
    pub exits: usize,
    pub passthrough_lines: usize,
}

/// Feed events from `reader` to `listener`.
///
/// With `require_prefix`, unprefixed lines are program output and are copied
/// to `passthrough`; without it every non-blank line must be an event.
pub fn replay_events<R, L, W>(
    reader: R,
    listener: &mut L,
    passthrough: &mut W,
    require_prefix: bool,
) -> Result<EventStats>
where
    R: BufRead,
    L: EntryExitListener + ?Sized,
    W: Write,
{
    let mut stats = EventStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read event stream")?;
        let is_event = line.starts_with(EVENT_PREFIX);

        if !is_event && (require_prefix || line.trim().is_empty()) {
            if require_prefix {
                writeln!(passthrough, "{}", line)?;
                stats.passthrough_lines += 1;
            }
            continue;
        }

        let event = InstrumentationEvent::parse(&line)
            .with_context(|| format!("Event stream line {}", index + 1))?;
        match event {
            InstrumentationEvent::Entry { .. } => stats.entries += 1,
            InstrumentationEvent::Exit { .. } => stats.exits += 1,
        }
        event.dispatch(listener)?;
    }

    Ok(stats)
}

/// Run an instrumented command and record the events it prints on stdout.
///
/// The child's own output is forwarded to our stdout. A non-zero exit is
/// returned, not treated as an error: the program may end in an exception.
pub fn trace_command<L>(command: &[String], listener: &mut L) -> Result<(ExitStatus, EventStats)>
where
    L: EntryExitListener + ?Sized,
{
    if command.is_empty() {
        bail!("Command array is empty");
    }

    let program = &command[0];
    let args = &command[1..];

    let mut child = Command::new(program)
        .args(args)
        .env(EVENTS_ENV, "stdout")
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;

    let Some(stdout) = child.stdout.take() else {
        bail!("Child stdout was not captured");
    };

    let stdout_handle = io::stdout();
    let mut passthrough = stdout_handle.lock();
    let replayed = replay_events(BufReader::new(stdout), listener, &mut passthrough, true);

    if replayed.is_err() {
        // Stop the program; the trace can no longer be trusted.
        let _ = child.kill();
    }
    let status = child.wait().context("Failed to wait for child")?;
    let stats = replayed?;

    if !status.success() {
        tracing::warn!("{} exited with {}", program, status);
    }

    Ok((status, stats))
}
