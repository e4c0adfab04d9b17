//! Autotest - record/replay regression test synthesis
//!
//! This library records the calls a running program makes (arguments, return
//! value, exception status and the outputs of annotated impure functions),
//! persists them as a CSV trace, and turns the trace into deterministic,
//! mock-backed test cases.

pub mod annotation;
pub mod cli;
pub mod codec;
pub mod config;
pub mod events;
pub mod function_id;
pub mod harness;
pub mod recorder;
pub mod runner;
pub mod synthesizer;
pub mod trace_store;
pub mod value;
