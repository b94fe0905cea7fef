//! Monitoring Module
//!
//! Tracks the execution timeline of a run and produces its report.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Step start/end timing and outcomes
//! - [`RunReport`]: Serializable per-run summary

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, RunReport, StepRecord, TimelineEvent};
