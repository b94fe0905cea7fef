//! Execution Timeline
//!
//! Tracks step start/end times for the end-of-run summary and the JSON run
//! report written to the reports directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::Serialize;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Step started executing
    Started,
    /// Step exited zero
    Completed,
    /// Step exited non-zero or could not start
    Failed,
    /// Step was terminated on operator request
    Skipped,
    /// Step exceeded its deadline
    TimedOut,
    /// Run stopped by the operator while the step was running
    Interrupted,
}

impl EventType {
    fn is_terminal(self) -> bool {
        !matches!(self, Self::Started)
    }
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// 1-based step index
    pub step: usize,
    pub step_name: String,
    pub event_type: EventType,
    pub timestamp: Instant,
}

/// One step's entry in the run report.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub outcome: EventType,
    pub duration_ms: u128,
}

/// Serializable summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workflow_name: String,
    pub target: String,
    pub started_at: DateTime<Local>,
    pub total_ms: u128,
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    /// Writes the report as `<key>-<timestamp>.json` under `dir`.
    pub fn save(&self, dir: &Path, key: &str) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let file = dir.join(format!(
            "{}-{}.json",
            key,
            self.started_at.format("%Y%m%d-%H%M%S")
        ));
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&file, json)?;
        Ok(file)
    }
}

/// Tracks the execution timeline of a workflow run.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
    started_at: DateTime<Local>,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
            started_at: Local::now(),
        }
    }

    /// Records an event for a step.
    pub fn add_event(&mut self, step: usize, step_name: &str, event_type: EventType) {
        self.events.push(TimelineEvent {
            step,
            step_name: step_name.to_string(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Returns step durations in milliseconds, keyed by step index.
    pub fn get_durations(&self) -> HashMap<usize, u128> {
        self.records()
            .into_iter()
            .map(|record| (record.index, record.duration_ms))
            .collect()
    }

    /// One record per step that reached a terminal event, in step order.
    pub fn records(&self) -> Vec<StepRecord> {
        let mut starts: HashMap<usize, Instant> = HashMap::new();
        let mut records: Vec<StepRecord> = Vec::new();

        for event in &self.events {
            if !event.event_type.is_terminal() {
                starts.insert(event.step, event.timestamp);
                continue;
            }

            if let Some(start) = starts.remove(&event.step) {
                records.push(StepRecord {
                    index: event.step,
                    name: event.step_name.clone(),
                    outcome: event.event_type,
                    duration_ms: event.timestamp.duration_since(start).as_millis(),
                });
            }
        }

        records.sort_by_key(|record| record.index);
        records
    }

    /// Builds the run report.
    pub fn report(&self, workflow_name: &str, target: &str) -> RunReport {
        RunReport {
            workflow_name: workflow_name.to_string(),
            target: target.to_string(),
            started_at: self.started_at,
            total_ms: self.elapsed().as_millis(),
            steps: self.records(),
        }
    }

    /// Plain-text summary table.
    pub fn summary(&self) -> String {
        let mut output = String::from("Execution summary:\n");

        for record in self.records() {
            output.push_str(&format!(
                "  {:>3}. {:24} {:10} ({} ms)\n",
                record.index,
                truncate(&record.name, 24),
                format!("{:?}", record.outcome),
                record.duration_ms
            ));
        }

        output.push_str(&format!("  Total: {} ms\n", self.elapsed().as_millis()));
        output
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_timeline_creation() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.events.is_empty());
        assert!(timeline.records().is_empty());
    }

    #[test]
    fn test_get_durations() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event(1, "scan", EventType::Started);
        thread::sleep(Duration::from_millis(50));
        timeline.add_event(1, "scan", EventType::Completed);

        let durations = timeline.get_durations();
        assert!(*durations.get(&1).unwrap() >= 50);
    }

    #[test]
    fn test_get_durations_only_started() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event(1, "scan", EventType::Started);

        assert!(!timeline.get_durations().contains_key(&1));
    }

    #[test]
    fn test_records_outcomes_in_step_order() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event(2, "b", EventType::Started);
        timeline.add_event(2, "b", EventType::TimedOut);
        timeline.add_event(1, "a", EventType::Started);
        timeline.add_event(1, "a", EventType::Skipped);
        timeline.add_event(3, "c", EventType::Started);
        timeline.add_event(3, "c", EventType::Failed);

        let outcomes: Vec<(usize, EventType)> = timeline
            .records()
            .into_iter()
            .map(|r| (r.index, r.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                (1, EventType::Skipped),
                (2, EventType::TimedOut),
                (3, EventType::Failed)
            ]
        );
        assert_eq!(timeline.get_events().len(), 6);
    }

    #[test]
    fn test_summary() {
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event(1, "a-very-long-step-name-that-keeps-going", EventType::Started);
        timeline.add_event(1, "a-very-long-step-name-that-keeps-going", EventType::Completed);

        let summary = timeline.summary();
        assert!(summary.contains("a-very-long-step-name..."));
        assert!(summary.contains("Completed"));
        assert!(summary.contains("Total:"));
    }

    #[test]
    fn test_report_save() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut timeline = ExecutionTimeline::new();
        timeline.add_event(1, "a", EventType::Started);
        timeline.add_event(1, "a", EventType::Completed);

        let report = timeline.report("t", "example.com");
        let path = report.save(temp_dir.path(), "abc123").unwrap();

        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("abc123-"));
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["workflow_name"], "t");
        assert_eq!(json["steps"][0]["outcome"], "completed");
    }

    #[test]
    fn test_event_type_serialization() {
        assert_eq!(
            serde_json::to_string(&EventType::TimedOut).unwrap(),
            "\"timed_out\""
        );
    }
}
