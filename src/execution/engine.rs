//! Workflow Execution Engine
//!
//! Orchestrates a single run of a workflow against a target:
//! - Loads prior progress when resuming
//! - Pre-flight validation, prompting for undefined variables
//! - Strictly sequential step execution
//! - A checkpoint after every step that advances the run
//! - Summary and JSON report at the end
//!
//! Expected terminations (dry run, declined confirmation, operator
//! interrupt) are reported as a [`RunOutcome`]; everything else that stops a
//! run is a [`RunnerError`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};

use crate::environment::Config;
use crate::error::{Result, RunnerError};
use crate::monitoring::{EventType, ExecutionTimeline};
use crate::workflow::{
    load_template, preflight, resolve, ExecutionState, StateStore, StepSpec, VariableSet,
    WorkflowDocument,
};

use super::display;
use super::operator::{Operator, OperatorSignal, SignalReceiver};
use super::step::{StepExecutor, StepOutcome, DEFAULT_DRAIN_TIMEOUT, DEFAULT_GRACE_PERIOD};

/// Tunables for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Show resolved commands without running anything
    pub dry_run: bool,
    /// Continue from saved progress for the same workflow and target
    pub resume: bool,
    /// Time a terminated step gets before it is killed
    pub grace_period: Duration,
    /// Time to keep printing output after a step's process is gone
    pub drain_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            resume: false,
            grace_period: DEFAULT_GRACE_PERIOD,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Step counts for a run that reached the end of the workflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Steps that exited zero in this run
    pub completed: usize,
    /// Steps skipped because a previous run completed them
    pub previously_completed: usize,
    /// Steps terminated on operator request
    pub skipped: Vec<usize>,
    /// Steps that failed but were allowed to
    pub failed: Vec<usize>,
    /// Steps that exceeded their timeout
    pub timed_out: Vec<usize>,
}

/// How a run ended, when it did not end in an error.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every step was processed
    Completed(RunSummary),
    /// Commands were displayed only
    DryRun,
    /// The operator refused to continue after pre-flight warnings
    Declined,
    /// The operator stopped the run; progress up to `last_completed` is saved
    Interrupted { last_completed: usize },
}

impl RunOutcome {
    /// True for outcomes the CLI reports with exit code 0.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Declined)
    }
}

/// Workflow execution engine.
///
/// # Example
///
/// ```rust,no_run
/// use steprunner::environment::Config;
/// use steprunner::execution::{Engine, TerminalOperator};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::discover(None);
///     config.ensure_dirs()?;
///
///     let mut engine = Engine::new(&config, Box::new(TerminalOperator::new(false)));
///     engine.set_resume(true);
///
///     let outcome = engine.run("recon.yaml", "example.com").await?;
///     println!("{:?}", outcome);
///     Ok(())
/// }
/// ```
pub struct Engine {
    store: StateStore,
    report_dir: PathBuf,
    operator: Box<dyn Operator>,
    options: EngineOptions,
}

impl Engine {
    /// Creates an engine using the state and report directories of `config`.
    pub fn new(config: &Config, operator: Box<dyn Operator>) -> Self {
        Self {
            store: StateStore::new(&config.state_dir),
            report_dir: config.report_dir.clone(),
            operator,
            options: EngineOptions::default(),
        }
    }

    pub fn set_options(&mut self, options: EngineOptions) {
        self.options = options;
    }

    /// Enables or disables dry run mode.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.options.dry_run = dry_run;
    }

    /// Enables or disables resuming from saved state.
    pub fn set_resume(&mut self, resume: bool) {
        self.options.resume = resume;
    }

    pub fn set_grace_period(&mut self, grace_period: Duration) {
        self.options.grace_period = grace_period;
    }

    pub fn set_drain_timeout(&mut self, drain_timeout: Duration) {
        self.options.drain_timeout = drain_timeout;
    }

    /// Loads the template at `template_path` and runs it against `target`.
    ///
    /// # Returns
    ///
    /// * `Ok(RunOutcome)` - The run ended normally or on operator request
    /// * `Err` - Loading, validation or a non-recoverable step failed
    pub async fn run(&mut self, template_path: impl AsRef<Path>, target: &str) -> Result<RunOutcome> {
        let template_path = template_path.as_ref();
        let document = load_template(template_path)?;

        let canonical = fs::canonicalize(template_path).unwrap_or_else(|_| template_path.to_path_buf());
        self.execute(&document, &canonical.display().to_string(), target)
            .await
    }

    /// Runs an already-loaded document. `template_path` identifies the
    /// template in saved state.
    pub async fn execute(
        &mut self,
        document: &WorkflowDocument,
        template_path: &str,
        target: &str,
    ) -> Result<RunOutcome> {
        display::workflow_header(&document.name, target, document.len());
        if let Some(description) = &document.description {
            display::info(description);
        }

        if self.options.dry_run {
            if self.options.resume {
                warn!("--resume is ignored in dry run mode");
            }
            return Ok(self.dry_run(document, target));
        }

        let mut state = self.initial_state(document, template_path, target);

        let pending: Vec<&StepSpec> = document
            .indexed_steps()
            .filter(|(index, _)| !state.is_completed(*index))
            .map(|(_, step)| step)
            .collect();

        if pending.is_empty() {
            info!("All {} steps already completed", document.len());
        } else if !self.validate_pending(&pending, &mut state.variables)? {
            display::warning("Execution aborted by operator");
            return Ok(RunOutcome::Declined);
        }

        let mut signals = self.operator.listen();
        self.run_steps(document, &mut state, &mut signals).await
    }

    /// Fresh state, or the saved one when resuming and it matches.
    fn initial_state(
        &self,
        document: &WorkflowDocument,
        template_path: &str,
        target: &str,
    ) -> ExecutionState {
        if self.options.resume {
            if let Some(state) = self.store.load(&document.name, target, template_path) {
                display::info(&format!(
                    "Resuming: {} of {} steps already completed",
                    state.completed_steps.len(),
                    document.len()
                ));
                return state;
            }
        }

        ExecutionState::new(
            &document.name,
            template_path,
            target,
            VariableSet::from_document(document, target),
        )
    }

    /// Pre-flight over the pending steps.
    ///
    /// Undefined variables are prompted for once, then the checks re-run.
    /// Returns false if the operator declined to continue past path or
    /// executable warnings.
    fn validate_pending(&mut self, steps: &[&StepSpec], vars: &mut VariableSet) -> Result<bool> {
        let mut report = preflight(steps.iter().copied(), vars);

        if !report.undefined_vars.is_empty() {
            display::warning(&format!(
                "Undefined variables: {}",
                report.undefined_vars.iter().cloned().collect::<Vec<_>>().join(", ")
            ));

            for name in &report.undefined_vars {
                if let Some(value) = self.operator.prompt_variable(name)? {
                    debug!("Operator supplied a value for '{}'", name);
                    vars.insert(name.as_str(), value);
                }
            }

            report = preflight(steps.iter().copied(), vars);
            if !report.undefined_vars.is_empty() {
                return Err(RunnerError::UndefinedVariable(
                    report.undefined_vars.into_iter().collect(),
                ));
            }
        }

        if !report.needs_confirmation() {
            return Ok(true);
        }

        for issue in report.warnings() {
            warn!("{}", issue);
            display::warning(&format!("[{}] {}", issue.label(), issue));
        }

        Ok(self.operator.confirm("Pre-flight found issues. Continue anyway?")?)
    }

    async fn run_steps(
        &mut self,
        document: &WorkflowDocument,
        state: &mut ExecutionState,
        signals: &mut SignalReceiver,
    ) -> Result<RunOutcome> {
        let mut executor = StepExecutor::new();
        executor.set_grace_period(self.options.grace_period);
        executor.set_drain_timeout(self.options.drain_timeout);

        let total = document.len();
        let mut timeline = ExecutionTimeline::new();
        let mut summary = RunSummary::default();

        info!(
            "Starting execution of '{}' against '{}'",
            document.name, state.target
        );

        for (index, step) in document.indexed_steps() {
            if state.is_completed(index) {
                debug!("Step {} '{}' already completed", index, step.name);
                summary.previously_completed += 1;
                continue;
            }

            if interrupt_pending(signals) {
                return Ok(self.interrupted(document, state, &timeline));
            }

            display::step_header(index, total, &step.name);

            let command = match resolve(&step.name, &step.command, &state.variables) {
                Ok(command) => command,
                Err(e) => {
                    state.mark_failed(index);
                    self.checkpoint(state);
                    self.finish(document, state, &timeline);
                    return Err(e);
                }
            };

            display::command(&command);
            timeline.add_event(index, &step.name, EventType::Started);

            let outcome = match executor.execute(step, &command, signals).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    timeline.add_event(index, &step.name, EventType::Failed);
                    state.mark_failed(index);
                    self.checkpoint(state);
                    self.finish(document, state, &timeline);
                    return Err(e);
                }
            };

            match outcome {
                StepOutcome::Completed => {
                    timeline.add_event(index, &step.name, EventType::Completed);
                    state.mark_completed(index);
                    self.checkpoint(state);
                    summary.completed += 1;
                    display::success(&format!("Step '{}' completed", step.name));
                }
                StepOutcome::Skipped => {
                    timeline.add_event(index, &step.name, EventType::Skipped);
                    state.mark_completed(index);
                    self.checkpoint(state);
                    summary.skipped.push(index);
                    info!("Step {} '{}' skipped by operator", index, step.name);
                    display::warning(&format!("Step '{}' skipped", step.name));
                }
                StepOutcome::TimedOut => {
                    timeline.add_event(index, &step.name, EventType::TimedOut);
                    summary.timed_out.push(index);
                    display::warning(&format!(
                        "Step '{}' timed out and was not recorded as completed",
                        step.name
                    ));
                }
                StepOutcome::Interrupted => {
                    timeline.add_event(index, &step.name, EventType::Interrupted);
                    return Ok(self.interrupted(document, state, &timeline));
                }
                StepOutcome::Failed { code, stderr_tail } => {
                    timeline.add_event(index, &step.name, EventType::Failed);
                    state.mark_failed(index);
                    self.checkpoint(state);

                    let failure = RunnerError::StepFailure {
                        index,
                        step: step.name.clone(),
                        code,
                        cause: failure_cause(code, &stderr_tail),
                    };

                    if step.continue_on_error {
                        warn!("{} (continuing)", failure);
                        display::warning(&failure.to_string());
                        summary.failed.push(index);
                        continue;
                    }

                    self.finish(document, state, &timeline);
                    return Err(failure);
                }
            }
        }

        self.finish(document, state, &timeline);
        display::success(&format!(
            "Workflow '{}' finished: {} completed, {} previously completed, {} skipped, {} failed, {} timed out",
            document.name,
            summary.completed,
            summary.previously_completed,
            summary.skipped.len(),
            summary.failed.len(),
            summary.timed_out.len()
        ));
        Ok(RunOutcome::Completed(summary))
    }

    fn dry_run(&self, document: &WorkflowDocument, target: &str) -> RunOutcome {
        let vars = VariableSet::from_document(document, target);
        let report = preflight(&document.steps, &vars);

        if !report.undefined_vars.is_empty() {
            display::warning(&format!(
                "Undefined variables: {}",
                report.undefined_vars.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        for issue in report.warnings() {
            display::warning(&format!("[{}] {}", issue.label(), issue));
        }

        let total = document.len();
        for (index, step) in document.indexed_steps() {
            match resolve(&step.name, &step.command, &vars) {
                Ok(command) => display::dry_run_command(index, total, &step.name, &command),
                Err(e) => {
                    display::dry_run_command(index, total, &step.name, &step.command);
                    display::warning(&format!("[{}] {}", e.label(), e));
                }
            }
        }

        display::info("Dry run complete, nothing was executed");
        RunOutcome::DryRun
    }

    fn interrupted(
        &self,
        document: &WorkflowDocument,
        state: &ExecutionState,
        timeline: &ExecutionTimeline,
    ) -> RunOutcome {
        info!("Run interrupted by operator");
        self.checkpoint(state);
        self.finish(document, state, timeline);

        let last_completed = state.last_completed();
        display::warning(&format!(
            "Interrupted; progress saved (last completed step: {}). Use --resume to continue.",
            last_completed
        ));
        RunOutcome::Interrupted { last_completed }
    }

    /// Saves state. A failed save is reported and the run goes on.
    fn checkpoint(&self, state: &ExecutionState) {
        if let Err(e) = self.store.save(state) {
            warn!("Failed to save state: {}", e);
            display::warning(&format!("[{}] {}", e.label(), e));
        }
    }

    /// Prints the summary and writes the run report.
    fn finish(&self, document: &WorkflowDocument, state: &ExecutionState, timeline: &ExecutionTimeline) {
        println!();
        println!("{}", timeline.summary());

        let report = timeline.report(&document.name, &state.target);
        match report.save(&self.report_dir, &state.key()) {
            Ok(path) => info!("Run report written to {}", path.display()),
            Err(e) => warn!("Failed to write run report: {}", e),
        }
    }
}

/// Drains signals that arrived between steps. Only an interrupt matters here.
fn interrupt_pending(signals: &mut SignalReceiver) -> bool {
    while let Ok(signal) = signals.try_recv() {
        match signal {
            OperatorSignal::Interrupt => return true,
            other => debug!("Ignoring operator input between steps: {:?}", other),
        }
    }
    false
}

fn failure_cause(code: Option<i32>, stderr_tail: &[String]) -> String {
    match stderr_tail.iter().rev().find(|line| !line.trim().is_empty()) {
        Some(line) => line.clone(),
        None if code.is_none() => "terminated by a signal".to_string(),
        None => "exited with a non-zero status".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::operator::SignalSender;
    use crate::workflow::compute_key;
    use std::collections::{BTreeSet, VecDeque};
    use std::io;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::mpsc;

    /// Operator with canned answers and a test-controlled signal channel.
    struct ScriptedOperator {
        answers: VecDeque<Option<String>>,
        confirm: bool,
        prompted: Vec<String>,
        signals: Option<SignalReceiver>,
    }

    impl ScriptedOperator {
        fn new() -> Self {
            Self {
                answers: VecDeque::new(),
                confirm: true,
                prompted: Vec::new(),
                signals: None,
            }
        }

        fn answering(mut self, answer: Option<&str>) -> Self {
            self.answers.push_back(answer.map(str::to_string));
            self
        }

        fn declining(mut self) -> Self {
            self.confirm = false;
            self
        }

        fn with_signals(mut self) -> (Self, SignalSender) {
            let (tx, rx) = mpsc::unbounded_channel();
            self.signals = Some(rx);
            (self, tx)
        }
    }

    impl Operator for ScriptedOperator {
        fn prompt_variable(&mut self, name: &str) -> io::Result<Option<String>> {
            self.prompted.push(name.to_string());
            Ok(self.answers.pop_front().flatten())
        }

        fn confirm(&mut self, _question: &str) -> io::Result<bool> {
            Ok(self.confirm)
        }

        fn listen(&mut self) -> SignalReceiver {
            self.signals
                .take()
                .unwrap_or_else(|| mpsc::unbounded_channel().1)
        }
    }

    fn setup() -> (TempDir, Config) {
        let dir = tempdir().unwrap();
        let config = Config::from_base(dir.path());
        config.ensure_dirs().unwrap();
        (dir, config)
    }

    fn engine(config: &Config, operator: ScriptedOperator) -> Engine {
        let mut engine = Engine::new(config, Box::new(operator));
        engine.set_grace_period(Duration::from_millis(500));
        engine.set_drain_timeout(Duration::from_millis(500));
        engine
    }

    fn write_template(dir: &Path, name: &str, yaml: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, yaml).unwrap();
        path
    }

    fn saved_state(config: &Config, workflow: &str, target: &str) -> Option<ExecutionState> {
        let path = config.state_dir.join(format!("{}.json", compute_key(workflow, target)));
        fs::read_to_string(path)
            .ok()
            .map(|json| serde_json::from_str(&json).unwrap())
    }

    /// Sends `signal` once `marker` exists.
    fn signal_when_created(tx: SignalSender, marker: PathBuf, signal: OperatorSignal) {
        tokio::spawn(async move {
            while !marker.exists() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            let _ = tx.send(signal);
        });
    }

    fn set(indices: &[usize]) -> BTreeSet<usize> {
        indices.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_echo_target() {
        let (dir, config) = setup();
        let out = dir.path().join("out.txt");
        let template = write_template(
            dir.path(),
            "t.yaml",
            &format!(
                "name: t\nsteps:\n  - name: s1\n    command: \"echo {{{{ TARGET }}}} > {}\"\n",
                out.display()
            ),
        );

        let outcome = engine(&config, ScriptedOperator::new())
            .run(&template, "example.com")
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "example.com");

        let state = saved_state(&config, "t", "example.com").unwrap();
        assert_eq!(state.completed_steps, set(&[1]));
        assert_eq!(fs::read_dir(&config.report_dir).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_full_run_completes_every_step() {
        let (_dir, config) = setup();
        let document = WorkflowDocument::new("full")
            .with_step(StepSpec::new("a", "true"))
            .with_step(StepSpec::new("b", "echo b"))
            .with_step(StepSpec::new("c", "echo c >&2"));

        let outcome = engine(&config, ScriptedOperator::new())
            .execute(&document, "full.yaml", "host")
            .await
            .unwrap();

        match outcome {
            RunOutcome::Completed(summary) => assert_eq!(summary.completed, 3),
            other => panic!("unexpected outcome: {:?}", other),
        }
        let state = saved_state(&config, "full", "host").unwrap();
        assert_eq!(state.completed_steps, set(&[1, 2, 3]));
        assert_eq!(state.failed_step, None);
    }

    #[tokio::test]
    async fn test_continue_on_error() {
        let (_dir, config) = setup();
        let document = WorkflowDocument::new("cont")
            .with_step(StepSpec::new("a", "true"))
            .with_step(StepSpec::new("b", "exit 1").allow_failure())
            .with_step(StepSpec::new("c", "true"));

        let outcome = engine(&config, ScriptedOperator::new())
            .execute(&document, "cont.yaml", "host")
            .await
            .unwrap();

        match outcome {
            RunOutcome::Completed(summary) => {
                assert_eq!(summary.completed, 2);
                assert_eq!(summary.failed, vec![2]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let state = saved_state(&config, "cont", "host").unwrap();
        assert_eq!(state.completed_steps, set(&[1, 3]));
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_steps() {
        let (dir, config) = setup();
        let marker = dir.path().join("never");
        let document = WorkflowDocument::new("abort")
            .with_step(StepSpec::new("a", "true"))
            .with_step(StepSpec::new("b", "echo broken >&2; exit 2"))
            .with_step(StepSpec::new("c", format!("touch {}", marker.display())));

        let err = engine(&config, ScriptedOperator::new())
            .execute(&document, "abort.yaml", "host")
            .await
            .unwrap_err();

        match err {
            RunnerError::StepFailure { index, code, cause, .. } => {
                assert_eq!(index, 2);
                assert_eq!(code, Some(2));
                assert_eq!(cause, "broken");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!marker.exists());

        let state = saved_state(&config, "abort", "host").unwrap();
        assert_eq!(state.completed_steps, set(&[1]));
        assert_eq!(state.failed_step, Some(2));
    }

    #[tokio::test]
    async fn test_resume_skips_completed_steps() {
        let (dir, config) = setup();
        let counter = dir.path().join("count");
        let flag = dir.path().join("ok");
        let document = WorkflowDocument::new("resume")
            .with_step(StepSpec::new("count", format!("echo x >> {}", counter.display())))
            .with_step(StepSpec::new("gate", format!("test -f {}", flag.display())));

        let err = engine(&config, ScriptedOperator::new())
            .execute(&document, "resume.yaml", "host")
            .await;
        assert!(err.is_err());

        fs::write(&flag, "").unwrap();
        let mut resumed = engine(&config, ScriptedOperator::new());
        resumed.set_resume(true);
        let outcome = resumed
            .execute(&document, "resume.yaml", "host")
            .await
            .unwrap();

        match outcome {
            RunOutcome::Completed(summary) => {
                assert_eq!(summary.previously_completed, 1);
                assert_eq!(summary.completed, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 1);
        let state = saved_state(&config, "resume", "host").unwrap();
        assert_eq!(state.completed_steps, set(&[1, 2]));
    }

    #[tokio::test]
    async fn test_resume_uses_saved_variables() {
        let (dir, config) = setup();
        let out = dir.path().join("out");
        let document = WorkflowDocument::new("vars")
            .with_step(StepSpec::new("a", "true"))
            .with_step(StepSpec::new("b", format!("echo {{{{ PORT }}}} > {}", out.display())));

        let mut state = ExecutionState::new(
            "vars",
            "vars.yaml",
            "host",
            [("TARGET", "host"), ("PORT", "8443")].into_iter().collect(),
        );
        state.mark_completed(1);
        StateStore::new(&config.state_dir).save(&state).unwrap();

        let mut resumed = engine(&config, ScriptedOperator::new());
        resumed.set_resume(true);
        resumed.execute(&document, "vars.yaml", "host").await.unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "8443");
    }

    #[tokio::test]
    async fn test_resume_template_mismatch_restarts() {
        let (dir, config) = setup();
        let counter = dir.path().join("count");
        let document = WorkflowDocument::new("mismatch")
            .with_step(StepSpec::new("count", format!("echo x >> {}", counter.display())));

        engine(&config, ScriptedOperator::new())
            .execute(&document, "first.yaml", "host")
            .await
            .unwrap();

        let mut resumed = engine(&config, ScriptedOperator::new());
        resumed.set_resume(true);
        resumed
            .execute(&document, "second.yaml", "host")
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 2);
        let state = saved_state(&config, "mismatch", "host").unwrap();
        assert_eq!(state.template_path, "second.yaml");
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let (dir, config) = setup();
        let marker = dir.path().join("marker");
        let document = WorkflowDocument::new("dry")
            .with_step(StepSpec::new("a", format!("touch {}", marker.display())))
            .with_step(StepSpec::new("b", "echo {{ UNSET }}"));

        let mut engine = engine(&config, ScriptedOperator::new());
        engine.set_dry_run(true);
        engine.set_resume(true);
        let outcome = engine.execute(&document, "dry.yaml", "host").await.unwrap();

        assert_eq!(outcome, RunOutcome::DryRun);
        assert!(!marker.exists());
        assert!(saved_state(&config, "dry", "host").is_none());
        assert_eq!(fs::read_dir(&config.report_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_prompted_variable_is_used_and_saved() {
        let (dir, config) = setup();
        let out = dir.path().join("out");
        let document = WorkflowDocument::new("prompt")
            .with_step(StepSpec::new("a", format!("echo {{{{ PORT }}}} > {}", out.display())));

        let operator = ScriptedOperator::new().answering(Some("8080"));
        engine(&config, operator)
            .execute(&document, "prompt.yaml", "host")
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "8080");
        let state = saved_state(&config, "prompt", "host").unwrap();
        assert_eq!(state.variables.get("PORT"), Some("8080"));
    }

    #[tokio::test]
    async fn test_unanswered_variable_is_fatal() {
        let (dir, config) = setup();
        let marker = dir.path().join("marker");
        let document = WorkflowDocument::new("undef")
            .with_step(StepSpec::new("a", format!("touch {}", marker.display())))
            .with_step(StepSpec::new("b", "echo {{ MISSING }}"));

        let operator = ScriptedOperator::new().answering(None);
        let err = engine(&config, operator)
            .execute(&document, "undef.yaml", "host")
            .await
            .unwrap_err();

        match err {
            RunnerError::UndefinedVariable(names) => assert_eq!(names, vec!["MISSING"]),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!marker.exists());
        assert!(saved_state(&config, "undef", "host").is_none());
    }

    #[tokio::test]
    async fn test_declined_confirmation() {
        let (_dir, config) = setup();
        let document = WorkflowDocument::new("declined")
            .with_step(StepSpec::new("a", "cat /definitely/not/here"));

        let outcome = engine(&config, ScriptedOperator::new().declining())
            .execute(&document, "declined.yaml", "host")
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Declined);
        assert!(!outcome.is_success());
        assert!(saved_state(&config, "declined", "host").is_none());
    }

    #[tokio::test]
    async fn test_end_of_input_skips_running_step() {
        let (dir, config) = setup();
        let started = dir.path().join("started");
        let after = dir.path().join("after");
        let document = WorkflowDocument::new("skip")
            .with_step(StepSpec::new("a", "true"))
            .with_step(StepSpec::new("long", format!("touch {}; sleep 30", started.display())))
            .with_step(StepSpec::new("c", format!("touch {}", after.display())));

        let (operator, tx) = ScriptedOperator::new().with_signals();
        signal_when_created(tx, started, OperatorSignal::EndOfInput);

        let outcome = engine(&config, operator)
            .execute(&document, "skip.yaml", "host")
            .await
            .unwrap();

        match outcome {
            RunOutcome::Completed(summary) => assert_eq!(summary.skipped, vec![2]),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(after.exists());
        let state = saved_state(&config, "skip", "host").unwrap();
        assert_eq!(state.completed_steps, set(&[1, 2, 3]));
    }

    #[tokio::test]
    async fn test_interrupt_checkpoints_and_stops() {
        let (dir, config) = setup();
        let started = dir.path().join("started");
        let after = dir.path().join("after");
        let document = WorkflowDocument::new("interrupt")
            .with_step(StepSpec::new("a", "true"))
            .with_step(StepSpec::new("long", format!("touch {}; sleep 30", started.display())))
            .with_step(StepSpec::new("c", format!("touch {}", after.display())));

        let (operator, tx) = ScriptedOperator::new().with_signals();
        signal_when_created(tx, started, OperatorSignal::Interrupt);

        let outcome = engine(&config, operator)
            .execute(&document, "interrupt.yaml", "host")
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Interrupted { last_completed: 1 });
        assert!(outcome.is_success());
        assert!(!after.exists());
        let state = saved_state(&config, "interrupt", "host").unwrap();
        assert_eq!(state.completed_steps, set(&[1]));
    }

    #[tokio::test]
    async fn test_interrupt_between_steps_runs_nothing_further() {
        let (dir, config) = setup();
        let second = dir.path().join("second");
        let third = dir.path().join("third");
        let document = WorkflowDocument::new("between")
            .with_step(StepSpec::new("a", "true"))
            .with_step(StepSpec::new("b", format!("touch {}", second.display())))
            .with_step(StepSpec::new("c", format!("touch {}", third.display())));

        let mut state = ExecutionState::new(
            "between",
            "between.yaml",
            "host",
            [("TARGET", "host")].into_iter().collect(),
        );
        state.mark_completed(1);
        StateStore::new(&config.state_dir).save(&state).unwrap();

        let (operator, tx) = ScriptedOperator::new().with_signals();
        tx.send(OperatorSignal::Line("ignored".to_string())).unwrap();
        tx.send(OperatorSignal::Interrupt).unwrap();

        let mut resumed = engine(&config, operator);
        resumed.set_resume(true);
        let outcome = resumed
            .execute(&document, "between.yaml", "host")
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Interrupted { last_completed: 1 });
        assert!(!second.exists());
        assert!(!third.exists());
        let state = saved_state(&config, "between", "host").unwrap();
        assert_eq!(state.completed_steps, set(&[1]));
    }

    #[tokio::test]
    async fn test_timeout_does_not_complete_step() {
        let (_dir, config) = setup();
        let document = WorkflowDocument::new("timeout")
            .with_step(StepSpec::new("slow", "sleep 30").with_timeout(0.3))
            .with_step(StepSpec::new("b", "true"));

        let outcome = engine(&config, ScriptedOperator::new())
            .execute(&document, "timeout.yaml", "host")
            .await
            .unwrap();

        match outcome {
            RunOutcome::Completed(summary) => {
                assert_eq!(summary.timed_out, vec![1]);
                assert_eq!(summary.completed, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let state = saved_state(&config, "timeout", "host").unwrap();
        assert_eq!(state.completed_steps, set(&[2]));
    }

    #[tokio::test]
    async fn test_stray_marker_aborts_regardless_of_continue_on_error() {
        let (_dir, config) = setup();
        let document = WorkflowDocument::new("stray")
            .with_step(StepSpec::new("a", "echo }}").allow_failure())
            .with_step(StepSpec::new("b", "true"));

        let err = engine(&config, ScriptedOperator::new())
            .execute(&document, "stray.yaml", "host")
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::IncompleteSubstitution { .. }));
        let state = saved_state(&config, "stray", "host").unwrap();
        assert!(state.completed_steps.is_empty());
        assert_eq!(state.failed_step, Some(1));
    }

    #[tokio::test]
    async fn test_run_missing_template() {
        let (dir, config) = setup();
        let err = engine(&config, ScriptedOperator::new())
            .run(dir.path().join("nope.yaml"), "host")
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::NotFound(_)));
    }

    #[test]
    fn test_failure_cause() {
        assert_eq!(failure_cause(Some(1), &["a".into(), "b".into(), "".into()]), "b");
        assert_eq!(failure_cause(None, &[]), "terminated by a signal");
        assert_eq!(failure_cause(Some(3), &[]), "exited with a non-zero status");
    }
}
