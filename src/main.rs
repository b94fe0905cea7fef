//! StepRunner CLI Entry Point
//!
//! Provides the command-line interface for running workflows and managing
//! saved state.
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow against a target
//! steprunner run recon.yaml example.com
//!
//! # Preview the resolved commands
//! steprunner run recon.yaml example.com --dry-run
//!
//! # Continue an interrupted run
//! steprunner run recon.yaml example.com --resume
//!
//! # Check a template without running it
//! steprunner validate recon
//!
//! # Inspect and remove saved progress
//! steprunner list-states
//! steprunner clear-state recon example.com
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use steprunner::execution::{display, Engine, EngineOptions, RunOutcome, TerminalOperator};
use steprunner::workflow::variables::placeholder_names;
use steprunner::workflow::TARGET_VARIABLE;
use steprunner::{load_template, Config, Result, StateStore};

#[derive(Parser)]
#[command(name = "steprunner", version)]
#[command(about = "Declarative workflow runner - resumable YAML-described shell steps")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base directory (defaults to $STEPRUNNER_HOME, then ~/.steprunner)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow against a target
    Run {
        /// Template path, or a name under templates/ or workflow/
        template: String,

        /// Value injected as the TARGET variable
        target: String,

        /// Show the resolved commands without executing them
        #[arg(long)]
        dry_run: bool,

        /// Skip steps completed by a previous run
        #[arg(long)]
        resume: bool,

        /// Continue past pre-flight warnings without asking
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Validate a template without running it
    Validate {
        /// Template path, or a name under templates/ or workflow/
        template: String,
    },

    /// List saved workflow states
    ListStates,

    /// Remove the saved state for a workflow and target
    ClearState {
        /// Workflow name as declared in the template
        workflow: String,

        /// Target the workflow ran against
        target: String,
    },
}

/// Duplicates log output to stderr and, timestamped, to the log file.
struct LogTee {
    file: Option<File>,
}

impl Write for LogTee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;

        if let Some(file) = self.file.as_mut() {
            let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            if write!(file, "{} ", stamp).and_then(|()| file.write_all(buf)).is_err() {
                self.file = None;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        io::stderr().flush()
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool, config: &Config) {
    let level = if verbose { "debug" } else { "info" };

    let log_file = config.log_file();
    let opened = OpenOptions::new().create(true).append(true).open(&log_file);
    let open_error = opened.as_ref().err().map(|e| e.to_string());

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| match record.level() {
            log::Level::Warn | log::Level::Error => {
                writeln!(buf, "[{}] {}", record.level(), record.args())
            }
            _ => writeln!(buf, "{}", record.args()),
        })
        .target(env_logger::Target::Pipe(Box::new(LogTee { file: opened.ok() })))
        .init();

    if let Some(e) = open_error {
        warn!("Logging to stderr only, cannot open {}: {}", log_file.display(), e);
    }
}

async fn run_workflow(
    config: &Config,
    template: &str,
    target: &str,
    options: EngineOptions,
    assume_yes: bool,
) -> Result<bool> {
    let template_path = config.resolve_template(template);
    info!("Loading workflow: {}", template_path.display());

    if options.dry_run {
        info!("Mode: DRY RUN (commands will not execute)");
    }

    let mut engine = Engine::new(config, Box::new(TerminalOperator::new(assume_yes)));
    engine.set_options(options);

    let outcome = engine.run(&template_path, target).await?;
    if let RunOutcome::Interrupted { last_completed } = &outcome {
        info!("Exiting after interrupt (last completed step: {})", last_completed);
    }
    Ok(outcome.is_success())
}

fn validate_template(config: &Config, template: &str) -> Result<bool> {
    let template_path = config.resolve_template(template);
    let document = load_template(&template_path)?;

    display::success(&format!(
        "Template '{}' is valid: {} steps",
        document.name,
        document.len()
    ));

    for (index, step) in document.indexed_steps() {
        let undeclared: Vec<String> = placeholder_names(&step.command)
            .into_iter()
            .filter(|name| name != TARGET_VARIABLE && !document.variables.contains_key(name))
            .collect();

        if !undeclared.is_empty() {
            display::warning(&format!(
                "Step {} '{}' uses undeclared variables (prompted at run time): {}",
                index,
                step.name,
                undeclared.join(", ")
            ));
        }
    }

    Ok(true)
}

fn list_states(config: &Config) -> Result<bool> {
    let states = StateStore::new(&config.state_dir).list()?;

    if states.is_empty() {
        display::info("No saved states");
        return Ok(true);
    }

    println!(
        "{:<16}  {:<24}  {:<24}  {:>9}  {}",
        "KEY", "WORKFLOW", "TARGET", "COMPLETED", "UPDATED"
    );
    for stored in states {
        let state = stored.state;
        let failed = state
            .failed_step
            .map(|index| format!(" (failed at {})", index))
            .unwrap_or_default();

        println!(
            "{:<16}  {:<24}  {:<24}  {:>9}  {}{}",
            stored.key,
            state.workflow_name,
            state.target,
            state.completed_steps.len(),
            state.timestamp.format("%Y-%m-%d %H:%M:%S"),
            failed
        );
    }

    Ok(true)
}

fn clear_state(config: &Config, workflow: &str, target: &str) -> Result<bool> {
    if StateStore::new(&config.state_dir).clear(workflow, target)? {
        display::success(&format!(
            "Cleared state for workflow '{}' and target '{}'",
            workflow, target
        ));
    } else {
        display::info(&format!(
            "Nothing to clear for workflow '{}' and target '{}'",
            workflow, target
        ));
    }
    Ok(true)
}

async fn dispatch(command: Commands, config: &Config) -> Result<bool> {
    config.ensure_dirs()?;

    match command {
        Commands::Run {
            template,
            target,
            dry_run,
            resume,
            yes,
        } => {
            let options = EngineOptions {
                dry_run,
                resume,
                ..EngineOptions::default()
            };
            run_workflow(config, &template, &target, options, yes).await
        }
        Commands::Validate { template } => validate_template(config, &template),
        Commands::ListStates => list_states(config),
        Commands::ClearState { workflow, target } => clear_state(config, &workflow, &target),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::discover(cli.home.as_deref());
    // The log directory has to exist before the log file is opened.
    let _ = std::fs::create_dir_all(&config.log_dir);
    setup_logging(cli.verbose, &config);

    display::configure_colors(io::stdout().is_terminal());
    display::banner();

    match dispatch(cli.command, &config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("[{}] {}", e.label(), e);
            if e.is_validation() {
                info!("No steps were executed");
            }
            ExitCode::FAILURE
        }
    }
}
