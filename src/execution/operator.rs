//! Operator Interaction
//!
//! The [`Operator`] trait is the only source of interactive input for a run:
//! variable values during pre-flight, confirmation to continue past
//! warnings, and the signal stream observed while steps execute.
//!
//! [`TerminalOperator`] reads stdin on a dedicated thread and forwards what it
//! reads into a channel; ctrl-c is forwarded as [`OperatorSignal::Interrupt`].

use std::io::{self, BufRead, IsTerminal, Write};
use std::thread;

use log::{debug, warn};
use tokio::sync::mpsc;

/// Input observed while a step is running.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorSignal {
    /// A line typed by the operator
    Line(String),
    /// End-of-input marker (ctrl-d): skip the running step
    EndOfInput,
    /// Stop the run after checkpointing (ctrl-c)
    Interrupt,
}

pub type SignalSender = mpsc::UnboundedSender<OperatorSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<OperatorSignal>;

/// Source of interactive decisions.
pub trait Operator {
    /// Asks for the value of an undefined variable. `None` means no value.
    fn prompt_variable(&mut self, name: &str) -> io::Result<Option<String>>;

    /// Asks a yes/no question.
    fn confirm(&mut self, question: &str) -> io::Result<bool>;

    /// Starts delivering signals. Called once, right before the first step
    /// executes; no prompts happen afterwards.
    fn listen(&mut self) -> SignalReceiver;
}

/// Operator backed by the controlling terminal.
#[derive(Debug)]
pub struct TerminalOperator {
    assume_yes: bool,
    interactive: bool,
}

impl TerminalOperator {
    /// `assume_yes` answers every confirmation affirmatively.
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            interactive: io::stdin().is_terminal(),
        }
    }

    fn read_answer(&self, prompt: &str) -> io::Result<Option<String>> {
        print!("{}", prompt);
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }

        let answer = line.trim();
        Ok((!answer.is_empty()).then(|| answer.to_string()))
    }
}

impl Operator for TerminalOperator {
    fn prompt_variable(&mut self, name: &str) -> io::Result<Option<String>> {
        if !self.interactive {
            warn!("Cannot prompt for '{}': stdin is not a terminal", name);
            return Ok(None);
        }
        self.read_answer(&format!("  Enter value for {}: ", name))
    }

    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        if self.assume_yes {
            debug!("Auto-confirming: {}", question);
            return Ok(true);
        }
        if !self.interactive {
            warn!("Cannot ask for confirmation: stdin is not a terminal (use --yes)");
            return Ok(false);
        }

        let answer = self.read_answer(&format!("{} [y/N]: ", question))?;
        Ok(matches!(
            answer.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("y") | Some("yes")
        ))
    }

    fn listen(&mut self) -> SignalReceiver {
        let (tx, rx) = mpsc::unbounded_channel();

        if self.interactive {
            spawn_stdin_reader(tx.clone());
        }
        spawn_interrupt_listener(tx);

        rx
    }
}

/// Forwards stdin lines on a plain thread. A terminal keeps delivering input
/// after ctrl-d, so reading continues past end-of-input.
fn spawn_stdin_reader(tx: SignalSender) {
    let spawned = thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            loop {
                let mut line = String::new();
                let signal = match stdin.lock().read_line(&mut line) {
                    Ok(0) => OperatorSignal::EndOfInput,
                    Ok(_) => OperatorSignal::Line(line.trim_end().to_string()),
                    Err(e) => {
                        debug!("Stopped reading operator input: {}", e);
                        break;
                    }
                };
                if tx.send(signal).is_err() {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        warn!("Operator input unavailable: {}", e);
    }
}

fn spawn_interrupt_listener(tx: SignalSender) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(OperatorSignal::Interrupt).is_err() {
                break;
            }
        }
    });
}
