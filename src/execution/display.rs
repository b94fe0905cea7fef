//! Terminal Output
//!
//! Operator-facing progress lines. Diagnostics go through `log`; this module
//! only prints what the operator watches while a workflow runs.

use colored::Colorize;

use crate::{APP_NAME, VERSION};

/// Indentation for streamed step output.
const OUTPUT_INDENT: &str = "    ";

/// Disables colors when stdout is not a terminal or `NO_COLOR` is set.
pub fn configure_colors(stdout_is_terminal: bool) {
    if !stdout_is_terminal || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }
}

/// Prints the application banner with version information.
pub fn banner() {
    println!();
    println!("{} {}", APP_NAME.cyan().bold(), format!("v{}", VERSION).yellow());
    println!("{}", "Declarative Workflow Runner".dimmed());
    println!();
}

pub fn workflow_header(name: &str, target: &str, total_steps: usize) {
    println!("{} Loaded workflow: {}", tag_info(), name.bold());
    println!("{} Target: {}", tag_info(), target.bold());
    println!("{} Steps: {}", tag_info(), total_steps);
    println!();
}

pub fn step_header(index: usize, total: usize, name: &str) {
    println!(
        "{} {} {}",
        "[STEP]".green(),
        format!("[{}/{}]", index, total).magenta().bold(),
        name
    );
}

pub fn command(command: &str) {
    println!("{} {}", "[CMND]".yellow(), command.dimmed());
}

pub fn dry_run_command(index: usize, total: usize, name: &str, command: &str) {
    println!(
        "{} {} {}",
        "[DRY RUN]".cyan(),
        format!("[{}/{}]", index, total).magenta().bold(),
        name
    );
    println!("{}{}", OUTPUT_INDENT, command);
}

/// One line of step output; stderr is shown dimmed red.
pub fn output_line(line: &str, is_stderr: bool) {
    if is_stderr {
        println!("{}{}", OUTPUT_INDENT, line.red().dimmed());
    } else {
        println!("{}{}", OUTPUT_INDENT, line);
    }
}

pub fn success(message: &str) {
    println!("{} {}", "[DONE]".green().bold(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), message);
}

pub fn info(message: &str) {
    println!("{} {}", tag_info(), message);
}

fn tag_info() -> colored::ColoredString {
    "[INFO]".blue().bold()
}
