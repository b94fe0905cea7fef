//! Executable Lookup
//!
//! Resolves the program a command starts with against the system search
//! path, the way a shell would.

use std::env;
use std::path::{Path, PathBuf};

use log::debug;

/// Shell builtins and keywords that never live on the search path.
const SHELL_BUILTINS: &[&str] = &[
    "cd", "export", "source", ".", "set", "unset", "alias", "eval", "exec", "exit", "read",
    "test", "[", "[[", "echo", "printf", "true", "false", ":", "for", "while", "until", "if",
    "case", "function", "time", "ulimit", "umask", "wait", "trap", "type", "command", "!", "{",
    "(",
];

/// Returns the program name a command starts with, skipping leading
/// `NAME=value` environment assignments.
pub fn leading_program(command: &str) -> Option<&str> {
    command
        .split_whitespace()
        .find(|token| !is_env_assignment(token))
}

fn is_env_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Checks if a program name is a shell builtin or keyword.
pub fn is_shell_builtin(program: &str) -> bool {
    SHELL_BUILTINS.contains(&program)
}

/// Searches `PATH` for an executable file called `program`.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let search_path = env::var_os("PATH")?;

    env::split_paths(&search_path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
        .inspect(|found| debug!("Resolved '{}' to {}", program, found.display()))
}

/// True if the program can be started: a builtin, an existing path, or a
/// name found on the search path.
pub fn is_resolvable(program: &str) -> bool {
    if is_shell_builtin(program) {
        return true;
    }

    if program.contains('/') {
        return is_executable(Path::new(program));
    }

    find_executable(program).is_some()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
