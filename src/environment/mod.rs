//! Environment Module
//!
//! Handles the host-side concerns of a run: where persistent files live and
//! how command executables are located.

pub mod executables;
pub mod paths;

pub use executables::{find_executable, is_resolvable, leading_program};
pub use paths::{Config, HOME_ENV_VAR};
