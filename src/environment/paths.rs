//! Directory Layout
//!
//! All persistent files live under one base directory:
//!
//! ```text
//! ~/.steprunner/
//!   templates/   workflow templates looked up by name
//!   workflow/    user workflow definitions looked up by name
//!   logs/        steprunner.log
//!   reports/     per-run JSON reports
//!   cache/
//!   state/       checkpoint files, one per (workflow, target)
//! ```
//!
//! # Base Directory Resolution Priority
//!
//! 1. Explicit path (the `--home` flag)
//! 2. `STEPRUNNER_HOME` environment variable
//! 3. `.steprunner` in the user's home directory

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

/// Environment variable overriding the base directory.
pub const HOME_ENV_VAR: &str = "STEPRUNNER_HOME";

/// Directory name used under the user's home directory.
const DEFAULT_DIR_NAME: &str = ".steprunner";

/// File extensions tried when looking up a template by name.
const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Read-only description of the on-disk layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub base_dir: PathBuf,
    pub template_dir: PathBuf,
    pub workflow_dir: PathBuf,
    pub log_dir: PathBuf,
    pub report_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl Config {
    /// Builds the layout rooted at `base_dir`. Nothing is created yet.
    pub fn from_base(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            template_dir: base_dir.join("templates"),
            workflow_dir: base_dir.join("workflow"),
            log_dir: base_dir.join("logs"),
            report_dir: base_dir.join("reports"),
            cache_dir: base_dir.join("cache"),
            state_dir: base_dir.join("state"),
            base_dir,
        }
    }

    /// Resolves the base directory using the priority order above.
    pub fn discover(explicit: Option<&Path>) -> Self {
        if let Some(dir) = explicit {
            return Self::from_base(dir);
        }

        if let Some(dir) = env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
            return Self::from_base(PathBuf::from(dir));
        }

        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::from_base(home.join(DEFAULT_DIR_NAME))
    }

    /// Creates every directory of the layout if absent.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in self.all_dirs() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
                debug!("Created directory: {}", dir.display());
            }
        }
        Ok(())
    }

    fn all_dirs(&self) -> [&PathBuf; 7] {
        [
            &self.base_dir,
            &self.template_dir,
            &self.workflow_dir,
            &self.log_dir,
            &self.report_dir,
            &self.cache_dir,
            &self.state_dir,
        ]
    }

    /// Path of the append-only log file.
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("steprunner.log")
    }

    /// Resolves a template argument.
    ///
    /// An existing path is returned as-is. Otherwise the name is looked up in
    /// the templates directory, then the workflow directory, first verbatim
    /// and then with each known extension. When nothing matches, the original
    /// argument is returned so the loader reports it as not found.
    pub fn resolve_template(&self, name: &str) -> PathBuf {
        let direct = PathBuf::from(name);
        if direct.exists() {
            return direct;
        }

        for dir in [&self.template_dir, &self.workflow_dir] {
            let candidate = dir.join(name);
            if candidate.is_file() {
                debug!("Resolved template '{}' to {}", name, candidate.display());
                return candidate;
            }

            for ext in TEMPLATE_EXTENSIONS {
                let candidate = dir.join(format!("{}.{}", name, ext));
                if candidate.is_file() {
                    debug!("Resolved template '{}' to {}", name, candidate.display());
                    return candidate;
                }
            }
        }

        direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_layout() {
        let config = Config::from_base("/base");
        assert_eq!(config.template_dir, PathBuf::from("/base/templates"));
        assert_eq!(config.workflow_dir, PathBuf::from("/base/workflow"));
        assert_eq!(config.state_dir, PathBuf::from("/base/state"));
        assert_eq!(config.log_file(), PathBuf::from("/base/logs/steprunner.log"));
    }

    #[test]
    fn test_discover_explicit_wins() {
        let config = Config::discover(Some(Path::new("/explicit")));
        assert_eq!(config.base_dir, PathBuf::from("/explicit"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = tempdir().unwrap();
        let config = Config::from_base(temp_dir.path().join("home"));

        config.ensure_dirs().unwrap();
        for dir in config.all_dirs() {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }

        // Idempotent
        assert!(config.ensure_dirs().is_ok());
    }

    #[test]
    fn test_resolve_template_lookup() {
        let temp_dir = tempdir().unwrap();
        let config = Config::from_base(temp_dir.path());
        config.ensure_dirs().unwrap();

        fs::write(config.template_dir.join("recon.yaml"), "name: r").unwrap();
        fs::write(config.workflow_dir.join("mine.yml"), "name: m").unwrap();

        assert_eq!(
            config.resolve_template("recon"),
            config.template_dir.join("recon.yaml")
        );
        assert_eq!(
            config.resolve_template("mine"),
            config.workflow_dir.join("mine.yml")
        );
        assert_eq!(
            config.resolve_template("ghost"),
            PathBuf::from("ghost")
        );
    }

    #[test]
    fn test_resolve_template_existing_path() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("direct.yaml");
        fs::write(&file, "name: d").unwrap();

        let config = Config::from_base(temp_dir.path().join("unused"));
        let arg = file.to_str().unwrap();
        assert_eq!(config.resolve_template(arg), file);
    }
}
