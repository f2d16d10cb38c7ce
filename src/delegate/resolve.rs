//! Locate the delegated executable.
//!
//! Order: explicit override > next to the current executable > `PATH`.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use super::error::DelegateError;
use crate::log_debug;
use crate::utils::output::{Color, color};

/// File name of the classic CLI binary.
pub const CLI_BINARY: &str = if cfg!(windows) {
    "com.docker.cli.exe"
} else {
    "com.docker.cli"
};

/// Inputs of a lookup, captured up front so resolution is a pure function.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    pub override_path: Option<PathBuf>,
    pub current_exe: Option<PathBuf>,
    pub search_path: Option<OsString>,
    pub cwd: PathBuf,
}

impl Lookup {
    /// Capture the current process environment. `override_path` comes from
    /// the command line (`--dockerlink-cli` or `DOCKER_COM_DOCKER_CLI`).
    pub fn from_env(override_path: Option<PathBuf>) -> Self {
        Self {
            override_path,
            current_exe: std::env::current_exe().ok(),
            search_path: std::env::var_os("PATH"),
            cwd: std::env::current_dir().unwrap_or_default(),
        }
    }

    pub fn resolve(&self, binary: &str) -> Result<PathBuf, DelegateError> {
        if let Some(p) = &self.override_path
            && !p.as_os_str().is_empty()
        {
            log_debug!("using override executable {}", p.display());
            return Ok(p.clone());
        }
        if let Some(exe) = &self.current_exe
            && let Some(found) = sibling(exe, binary)
        {
            log_debug!("using sibling executable {}", found.display());
            return Ok(found);
        }
        if let Some(search) = &self.search_path
            && let Some(found) = find_in_path(search, binary, &self.cwd)
        {
            log_debug!("using executable from PATH {}", found.display());
            return Ok(found);
        }
        Err(DelegateError::NotFound {
            binary: binary.to_string(),
        })
    }

    /// Resolve or terminate the process: print the error and the search path
    /// to stderr and exit 1.
    pub fn resolve_or_exit(&self, binary: &str) -> PathBuf {
        match self.resolve(binary) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("{}", color(Color::Red, e.to_string()));
                let path = self
                    .search_path
                    .as_deref()
                    .map(OsStr::to_string_lossy)
                    .unwrap_or_default();
                eprintln!("{} {path}", color(Color::Bold, "Current PATH :"));
                std::process::exit(1);
            }
        }
    }
}

/// `binary` in the directory of `current_exe`, symlinks resolved.
pub fn sibling(current_exe: &Path, binary: &str) -> Option<PathBuf> {
    let real = std::fs::canonicalize(current_exe).ok()?;
    let candidate = real.parent()?.join(binary);
    candidate.is_file().then_some(candidate)
}

/// First executable `binary` on `search_paths`.
pub fn find_in_path(search_paths: &OsStr, binary: &str, cwd: &Path) -> Option<PathBuf> {
    which::which_in(binary, Some(search_paths), cwd).ok()
}
