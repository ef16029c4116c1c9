//! Connection settings for the login host
//!
//! Settings live in a plain text file (`~/pbsjob.dat` by default) with up to
//! three lines in fixed order: login host, remote working directory, and
//! jobscript suffix. Only the login host is required.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;

/// Default suffix for generated jobscripts.
pub const DEFAULT_SUFFIX: &str = ".jobscript";

/// Connection settings, loaded once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Login node address in `user@host` form.
    pub login_host: String,
    /// Directory on the login host where files are staged and qsub runs.
    pub work_dir: String,
    /// Suffix appended to generated jobscript files.
    pub script_suffix: String,
}

#[derive(Debug)]
pub enum ConfigError {
    NotFound(PathBuf),
    Unreadable(PathBuf, io::Error),
    Malformed(PathBuf),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::NotFound(path) => {
                write!(f, "could not open config file {}", path.display())
            }
            ConfigError::Unreadable(path, err) => {
                write!(f, "could not read config file {}: {}", path.display(), err)
            }
            ConfigError::Malformed(path) => {
                write!(f, "could not read a login host from {}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load settings from `path`.
///
/// A missing or blank working directory line falls back to
/// `default_work_dir` (text editors like to append empty lines, so blank
/// counts as absent). A missing or blank suffix line falls back to
/// [`DEFAULT_SUFFIX`]. Both fallbacks are logged.
pub fn load(path: &Path, default_work_dir: &Path) -> Result<RemoteConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let text =
        fs::read_to_string(path).map_err(|err| ConfigError::Unreadable(path.to_path_buf(), err))?;

    let mut lines = text.lines().map(str::trim);

    let login_host = match lines.next() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => return Err(ConfigError::Malformed(path.to_path_buf())),
    };

    let work_dir = match lines.next() {
        Some(dir) if !dir.is_empty() => dir.to_string(),
        _ => {
            let dir = default_work_dir.display().to_string();
            info!("No working directory specified, using {dir} instead");
            dir
        }
    };

    let script_suffix = match lines.next() {
        Some(suffix) if !suffix.is_empty() => suffix.to_string(),
        _ => {
            info!("No suffix for jobscripts given, using {DEFAULT_SUFFIX} instead");
            DEFAULT_SUFFIX.to_string()
        }
    };

    Ok(RemoteConfig { login_host, work_dir, script_suffix })
}
