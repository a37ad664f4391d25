//! Environment-variable overrides for the drain and force-grace windows and
//! the guarded-command directory, so an operator can tune shutdown timing
//! without rebuilding the binary.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_DIR: &str = "/etc/pidone";
pub const DEFAULT_SHUTDOWN_MS: u64 = 2000;
pub const DEFAULT_FORCE_GRACE_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub command_dir: PathBuf,
    pub shutdown: Duration,
    pub force_grace: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_env_vars(|name| std::env::var(name).ok())
    }

    fn from_env_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let command_dir = get("PIDONE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR));
        let shutdown = parse_millis("PIDONE_SHUTDOWN_MS", &get, DEFAULT_SHUTDOWN_MS)?;
        let force_grace = parse_millis("PIDONE_FORCE_GRACE_MS", &get, DEFAULT_FORCE_GRACE_MS)?;

        Ok(Self {
            command_dir,
            shutdown,
            force_grace,
        })
    }
}

fn parse_millis(
    var: &'static str,
    get: &impl Fn(&str) -> Option<String>,
    default: u64,
) -> Result<Duration> {
    match get(var) {
        None => Ok(Duration::from_millis(default)),
        Some(value) => value
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| Error::BadEnv { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::from_env_vars(|_| None).unwrap();
        assert_eq!(cfg.command_dir, PathBuf::from(DEFAULT_DIR));
        assert_eq!(cfg.shutdown, Duration::from_millis(DEFAULT_SHUTDOWN_MS));
        assert_eq!(cfg.force_grace, Duration::from_millis(DEFAULT_FORCE_GRACE_MS));
    }

    #[test]
    fn overrides_are_honored() {
        let cfg = Config::from_env_vars(|name| match name {
            "PIDONE_DIR" => Some("/tmp/commands".to_string()),
            "PIDONE_SHUTDOWN_MS" => Some("0".to_string()),
            "PIDONE_FORCE_GRACE_MS" => Some("500".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.command_dir, PathBuf::from("/tmp/commands"));
        assert_eq!(cfg.shutdown, Duration::ZERO);
        assert_eq!(cfg.force_grace, Duration::from_millis(500));
    }

    #[test]
    fn malformed_override_is_a_startup_error() {
        let err = Config::from_env_vars(|name| {
            (name == "PIDONE_SHUTDOWN_MS").then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, Error::BadEnv { var: "PIDONE_SHUTDOWN_MS", .. }));
    }
}
