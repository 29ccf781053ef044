use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    CAPACITY_ENV, LOG_FILE, LOG_FILE_ENV, PID_FILE, PID_FILE_ENV, QUEUE_DEPTH, QUEUE_DEPTH_ENV,
    REAP_GRACE_ENV, REAP_GRACE_MS, STACK_CAPACITY, UNIT_SIZE_BYTES, UNIT_SIZE_ENV,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub unit_size_bytes: usize,
    pub capacity: usize,
    pub queue_depth: usize,
    pub reap_grace: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("cannot resolve relative path {path:?}: {source}")]
    WorkingDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pid_file: PID_FILE.into(),
            log_file: LOG_FILE.into(),
            unit_size_bytes: UNIT_SIZE_BYTES,
            capacity: STACK_CAPACITY,
            queue_depth: QUEUE_DEPTH,
            reap_grace: Duration::from_millis(REAP_GRACE_MS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable source, falling back to defaults.
    ///
    /// Paths are made absolute here, because the daemon changes its working
    /// directory to `/` once it detaches.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pid_file = lookup(PID_FILE_ENV).unwrap_or_else(|| PID_FILE.to_string());
        let log_file = lookup(LOG_FILE_ENV).unwrap_or_else(|| LOG_FILE.to_string());

        Ok(Self {
            pid_file: absolute(Path::new(&pid_file))?,
            log_file: absolute(Path::new(&log_file))?,
            unit_size_bytes: positive(&lookup, UNIT_SIZE_ENV, UNIT_SIZE_BYTES)?,
            capacity: positive(&lookup, CAPACITY_ENV, STACK_CAPACITY)?,
            queue_depth: positive(&lookup, QUEUE_DEPTH_ENV, QUEUE_DEPTH)?,
            reap_grace: Duration::from_millis(positive(&lookup, REAP_GRACE_ENV, REAP_GRACE_MS)?),
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf, ConfigError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|source| ConfigError::WorkingDir {
            path: path.to_path_buf(),
            source,
        })
}

fn positive<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Default + PartialEq,
    T::Err: Display,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };

    let value = raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        value: raw.clone(),
        reason: e.to_string(),
    })?;

    if value == T::default() {
        return Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pid_file, PathBuf::from("/tmp/memory_controller.pid"));
        assert_eq!(config.unit_size_bytes, 134_217_728);
        assert_eq!(config.capacity, 256);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            (PID_FILE_ENV, "/run/memctl.pid"),
            (LOG_FILE_ENV, "/var/log/memctl.log"),
            (UNIT_SIZE_ENV, "4194304"),
            (CAPACITY_ENV, " 3 "),
            (QUEUE_DEPTH_ENV, "16"),
            (REAP_GRACE_ENV, "250"),
        ]))
        .unwrap();

        assert_eq!(config.pid_file, PathBuf::from("/run/memctl.pid"));
        assert_eq!(config.log_file, PathBuf::from("/var/log/memctl.log"));
        assert_eq!(config.unit_size_bytes, 4 * 1024 * 1024);
        assert_eq!(config.capacity, 3);
        assert_eq!(config.queue_depth, 16);
        assert_eq!(config.reap_grace, Duration::from_millis(250));
    }

    #[test]
    fn test_relative_paths_resolved_against_cwd() {
        let config = Config::from_lookup(lookup_from(&[(PID_FILE_ENV, "memctl.pid")])).unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.pid_file, cwd.join("memctl.pid"));
        assert!(config.pid_file.is_absolute());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = Config::from_lookup(lookup_from(&[(CAPACITY_ENV, "0")]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                var: CAPACITY_ENV,
                ..
            })
        ));
    }

    #[test]
    fn test_garbage_unit_size_rejected() {
        let result = Config::from_lookup(lookup_from(&[(UNIT_SIZE_ENV, "128M")]));
        match result {
            Err(ConfigError::Invalid { var, value, .. }) => {
                assert_eq!(var, UNIT_SIZE_ENV);
                assert_eq!(value, "128M");
            }
            other => panic!("Expected Invalid error, got {:?}", other),
        }
    }
}
