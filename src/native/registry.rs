use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no registry entry at {}: {source}", path.display())]
    Missing { path: PathBuf, source: io::Error },
    #[error("registry entry at {} is not a valid pid: {content:?}", path.display())]
    Malformed { path: PathBuf, content: String },
    #[error("another daemon already owns {}", path.display())]
    AlreadyRunning { path: PathBuf },
    #[error("failed to write registry entry {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to remove registry entry {}: {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },
}

/// The on-disk pid of the running daemon. Its presence is the single-instance lock.
#[derive(Clone, Debug)]
pub struct PidRegistry {
    path: PathBuf,
}

impl PidRegistry {
    pub fn new<T: AsRef<Path>>(path: T) -> Self {
        Self {
            path: path.as_ref().into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }

    pub fn read(&self) -> Result<Pid, RegistryError> {
        let content = fs::read_to_string(&self.path).map_err(|source| RegistryError::Missing {
            path: self.path.clone(),
            source,
        })?;

        parse_pid(&content).ok_or_else(|| RegistryError::Malformed {
            path: self.path.clone(),
            content,
        })
    }

    /// Records `pid`, failing if an entry already exists.
    pub fn claim(&self, pid: Pid) -> Result<(), RegistryError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|source| match source.kind() {
                io::ErrorKind::AlreadyExists => RegistryError::AlreadyRunning {
                    path: self.path.clone(),
                },
                _ => RegistryError::Write {
                    path: self.path.clone(),
                    source,
                },
            })?;

        if let Err(source) = write!(file, "{}", pid).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&self.path);
            return Err(RegistryError::Write {
                path: self.path.clone(),
                source,
            });
        }

        Ok(())
    }

    /// Removes the entry. An entry that is already gone is not an error.
    pub fn release(&self) -> Result<(), RegistryError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RegistryError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Only positive pids are accepted: `kill` treats 0 and negatives as process groups.
fn parse_pid(content: &str) -> Option<Pid> {
    match content.trim().parse::<i32>() {
        Ok(raw) if raw > 0 => Some(Pid::from_raw(raw)),
        _ => None,
    }
}
