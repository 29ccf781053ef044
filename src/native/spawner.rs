use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::time::{Duration, timeout};

use crate::constants::WORKER_ARG;
use crate::core::{
    domain::UnitExit,
    traits::spawner::{SpawnError, Spawner, Unit, UnitError},
};

/// Starts memory units by executing a program, normally this binary in worker mode.
#[derive(Clone, Debug)]
pub struct ExecSpawner {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ExecSpawner {
    pub fn new<T, I, S>(program: T, args: I) -> Self
    where
        T: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        ExecSpawner {
            program: program.as_ref().into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Re-executes the current binary as a memory unit holding `unit_size` bytes.
    pub fn memory_unit(unit_size: usize) -> std::io::Result<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program, [WORKER_ARG.to_string(), unit_size.to_string()]))
    }
}

#[async_trait::async_trait]
impl Spawner for ExecSpawner {
    async fn spawn(&self) -> Result<Box<dyn Unit>, SpawnError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id().ok_or(SpawnError::MissingPid)?;
        tracing::debug!(pid, program = %self.program.display(), "Spawned memory unit");

        Ok(Box::new(ProcessUnit {
            child,
            pid,
            spawned_at: Utc::now(),
        }))
    }
}

#[derive(Debug)]
pub struct ProcessUnit {
    child: Child,
    pid: u32,
    spawned_at: DateTime<Utc>,
}

impl ProcessUnit {
    fn reap_error(&self, source: std::io::Error) -> UnitError {
        UnitError::Reap {
            pid: self.pid,
            source,
        }
    }
}

#[async_trait::async_trait]
impl Unit for ProcessUnit {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn spawned_at(&self) -> DateTime<Utc> {
        self.spawned_at
    }

    fn try_reap(&mut self) -> Result<Option<UnitExit>, UnitError> {
        match self.child.try_wait() {
            Ok(status) => Ok(status.map(UnitExit::from)),
            Err(e) => Err(self.reap_error(e)),
        }
    }

    async fn terminate(&mut self, grace: Duration) -> Result<UnitExit, UnitError> {
        if let Some(exit) = self.try_reap()? {
            return Ok(exit);
        }

        // The child is not reaped yet, so the pid cannot have been reused.
        match kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(source) => {
                return Err(UnitError::Signal {
                    pid: self.pid,
                    source,
                });
            }
        }

        match timeout(grace, self.child.wait()).await {
            Ok(status) => status.map(UnitExit::from).map_err(|e| self.reap_error(e)),
            Err(_) => {
                tracing::warn!(
                    pid = self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Memory unit ignored SIGTERM, sending SIGKILL"
                );
                if let Err(e) = self.child.kill().await {
                    return Err(self.reap_error(e));
                }
                self.child
                    .wait()
                    .await
                    .map(UnitExit::from)
                    .map_err(|e| self.reap_error(e))
            }
        }
    }
}
