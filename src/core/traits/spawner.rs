use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use thiserror::Error;

use crate::core::domain::UnitExit;

#[mockall::automock]
#[async_trait::async_trait]
pub trait Spawner: std::fmt::Debug + Send + Sync {
    /// Starts a new memory unit. The unit is running when this returns.
    async fn spawn(&self) -> Result<Box<dyn Unit>, SpawnError>;
}

/// Handle to one live memory unit process.
#[async_trait::async_trait]
pub trait Unit: std::fmt::Debug + Send {
    fn pid(&self) -> u32;

    fn spawned_at(&self) -> DateTime<Utc>;

    /// Reaps the unit if it has already exited, without blocking.
    fn try_reap(&mut self) -> Result<Option<UnitExit>, UnitError>;

    /// Asks the unit to exit and blocks until it has been reaped.
    ///
    /// A unit still alive after `grace` is killed outright.
    async fn terminate(&mut self, grace: Duration) -> Result<UnitExit, UnitError>;
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn memory unit: {0}")]
    Io(#[from] std::io::Error),
    #[error("memory unit exited before its pid could be read")]
    MissingPid,
}

#[derive(Debug, Error)]
pub enum UnitError {
    #[error("failed to signal unit {pid}: {source}")]
    Signal { pid: u32, source: Errno },
    #[error("failed to reap unit {pid}: {source}")]
    Reap { pid: u32, source: std::io::Error },
}
