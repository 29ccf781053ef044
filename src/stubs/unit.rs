use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use tokio::sync::Notify;

use crate::core::{
    domain::UnitExit,
    traits::spawner::{Unit, UnitError},
};

/// Pids in the order their units were terminated.
pub type Journal = Arc<Mutex<Vec<u32>>>;

/// Holds an operation open until the test lets it finish.
#[derive(Debug, Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Resolves once the gated operation has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Debug)]
pub struct UnitStub {
    pid: u32,
    spawned_at: DateTime<Utc>,
    alive: Arc<AtomicBool>,
    journal: Journal,
    fail_with: Option<Errno>,
    gate: Option<Arc<Gate>>,
}

/// Observes a stub after it has been boxed and handed to the stack.
#[derive(Debug, Clone)]
pub struct UnitMonitor {
    pub pid: u32,
    alive: Arc<AtomicBool>,
}

impl UnitStub {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            spawned_at: Utc::now(),
            alive: Arc::new(AtomicBool::new(true)),
            journal: Journal::default(),
            fail_with: None,
            gate: None,
        }
    }

    /// Makes `terminate` wait at `gate` before it takes effect.
    pub fn gated(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn failing(mut self, errno: Errno) -> Self {
        self.fail_with = Some(errno);
        self
    }

    pub fn monitor(&self) -> UnitMonitor {
        UnitMonitor {
            pid: self.pid,
            alive: self.alive.clone(),
        }
    }
}

impl UnitMonitor {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Simulates the unit dying without being asked to.
    pub fn crash(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Unit for UnitStub {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn spawned_at(&self) -> DateTime<Utc> {
        self.spawned_at
    }

    fn try_reap(&mut self) -> Result<Option<UnitExit>, UnitError> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(None)
        } else {
            Ok(Some(UnitExit::Exited(1)))
        }
    }

    async fn terminate(&mut self, _grace: Duration) -> Result<UnitExit, UnitError> {
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }

        if let Some(source) = self.fail_with {
            return Err(UnitError::Signal {
                pid: self.pid,
                source,
            });
        }

        if !self.alive.swap(false, Ordering::SeqCst) {
            return Ok(UnitExit::Exited(1));
        }

        if let Ok(mut journal) = self.journal.lock() {
            journal.push(self.pid);
        }
        Ok(UnitExit::Signaled(Signal::SIGTERM as i32))
    }
}
