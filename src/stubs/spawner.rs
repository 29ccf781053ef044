use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::traits::spawner::{SpawnError, Spawner, Unit};
use crate::stubs::unit::{Gate, Journal, UnitStub};

/// Spawner whose every `spawn` waits at a gate, handing out pids from 100.
#[derive(Debug)]
pub struct GatedSpawner {
    gate: Arc<Gate>,
    journal: Journal,
    next_pid: AtomicU32,
}

impl GatedSpawner {
    pub fn new(gate: Arc<Gate>, journal: Journal) -> Self {
        Self {
            gate,
            journal,
            next_pid: AtomicU32::new(100),
        }
    }
}

#[async_trait::async_trait]
impl Spawner for GatedSpawner {
    async fn spawn(&self) -> Result<Box<dyn Unit>, SpawnError> {
        self.gate.pass().await;
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(UnitStub::new(pid).with_journal(self.journal.clone())))
    }
}
