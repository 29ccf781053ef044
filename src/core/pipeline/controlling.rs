use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Notify, mpsc::Receiver, watch};

use crate::core::{
    domain::{Outcome, Request},
    stack::ProcessStack,
    traits::spawner::{SpawnError, Spawner, UnitError},
};

/// Failures after which the stack can no longer be trusted to hold only live units.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// Sole owner and writer of the process stack.
#[derive(Debug)]
pub struct Controller {
    stack: ProcessStack,
    spawner: Arc<dyn Spawner>,
    reap_grace: Duration,
}

impl Controller {
    pub fn new(spawner: Arc<dyn Spawner>, capacity: usize, reap_grace: Duration) -> Self {
        Self {
            stack: ProcessStack::new(capacity),
            spawner,
            reap_grace,
        }
    }

    pub fn stack(&self) -> &ProcessStack {
        &self.stack
    }

    /// Drains `requests` one at a time until shutdown is flagged or the queue closes.
    ///
    /// Shutdown is checked before every request, so it wins over anything still
    /// queued. A request that has already started runs to completion first.
    /// Each wakeup on `exits` drops units that died on their own while idle.
    #[tracing::instrument(skip_all)]
    pub async fn run(
        &mut self,
        mut requests: Receiver<Request>,
        mut shutdown: watch::Receiver<bool>,
        exits: Arc<Notify>,
    ) -> Result<(), ControlError> {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => {
                    tracing::info!(depth = self.stack.depth(), "Shutdown requested");
                    return Ok(());
                }
                _ = exits.notified() => {
                    self.prune();
                }
                request = requests.recv() => match request {
                    Some(request) => {
                        self.handle(request).await?;
                    }
                    None => {
                        tracing::warn!("Request queue closed, stopping");
                        return Ok(());
                    }
                },
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn handle(&mut self, request: Request) -> Result<Outcome, ControlError> {
        tracing::info!(depth = self.stack.depth(), "Handling request");
        self.prune();

        match request {
            Request::Grow => self.grow().await,
            Request::Shrink => self.shrink().await,
        }
    }

    /// Drops units that exited on their own. Returns how many were dropped.
    fn prune(&mut self) -> usize {
        let pruned = self.stack.prune_exited();
        for (pid, exit) in &pruned {
            tracing::warn!(pid, ?exit, "Memory unit exited on its own, dropped from stack");
        }
        pruned.len()
    }

    async fn grow(&mut self) -> Result<Outcome, ControlError> {
        if self.stack.is_full() {
            tracing::warn!(
                capacity = self.stack.capacity(),
                "Stack is full. Cannot add more processes"
            );
            return Ok(Outcome::Full {
                capacity: self.stack.capacity(),
            });
        }

        let unit = self.spawner.spawn().await?;
        let pid = unit.pid();

        match self.stack.push(unit) {
            Ok(depth) => {
                tracing::info!(pid, depth, "Memory unit added to the stack");
                Ok(Outcome::Pushed { pid, depth })
            }
            Err(mut unit) => {
                unit.terminate(self.reap_grace).await?;
                Ok(Outcome::Full {
                    capacity: self.stack.capacity(),
                })
            }
        }
    }

    async fn shrink(&mut self) -> Result<Outcome, ControlError> {
        let Some(unit) = self.stack.top_mut() else {
            tracing::info!("Stack is empty. No processes to kill");
            return Ok(Outcome::Empty);
        };

        let pid = unit.pid();
        let lifetime = Utc::now() - unit.spawned_at();
        let exit = unit.terminate(self.reap_grace).await?;

        // Only drop the entry once the unit is reaped.
        self.stack.pop();
        let depth = self.stack.depth();

        tracing::info!(
            pid,
            depth,
            ?exit,
            lifetime_secs = lifetime.num_seconds(),
            "Memory unit killed and removed from the stack"
        );
        Ok(Outcome::Popped { pid, depth, exit })
    }

    /// Terminates every remaining unit, top first. Returns how many were reaped.
    ///
    /// Keeps going past failures so shutdown always ends with an empty stack.
    pub async fn teardown(&mut self) -> usize {
        let mut reaped = 0;

        while let Some(unit) = self.stack.top_mut() {
            let pid = unit.pid();
            match unit.terminate(self.reap_grace).await {
                Ok(exit) => {
                    reaped += 1;
                    tracing::info!(pid, ?exit, "Memory unit terminated during shutdown");
                }
                Err(err) => tracing::error!(pid, %err, "Failed to terminate memory unit"),
            }
            self.stack.pop();
        }

        reaped
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender means the signal forwarder is gone; nobody can stop us later.
    let _ = shutdown.wait_for(|requested| *requested).await;
}
