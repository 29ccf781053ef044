use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd};
use std::process::ExitCode;
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::signal::SigSet;
use nix::sys::stat::{Mode, umask};
use nix::unistd::{ForkResult, Pid, dup2, fork, pipe, setsid};
use thiserror::Error;
use tokio::sync::{Notify, mpsc, watch};

use crate::{
    config::Config,
    constants::READY_BYTE,
    core::pipeline::controlling::{ControlError, Controller},
    native::{
        registry::{PidRegistry, RegistryError},
        signals::{self, SignalForwarder},
        spawner::ExecSpawner,
    },
};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to detach ({step}): {source}")]
    Detach { step: &'static str, source: io::Error },
    #[error("failed to block control signals: {0}")]
    SignalMask(Errno),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to set up the controller: {0}")]
    Setup(io::Error),
    #[error(transparent)]
    Control(#[from] ControlError),
}

/// Launches the daemon and returns the launcher's exit code.
///
/// The launcher stays in the foreground only until the detached daemon reports
/// that it owns the registry and is capturing signals.
pub fn start(config: &Config) -> ExitCode {
    println!("Starting daemon...");

    let (ready_rx, ready_tx) = match pipe() {
        Ok(ends) => ends,
        Err(err) => {
            tracing::error!(%err, "Failed to create readiness pipe");
            eprintln!("memctl: failed to start daemon: {}", err);
            return ExitCode::FAILURE;
        }
    };

    // SAFETY: the process is still single-threaded here, so the child may keep
    // running arbitrary code after the fork.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            drop(ready_tx);
            await_readiness(ready_rx, child, config)
        }
        Ok(ForkResult::Child) => {
            drop(ready_rx);
            run_detached(config, ready_tx)
        }
        Err(err) => {
            tracing::error!(%err, "Failed fork");
            eprintln!("memctl: failed to start daemon: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn await_readiness(ready: OwnedFd, daemon: Pid, config: &Config) -> ExitCode {
    let span = tracing::info_span!("launcher", pid = std::process::id());
    let _entered = span.enter();

    let mut byte = [0u8; 1];
    match File::from(ready).read_exact(&mut byte) {
        Ok(()) if byte[0] == READY_BYTE => {
            tracing::info!(%daemon, "Daemon reported ready");
            println!("Daemon started (pid {})", daemon);
            ExitCode::SUCCESS
        }
        result => {
            tracing::error!(%daemon, ?result, "Daemon exited before becoming ready");
            eprintln!(
                "memctl: daemon failed to start, see {}",
                config.log_file.display()
            );
            ExitCode::FAILURE
        }
    }
}

fn run_detached(config: &Config, ready: OwnedFd) -> ExitCode {
    let span = tracing::info_span!("daemon", pid = std::process::id());
    let _entered = span.enter();

    if let Err(err) = detach() {
        tracing::error!(%err, "Startup failed");
        return ExitCode::FAILURE;
    }

    let blocked = match signals::block_control_signals() {
        Ok(blocked) => blocked,
        Err(err) => {
            tracing::error!(err = %DaemonError::SignalMask(err), "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let registry = PidRegistry::new(&config.pid_file);
    if let Err(err) = registry.claim(Pid::this()) {
        tracing::error!(%err, "Startup failed");
        return ExitCode::FAILURE;
    }
    tracing::info!(registry = %registry.path().display(), "Daemon registered");

    let result = serve(config, blocked, ready);
    shutdown(&registry, result)
}

/// The one exit path for a daemon that owns the registry.
fn shutdown(registry: &PidRegistry, result: Result<(), DaemonError>) -> ExitCode {
    if let Err(err) = registry.release() {
        tracing::error!(%err, "Failed to remove registry entry");
    }

    match result {
        Ok(()) => {
            tracing::info!("Daemon stopped");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "Daemon stopped after a fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Runs the controller until shutdown, then tears the stack down whatever the cause.
fn serve(config: &Config, blocked: SigSet, ready: OwnedFd) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(DaemonError::Setup)?;

    runtime.block_on(async {
        let (request_tx, request_rx) = mpsc::channel(config.queue_depth);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        SignalForwarder::new(request_tx, shutdown_tx)
            .spawn(blocked)
            .map_err(DaemonError::Setup)?;

        let exits = Arc::new(Notify::new());
        signals::watch_child_exits(exits.clone()).map_err(DaemonError::Setup)?;

        let spawner = ExecSpawner::memory_unit(config.unit_size_bytes).map_err(DaemonError::Setup)?;
        let mut controller = Controller::new(Arc::new(spawner), config.capacity, config.reap_grace);

        report_ready(ready);
        tracing::info!(
            capacity = config.capacity,
            unit_size_bytes = config.unit_size_bytes,
            queue_depth = config.queue_depth,
            "Daemon ready"
        );

        let result = controller.run(request_rx, shutdown_rx, exits).await;

        if !controller.stack().is_empty() {
            tracing::info!(
                pids = ?controller.stack().pids(),
                "Tearing down process stack"
            );
        }
        let reaped = controller.teardown().await;
        tracing::info!(reaped, "Process stack emptied");

        result.map_err(DaemonError::from)
    })
}

fn report_ready(ready: OwnedFd) {
    if let Err(err) = File::from(ready).write_all(&[READY_BYTE]) {
        // The launcher is gone; nothing is waiting for us.
        tracing::debug!(%err, "Could not report readiness");
    }
}

fn detach() -> Result<(), DaemonError> {
    setsid().map_err(|e| DaemonError::Detach {
        step: "setsid",
        source: e.into(),
    })?;
    umask(Mode::empty());
    std::env::set_current_dir("/").map_err(|source| DaemonError::Detach {
        step: "chdir",
        source,
    })?;
    redirect_stdio().map_err(|source| DaemonError::Detach {
        step: "stdio",
        source,
    })?;
    Ok(())
}

/// Points stdin, stdout and stderr at `/dev/null`, releasing the inherited streams.
fn redirect_stdio() -> io::Result<()> {
    let null = OpenOptions::new().read(true).write(true).open("/dev/null")?;
    let null_fd = null.as_raw_fd();

    for fd in [
        nix::libc::STDIN_FILENO,
        nix::libc::STDOUT_FILENO,
        nix::libc::STDERR_FILENO,
    ] {
        dup2(null_fd, fd)?;
    }

    // If /dev/null itself landed on 0-2, closing it would undo the redirect.
    if null_fd <= nix::libc::STDERR_FILENO {
        let _ = null.into_raw_fd();
    }
    Ok(())
}
