use std::process::ExitCode;

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use thiserror::Error;

use crate::{
    constants::USAGE,
    native::registry::{PidRegistry, RegistryError},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Up,
    Down,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{}", USAGE)]
    Usage,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to deliver {signal:?} to daemon {pid}: {source}")]
    Delivery {
        signal: Signal,
        pid: Pid,
        source: Errno,
    },
}

impl Command {
    /// Accepts exactly one argument, `up` or `down`.
    pub fn parse(args: &[String]) -> Result<Self, ClientError> {
        match args {
            [arg] if arg == "up" => Ok(Command::Up),
            [arg] if arg == "down" => Ok(Command::Down),
            _ => Err(ClientError::Usage),
        }
    }

    pub fn signal(self) -> Signal {
        match self {
            Command::Up => Signal::SIGUSR1,
            Command::Down => Signal::SIGUSR2,
        }
    }
}

/// Delivers `command` to the daemon named in `registry` and returns its pid.
pub fn send(command: Command, registry: &PidRegistry) -> Result<Pid, ClientError> {
    let pid = registry.read()?;
    let signal = command.signal();

    kill(pid, signal).map_err(|source| ClientError::Delivery {
        signal,
        pid,
        source,
    })?;

    Ok(pid)
}

pub fn run(args: &[String], registry: &PidRegistry) -> ExitCode {
    let span = tracing::info_span!("client", pid = std::process::id());
    let _entered = span.enter();

    let command = match Command::parse(args) {
        Ok(command) => command,
        Err(err) => {
            tracing::warn!(?args, "Malformed client arguments");
            println!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    match send(command, registry) {
        Ok(pid) => {
            tracing::info!(?command, %pid, "Request delivered");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(?command, %err, "Request not delivered");
            eprintln!("memctl: {}", err);
            ExitCode::FAILURE
        }
    }
}
