use std::process::ExitCode;

use crate::config::Config;
use crate::constants::WORKER_ARG;
use crate::native::registry::PidRegistry;

mod client;
mod config;
mod constants;
mod core;
mod logging;
mod native;
#[cfg(test)]
mod stubs;

/// Which entry point this process runs. Decided once, before anything else.
#[derive(Debug, PartialEq, Eq)]
enum Role {
    Worker { unit_size: usize },
    Client,
    Daemon,
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("memctl: {}", err);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.log_file);
    logging::set_panic_hook();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let registry = PidRegistry::new(&config.pid_file);

    match select_role(&args, registry.is_present()) {
        Ok(Role::Worker { unit_size }) => native::worker::run(unit_size),
        Ok(Role::Client) => client::run(&args, &registry),
        Ok(Role::Daemon) => {
            if !args.is_empty() {
                tracing::warn!(?args, "No daemon is running; ignoring arguments and starting one");
            }
            native::daemon::start(&config)
        }
        Err(msg) => {
            tracing::error!(%msg, "Bad invocation");
            eprintln!("memctl: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn select_role(args: &[String], registry_present: bool) -> Result<Role, String> {
    match args {
        [marker, rest @ ..] if marker == WORKER_ARG => match rest {
            [size] => size
                .parse()
                .map(|unit_size| Role::Worker { unit_size })
                .map_err(|e| format!("invalid memory unit size {:?}: {}", size, e)),
            _ => Err(format!("{} expects exactly one size argument", WORKER_ARG)),
        },
        _ if registry_present => Ok(Role::Client),
        _ => Ok(Role::Daemon),
    }
}
