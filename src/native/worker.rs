use std::collections::TryReserveError;
use std::process::ExitCode;

use nix::sys::signal::{SigSet, Signal};

use crate::constants::PAGE_STRIDE;

/// Entry point of a memory unit process.
///
/// Commits `unit_size` resident bytes, then sleeps until SIGTERM or SIGINT.
/// The signals are blocked and collected with `sigwait`, so nothing runs in
/// handler context and a request that arrives mid-commit is not lost.
pub fn run(unit_size: usize) -> ExitCode {
    let span = tracing::info_span!("unit", pid = std::process::id());
    let _entered = span.enter();

    let mut termination = SigSet::empty();
    termination.add(Signal::SIGTERM);
    termination.add(Signal::SIGINT);
    if let Err(err) = termination.thread_block() {
        tracing::error!(%err, "Failed to block termination signals");
        return ExitCode::FAILURE;
    }

    let block = match commit(unit_size) {
        Ok(block) => block,
        Err(err) => {
            tracing::error!(unit_size, %err, "Failed to commit memory block");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(bytes = block.len(), "Memory unit committed its block");

    match termination.wait() {
        Ok(signal) => tracing::info!(?signal, "Memory unit releasing its block"),
        Err(err) => tracing::error!(%err, "Waiting for termination failed, releasing block"),
    }

    drop(block);
    ExitCode::SUCCESS
}

/// Allocates `size` zeroed bytes and writes to every page so all of it is resident.
pub fn commit(size: usize) -> Result<Vec<u8>, TryReserveError> {
    let mut block = Vec::new();
    block.try_reserve_exact(size)?;
    block.resize(size, 0u8);

    // The allocator may hand out lazily mapped zero pages; volatile writes
    // force a fault on each one and cannot be optimised away.
    let base = block.as_mut_ptr();
    for offset in (0..size).step_by(PAGE_STRIDE) {
        // SAFETY: `offset < size == block.len()`, so the write stays in bounds.
        unsafe { std::ptr::write_volatile(base.add(offset), 0u8) };
    }

    Ok(block)
}
