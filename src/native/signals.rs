use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{SigSet, Signal};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{
    Notify,
    mpsc::{Sender, error::TrySendError},
    watch,
};

use crate::core::domain::Request;

/// What a received signal means to the daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Request(Request),
    Shutdown,
    Ignored,
}

/// Result of forwarding one accepted signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Forwarded {
    Queued(Request),
    Dropped(Request),
    Shutdown,
    Ignored(Signal),
    IgnoredRealtime(i32),
}

/// Signals the daemon never captures.
///
/// SIGCHLD belongs to the runtime, which reaps memory units through it. The
/// rest either cannot be caught, stop rather than terminate, are ignored by
/// default, or report a fault in the daemon itself.
const LEFT_AT_DEFAULT: &[Signal] = &[
    Signal::SIGCHLD,
    Signal::SIGKILL,
    Signal::SIGSTOP,
    Signal::SIGCONT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGURG,
    Signal::SIGWINCH,
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGILL,
    Signal::SIGFPE,
];

pub fn classify(signal: Signal) -> Control {
    match signal {
        Signal::SIGUSR1 => Control::Request(Request::Grow),
        Signal::SIGUSR2 => Control::Request(Request::Shrink),
        Signal::SIGTERM | Signal::SIGINT => Control::Shutdown,
        _ => Control::Ignored,
    }
}

/// Every signal that would otherwise end the daemon without cleanup,
/// real-time signals included.
pub fn control_signals() -> SigSet {
    let named: SigSet = Signal::iterator()
        .filter(|signal| !LEFT_AT_DEFAULT.contains(signal))
        .collect();

    let mut raw = *named.as_ref();
    for signo in libc::SIGRTMIN()..=libc::SIGRTMAX() {
        // SAFETY: `raw` is an initialised sigset and `signo` is in the valid range.
        unsafe { libc::sigaddset(&mut raw, signo) };
    }
    // SAFETY: `raw` was copied from an initialised `SigSet`.
    unsafe { SigSet::from_sigset_t_unchecked(raw) }
}

/// Blocks the control signals for the calling thread and every thread it spawns later.
///
/// Must run before any other thread exists, otherwise that thread could still
/// take the default action for them.
pub fn block_control_signals() -> Result<SigSet, Errno> {
    let set = control_signals();
    set.thread_block()?;
    Ok(set)
}

/// `sigwait` returning the raw number, so real-time signals come through too.
fn wait_raw(set: &SigSet) -> Result<i32, Errno> {
    loop {
        let mut signo: libc::c_int = 0;
        // SAFETY: both pointers reference live, initialised values for the whole call.
        match unsafe { libc::sigwait(set.as_ref(), &mut signo) } {
            0 => return Ok(signo),
            libc::EINTR => continue,
            err => return Err(Errno::from_raw(err)),
        }
    }
}

/// Turns accepted signals into messages for the controller loop.
///
/// Runs on its own thread and waits with `sigwait`, so no daemon code ever
/// executes inside an asynchronous signal handler.
#[derive(Debug)]
pub struct SignalForwarder {
    requests: Sender<Request>,
    shutdown: watch::Sender<bool>,
}

impl SignalForwarder {
    pub fn new(requests: Sender<Request>, shutdown: watch::Sender<bool>) -> Self {
        Self { requests, shutdown }
    }

    pub fn forward(&self, signal: Signal) -> Forwarded {
        match classify(signal) {
            Control::Request(request) => match self.requests.try_send(request) {
                Ok(()) => {
                    tracing::debug!(?signal, ?request, "Request queued");
                    Forwarded::Queued(request)
                }
                Err(TrySendError::Full(request)) => {
                    tracing::warn!(?signal, ?request, "Request queue is full, dropping request");
                    Forwarded::Dropped(request)
                }
                Err(TrySendError::Closed(request)) => {
                    tracing::warn!(?signal, ?request, "Controller is gone, dropping request");
                    Forwarded::Dropped(request)
                }
            },
            Control::Shutdown => {
                tracing::info!(?signal, "Received termination signal");
                self.shutdown.send_replace(true);
                Forwarded::Shutdown
            }
            Control::Ignored => {
                tracing::info!(?signal, "Received unexpected signal, ignoring");
                Forwarded::Ignored(signal)
            }
        }
    }

    pub fn forward_raw(&self, signo: i32) -> Forwarded {
        match Signal::try_from(signo) {
            Ok(signal) => self.forward(signal),
            Err(_) => {
                tracing::info!(signo, "Received unexpected real-time signal, ignoring");
                Forwarded::IgnoredRealtime(signo)
            }
        }
    }

    pub fn spawn(self, signals: SigSet) -> io::Result<JoinHandle<()>> {
        let span = tracing::Span::current();

        thread::Builder::new()
            .name("signal-forwarder".to_string())
            .spawn(move || {
                let _entered = span.enter();
                loop {
                    match wait_raw(&signals) {
                        Ok(signo) => {
                            self.forward_raw(signo);
                        }
                        Err(err) => {
                            tracing::error!(%err, "Waiting for signals failed, shutting down");
                            self.shutdown.send_replace(true);
                            return;
                        }
                    }
                }
            })
    }
}

/// Wakes `exits` whenever a child process changes state.
///
/// Must be called from inside the runtime.
pub fn watch_child_exits(exits: Arc<Notify>) -> io::Result<()> {
    let mut sigchld = signal(SignalKind::child())?;

    tokio::spawn(async move {
        while sigchld.recv().await.is_some() {
            exits.notify_one();
        }
    });
    Ok(())
}
