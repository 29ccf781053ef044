use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

/// A control request accepted from a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    Grow,
    Shrink,
}

/// What handling a single request did to the stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Pushed { pid: u32, depth: usize },
    Popped { pid: u32, depth: usize, exit: UnitExit },
    Full { capacity: usize },
    Empty,
}

/// How a memory unit ended once reaped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitExit {
    Exited(i32),
    Signaled(i32),
}

impl From<ExitStatus> for UnitExit {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => UnitExit::Exited(code),
            None => UnitExit::Signaled(status.signal().unwrap_or_default()),
        }
    }
}
