pub const PID_FILE: &str = "/tmp/memory_controller.pid";
pub const LOG_FILE: &str = "/tmp/memory_controller.log";

/// Size of the block each memory unit commits (2^27 bytes).
pub const UNIT_SIZE_BYTES: usize = 1 << 27;
pub const STACK_CAPACITY: usize = 256;
pub const QUEUE_DEPTH: usize = 1024;
pub const REAP_GRACE_MS: u64 = 2000;

/// Smallest page size we expect; touching at this stride reaches every page.
pub const PAGE_STRIDE: usize = 4096;

pub const PID_FILE_ENV: &str = "MEMCTL_PID_FILE";
pub const LOG_FILE_ENV: &str = "MEMCTL_LOG_FILE";
pub const UNIT_SIZE_ENV: &str = "MEMCTL_UNIT_SIZE";
pub const CAPACITY_ENV: &str = "MEMCTL_CAPACITY";
pub const QUEUE_DEPTH_ENV: &str = "MEMCTL_QUEUE_DEPTH";
pub const REAP_GRACE_ENV: &str = "MEMCTL_REAP_GRACE_MS";

pub const DEFAULT_LOG_FILTER: &str = "info";

/// First argument that routes a process into the memory unit entry point.
pub const WORKER_ARG: &str = "__memory-unit";

pub const USAGE: &str = "Usage: memctl [up|down]";

/// Written by the detached daemon to tell the launcher it is ready.
pub const READY_BYTE: u8 = b'R';
