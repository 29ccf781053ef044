/// Native module holds the pieces that talk to the OS directly:
/// process creation, signals, the pid file and daemon detachment.
pub mod daemon;
pub mod registry;
pub mod signals;
pub mod spawner;
pub mod worker;
