pub mod spawner;
pub mod unit;
