pub mod domain;
pub mod pipeline;
pub mod stack;
pub mod traits;
