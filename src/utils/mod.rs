//! Utility modules

pub mod jsonl;
pub mod memory_sources;
pub mod validation;

pub use jsonl::*;
pub use memory_sources::*;
pub use validation::*;
