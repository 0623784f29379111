//! Monetary value handling

pub mod amount;

pub use amount::*;
