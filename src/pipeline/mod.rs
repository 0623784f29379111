//! Pipeline module: normalization, attempt reduction, and the audit orchestrator

pub mod archive;
pub mod auditor;
pub mod normalizer;
pub mod reducer;

pub use archive::*;
pub use auditor::*;
pub use normalizer::*;
pub use reducer::*;
