//! # Reconciliation Core
//!
//! Reconciles raw payment event logs, the internal order ledger, and the bank
//! settlement ledger into one audited revenue figure, and reports where they
//! disagree.
//!
//! ## Features
//!
//! - **Normalization**: decodes `"$10.00"`, `"10.00"` and `1000` (cents) to the same exact decimal
//! - **Commercial filtering**: drops test, sandbox and heartbeat traffic, with every rejection counted
//! - **Attempt reduction**: counts each order once, on its latest successful attempt
//! - **Ledger reconciliation**: exact `payment_id` join yielding orphan payments, unsettled successes and the discrepancy gap
//! - **Archival**: every raw record is forwarded to a write-once sink without slowing the run
//! - **Source abstraction**: storage-agnostic design with trait-based sources and sinks
//!
//! ## Quick Start
//!
//! ```rust
//! use reconciliation_core::{reduce, MonetaryEvent, PaymentStatus, ReconciliationEngine};
//! use bigdecimal::BigDecimal;
//! use chrono::{TimeZone, Utc};
//!
//! let attempt = MonetaryEvent {
//!     payment_id: "pay_1".to_string(),
//!     order_id: "ord_1".to_string(),
//!     amount_usd: BigDecimal::from(10),
//!     status: PaymentStatus::Success,
//!     occurred_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//!     is_commercial: true,
//! };
//! let reduced = reduce(&[attempt]).unwrap();
//! let result = ReconciliationEngine::new().reconcile(&[reduced], &[]);
//! assert_eq!(result.discrepancy_gap, BigDecimal::from(10));
//! ```

pub mod config;
pub mod money;
pub mod pipeline;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use money::*;
pub use pipeline::*;
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
