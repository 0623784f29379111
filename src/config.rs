//! Configuration for a reconciliation run

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{ReconError, ReconResult};

/// Audit run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Currency every amount is reported in (no conversion is performed)
    pub reporting_currency: String,

    /// Event types and flags that mark a record as non-commercial.
    /// Compared case-insensitively.
    pub noise_markers: Vec<String>,

    /// Use rayon for normalization and reduction
    pub parallel: bool,

    /// Where each attribute lives inside a raw record
    pub fields: FieldPaths,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            reporting_currency: "USD".to_string(),
            noise_markers: ["test", "sandbox", "heartbeat", "keepalive", "noise"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            parallel: true,
            fields: FieldPaths::default(),
        }
    }
}

impl AuditConfig {
    /// Parse and validate a TOML configuration
    pub fn from_toml(input: &str) -> ReconResult<Self> {
        let config: AuditConfig =
            toml::from_str(input).map_err(|e| ReconError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> ReconResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&contents)
    }

    /// Check the currency, noise markers and field paths
    pub fn validate(&self) -> ReconResult<()> {
        if self.reporting_currency.trim().is_empty() {
            return Err(ReconError::Config(
                "reporting_currency cannot be empty".to_string(),
            ));
        }

        if self.noise_markers.iter().any(|m| m.trim().is_empty()) {
            return Err(ReconError::Config(
                "noise_markers cannot contain blank entries".to_string(),
            ));
        }

        self.fields.validate()
    }
}

/// Candidate JSON pointers for each attribute of a raw record, tried in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldPaths {
    pub amount: Vec<String>,
    pub payment_id: Vec<String>,
    pub order_id: Vec<String>,
    pub event_type: Vec<String>,
    pub flags: Vec<String>,
    pub test_flag: Vec<String>,
    pub status: Vec<String>,
    pub occurred_at: Vec<String>,
}

fn pointers(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

impl Default for FieldPaths {
    fn default() -> Self {
        Self {
            amount: pointers(&["/payload/Amount", "/payload/amount", "/amount_cents", "/amount"]),
            payment_id: pointers(&["/entity/payment/id", "/payment_id"]),
            order_id: pointers(&["/entity/order/id", "/order_id"]),
            event_type: pointers(&["/event/type", "/event_type", "/type"]),
            flags: pointers(&["/payload/flags", "/flags"]),
            test_flag: pointers(&["/payload/is_test", "/is_test"]),
            status: pointers(&["/payload/status", "/status"]),
            occurred_at: pointers(&["/event/ts", "/attempted_at", "/occurred_at", "/ts"]),
        }
    }
}

impl FieldPaths {
    /// Every required attribute needs a pointer, and every pointer must be absolute
    pub fn validate(&self) -> ReconResult<()> {
        let required = [
            ("amount", &self.amount),
            ("payment_id", &self.payment_id),
            ("order_id", &self.order_id),
            ("occurred_at", &self.occurred_at),
        ];
        for (name, paths) in required {
            if paths.is_empty() {
                return Err(ReconError::Config(format!(
                    "fields.{name} needs at least one JSON pointer"
                )));
            }
        }

        let all = [
            &self.amount,
            &self.payment_id,
            &self.order_id,
            &self.event_type,
            &self.flags,
            &self.test_flag,
            &self.status,
            &self.occurred_at,
        ];
        if let Some(bad) = all.iter().flat_map(|p| p.iter()).find(|p| !p.starts_with('/')) {
            return Err(ReconError::Config(format!(
                "'{bad}' is not a JSON pointer (must start with '/')"
            )));
        }

        Ok(())
    }
}
