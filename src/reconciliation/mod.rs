//! Cross-ledger reconciliation of reduced attempts against bank settlements
//!
//! Matching is an exact join on `payment_id`. Nothing is matched by amount or
//! date, and duplicate ids are reported rather than resolved.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::*;

/// Which ledger a data-quality warning refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerSide {
    Internal,
    Bank,
}

/// Data-quality problems found while matching. Never fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataQualityWarning {
    /// The same `payment_id` appears more than once within one ledger
    AmbiguousPaymentId {
        ledger: LedgerSide,
        payment_id: String,
        occurrences: usize,
    },
    /// A bank line with no payment reference; always an orphan
    UnreferencedSettlement { settlement_id: String },
}

/// A matched payment whose settled sum differs from the internal amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountMismatch {
    pub payment_id: String,
    pub internal_amount: BigDecimal,
    pub settled_amount: BigDecimal,
    /// `internal_amount - settled_amount`
    pub difference: BigDecimal,
}

/// Aggregate output of one reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Sum of all reduced attempts, matched or not
    pub total_successful_sales: BigDecimal,
    /// Sum of every bank settlement line
    pub total_bank_settled: BigDecimal,
    /// Sum of bank lines that matched a reduced attempt
    pub matched_settled_total: BigDecimal,
    /// Sum of bank lines with no matching reduced attempt
    pub orphan_payments_total: BigDecimal,
    /// `total_successful_sales - total_bank_settled`
    pub discrepancy_gap: BigDecimal,
    /// Sum of reduced attempts the bank never settled
    pub unsettled_internal_total: BigDecimal,
    pub matched_payments: usize,
    pub orphan_payments: Vec<BankSettlement>,
    pub unsettled_internal: Vec<ReducedAttempt>,
    pub amount_mismatches: Vec<AmountMismatch>,
    pub warnings: Vec<DataQualityWarning>,
}

impl ReconciliationResult {
    /// Whether the two ledgers agree exactly, payment by payment.
    ///
    /// Any amount mismatch or data-quality warning means the ledgers are
    /// not balanced, even when the totals net to zero.
    pub fn is_balanced(&self) -> bool {
        self.discrepancy_gap == BigDecimal::from(0)
            && self.orphan_payments.is_empty()
            && self.unsettled_internal.is_empty()
            && self.amount_mismatches.is_empty()
            && self.warnings.is_empty()
    }
}

/// Reconciles reduced attempts against the bank ledger
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationEngine;

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconciliationEngine {
    /// Create an engine
    pub fn new() -> Self {
        Self
    }

    /// Compare the internal truth set with the bank truth set.
    ///
    /// Pure: identical inputs always produce an identical result.
    pub fn reconcile(
        &self,
        reduced: &[ReducedAttempt],
        settlements: &[BankSettlement],
    ) -> ReconciliationResult {
        let mut internal: BTreeMap<&str, Vec<&ReducedAttempt>> = BTreeMap::new();
        for attempt in reduced {
            internal.entry(attempt.payment_id()).or_default().push(attempt);
        }

        let mut bank: BTreeMap<&str, Vec<&BankSettlement>> = BTreeMap::new();
        let mut unreferenced: Vec<&BankSettlement> = Vec::new();
        for settlement in settlements {
            if settlement.is_unreferenced() {
                unreferenced.push(settlement);
            } else {
                bank.entry(settlement.payment_id.trim())
                    .or_default()
                    .push(settlement);
            }
        }

        let mut warnings = Vec::new();
        warnings.extend(ambiguous_ids(LedgerSide::Internal, &internal));
        warnings.extend(ambiguous_ids(LedgerSide::Bank, &bank));
        let mut unreferenced_ids: Vec<&str> =
            unreferenced.iter().map(|s| s.settlement_id.as_str()).collect();
        unreferenced_ids.sort_unstable();
        warnings.extend(unreferenced_ids.into_iter().map(|settlement_id| {
            DataQualityWarning::UnreferencedSettlement {
                settlement_id: settlement_id.to_string(),
            }
        }));

        let total_successful_sales: BigDecimal = reduced.iter().map(|r| r.amount_usd()).sum();
        let total_bank_settled: BigDecimal = settlements.iter().map(|s| &s.amount_usd).sum();

        let mut matched_settled_total = BigDecimal::from(0);
        let mut matched_payments = 0;
        let mut orphan_payments: Vec<BankSettlement> = Vec::new();
        let mut amount_mismatches = Vec::new();

        for (payment_id, lines) in &bank {
            let settled: BigDecimal = lines.iter().map(|s| &s.amount_usd).sum();
            match internal.get(payment_id) {
                Some(attempts) => {
                    matched_payments += 1;
                    let internal_amount: BigDecimal =
                        attempts.iter().map(|a| a.amount_usd()).sum();
                    if internal_amount != settled {
                        amount_mismatches.push(AmountMismatch {
                            payment_id: payment_id.to_string(),
                            difference: &internal_amount - &settled,
                            internal_amount,
                            settled_amount: settled.clone(),
                        });
                    }
                    matched_settled_total += settled;
                }
                None => orphan_payments.extend(lines.iter().map(|s| (*s).clone())),
            }
        }
        let mut unreferenced_orphans: Vec<BankSettlement> =
            unreferenced.into_iter().cloned().collect();
        unreferenced_orphans.sort_by(|a, b| a.settlement_id.cmp(&b.settlement_id));
        orphan_payments.extend(unreferenced_orphans);

        let orphan_payments_total: BigDecimal =
            orphan_payments.iter().map(|s| &s.amount_usd).sum();

        let unsettled_internal: Vec<ReducedAttempt> = internal
            .iter()
            .filter(|(payment_id, _)| !bank.contains_key(*payment_id))
            .flat_map(|(_, attempts)| attempts.iter().map(|a| (*a).clone()))
            .collect();
        let unsettled_internal_total: BigDecimal =
            unsettled_internal.iter().map(|r| r.amount_usd()).sum();

        let discrepancy_gap = &total_successful_sales - &total_bank_settled;

        for warning in &warnings {
            tracing::warn!("Data quality: {:?}", warning);
        }
        tracing::info!(
            "Reconciled {} attempts against {} settlements: sales {}, settled {}, orphans {}, gap {}",
            reduced.len(),
            settlements.len(),
            total_successful_sales,
            total_bank_settled,
            orphan_payments_total,
            discrepancy_gap
        );

        ReconciliationResult {
            total_successful_sales,
            total_bank_settled,
            matched_settled_total,
            orphan_payments_total,
            discrepancy_gap,
            unsettled_internal_total,
            matched_payments,
            orphan_payments,
            unsettled_internal,
            amount_mismatches,
            warnings,
        }
    }
}

fn ambiguous_ids<T>(ledger: LedgerSide, index: &BTreeMap<&str, Vec<T>>) -> Vec<DataQualityWarning> {
    index
        .iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(payment_id, rows)| DataQualityWarning::AmbiguousPaymentId {
            ledger,
            payment_id: payment_id.to_string(),
            occurrences: rows.len(),
        })
        .collect()
}
