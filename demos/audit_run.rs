//! End-to-end audit run over in-memory ledgers
//!
//! Run with `RUST_LOG=debug cargo run --example audit_run` to see every rejection.

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use reconciliation_core::utils::{
    MemoryArchive, MemoryBankLedger, MemoryEventSource, MemoryInternalLedger,
};
use reconciliation_core::{ArchiveDecision, Auditor, BankSettlement, Order, RawRecord};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🧾 Reconciliation Core - Audit Run Example\n");

    // 1. Raw payment log, as exported by the event pipeline
    let raw = vec![
        json!({
            "event": { "type": "payment_failed", "ts": "2024-03-01T09:00:00Z" },
            "entity": { "order": { "id": "ord_001" }, "payment": { "id": "pay_001a" } },
            "payload": { "Amount": "$5,000,000.00", "status": "FAILED" }
        }),
        json!({
            "event": { "type": "payment_succeeded", "ts": "2024-03-01T09:05:00Z" },
            "entity": { "order": { "id": "ord_001" }, "payment": { "id": "pay_001b" } },
            "payload": { "Amount": 500000000, "status": "SUCCESS" }
        }),
        json!({
            "payment_id": "pay_002", "order_id": "ord_002", "amount": "269,910.24",
            "status": "SUCCESS", "attempted_at": "2024-03-01 10:00:00"
        }),
        json!({
            "event": { "type": "heartbeat", "ts": "2024-03-01T11:00:00Z" },
            "payload": { "Amount": null, "flags": ["noise"] }
        }),
        json!({
            "event": { "type": "payment_succeeded", "ts": "2024-03-01T12:00:00Z" },
            "entity": { "order": { "id": "ord_003" }, "payment": { "id": null } },
            "payload": { "Amount": "$120.00", "status": "SUCCESS" }
        }),
    ];
    let events = MemoryEventSource::new(raw.into_iter().map(RawRecord::new).collect());

    // 2. Internal ledger orders
    let created_at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    let orders = ["ord_001", "ord_002", "ord_003"]
        .into_iter()
        .map(|order_id| Order {
            order_id: order_id.to_string(),
            customer_id: None,
            order_total_usd: BigDecimal::from(0),
            currency: "USD".to_string(),
            is_test: false,
            created_at,
        })
        .collect();
    let ledger = MemoryInternalLedger::new(orders);

    // 3. Bank settlement export
    let settled_at = Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap();
    let settlement = |id: &str, payment_id: &str, amount: &str| -> Result<BankSettlement, Box<dyn std::error::Error>> {
        Ok(BankSettlement::new(
            id.to_string(),
            payment_id.to_string(),
            BigDecimal::from_str(amount)?,
            settled_at,
        ))
    };
    let bank = MemoryBankLedger::new(vec![
        settlement("set_001", "pay_001b", "5000000.00")?,
        settlement("set_002", "pay_002", "269910.24")?,
        settlement("set_003", "pay_001b", "642847.93")?,
        settlement("set_004", "pay_404", "500000.00")?,
    ]);

    // 4. Run the audit
    let archive = MemoryArchive::new();
    let auditor = Auditor::new(events, ledger, bank).with_archive(Arc::new(archive.clone()));
    let report = auditor.run().await?;
    let result = &report.result;

    println!("\n📥 Normalization (run {}):", report.run_id);
    println!("  Records read:        {}", report.records_read);
    println!("  Accepted:            {}", report.events_accepted);
    println!("  Non-commercial:      {}", report.rejections.non_commercial);
    println!("  Missing identifier:  {}", report.rejections.missing_identifier);
    println!("  Malformed amount:    {}", report.rejections.malformed_amount);
    println!("  Malformed timestamp: {}", report.rejections.malformed_timestamp);
    println!("  Rejected amount:     ${}", report.rejections.rejected_amount_total);

    println!("\n🔁 Attempt reduction:");
    println!("  Orders seen:          {}", report.reduction.orders_seen);
    println!("  Orders with revenue:  {}", report.reduction.orders_reduced);
    println!("  Superseded successes: {}", report.reduction.superseded_successes);

    println!("\n🏦 Reconciliation ({}):", report.reporting_currency);
    println!("  Successful sales: ${}", result.total_successful_sales);
    println!("  Bank settled:     ${}", result.total_bank_settled);
    println!("  Orphan payments:  ${}", result.orphan_payments_total);
    println!("  Discrepancy gap:  ${}", result.discrepancy_gap);

    for orphan in &result.orphan_payments {
        println!(
            "  ⚠️  Orphan {} references unknown payment '{}' (${})",
            orphan.settlement_id, orphan.payment_id, orphan.amount_usd
        );
    }
    for mismatch in &result.amount_mismatches {
        println!(
            "  ⚠️  {} recorded ${} internally but settled ${}",
            mismatch.payment_id, mismatch.internal_amount, mismatch.settled_amount
        );
    }
    for warning in &result.warnings {
        println!("  ⚠️  {:?}", warning);
    }

    let accepted = archive
        .entries()
        .iter()
        .filter(|e| e.decision == ArchiveDecision::Accepted)
        .count();
    println!(
        "\n🗄️  Archived {} records ({} accepted, {} failed writes)",
        report.archive.archived, accepted, report.archive.failed
    );

    if result.is_balanced() {
        println!("\n✅ Ledgers are balanced");
    } else {
        println!("\n❌ Ledgers do not balance");
    }

    Ok(())
}
