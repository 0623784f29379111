//! Collapsing an order's payment attempts into the one that counts
//!
//! Revenue is counted once per order, on the latest successful attempt.
//! Ties on timestamp go to the lexicographically highest `payment_id`, so the
//! choice never depends on input order.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::types::*;

/// All attempts for one order, latest first
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAttemptGroup {
    order_id: String,
    events: Vec<MonetaryEvent>,
}

/// Newest first, then highest `payment_id` first
fn attempt_order(a: &MonetaryEvent, b: &MonetaryEvent) -> Ordering {
    b.occurred_at
        .cmp(&a.occurred_at)
        .then_with(|| b.payment_id.cmp(&a.payment_id))
}

impl OrderAttemptGroup {
    /// Build a group from the complete set of an order's events
    pub fn new(order_id: String, mut events: Vec<MonetaryEvent>) -> Self {
        events.sort_by(attempt_order);
        Self { order_id, events }
    }

    /// Order shared by every attempt in the group
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    /// Events in selection order
    pub fn events(&self) -> &[MonetaryEvent] {
        &self.events
    }

    /// Index of the event that represents the order, if any succeeded
    pub fn selected_index(&self) -> Option<usize> {
        self.events.iter().position(MonetaryEvent::is_success)
    }

    /// Reduce the group to its authoritative attempt
    pub fn reduce(&self) -> Option<ReducedAttempt> {
        let index = self.selected_index()?;
        Some(ReducedAttempt {
            event: self.events[index].clone(),
            attempt_count: self.events.len(),
            success_count: self.events.iter().filter(|e| e.is_success()).count(),
        })
    }
}

/// Select the attempt that represents one order's payment.
///
/// `events` must all belong to the same order. Returns `None` when no attempt
/// succeeded.
pub fn reduce(events: &[MonetaryEvent]) -> Option<ReducedAttempt> {
    let first = events.first()?;
    debug_assert!(
        events.iter().all(|e| e.order_id == first.order_id),
        "reduce() called with events from more than one order"
    );

    let selected = events
        .iter()
        .filter(|e| e.is_success())
        .min_by(|a, b| attempt_order(a, b))?;

    Some(ReducedAttempt {
        event: selected.clone(),
        attempt_count: events.len(),
        success_count: events.iter().filter(|e| e.is_success()).count(),
    })
}

/// Partition events by order. Groups come back sorted by `order_id`.
pub fn group_by_order(events: Vec<MonetaryEvent>) -> Vec<OrderAttemptGroup> {
    let mut by_order: BTreeMap<String, Vec<MonetaryEvent>> = BTreeMap::new();
    for event in events {
        by_order.entry(event.order_id.clone()).or_default().push(event);
    }

    by_order
        .into_iter()
        .map(|(order_id, events)| OrderAttemptGroup::new(order_id, events))
        .collect()
}

/// Statistics from reducing a whole batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionStats {
    /// Distinct orders with at least one event
    pub orders_seen: usize,
    /// Orders with a counted attempt
    pub orders_reduced: usize,
    /// Orders with only failed or pending attempts
    pub orders_without_success: usize,
    /// Successful attempts not counted because a later success was chosen
    pub superseded_successes: usize,
}

/// Reduced attempts for a batch, sorted by `order_id`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReductionOutput {
    pub reduced: Vec<ReducedAttempt>,
    pub stats: ReductionStats,
}

/// Group a batch by order and reduce every group
pub fn reduce_all(events: Vec<MonetaryEvent>, parallel: bool) -> ReductionOutput {
    let groups = group_by_order(events);

    let reduced: Vec<Option<ReducedAttempt>> = if parallel {
        groups.par_iter().map(OrderAttemptGroup::reduce).collect()
    } else {
        groups.iter().map(OrderAttemptGroup::reduce).collect()
    };

    let mut output = ReductionOutput {
        reduced: Vec::with_capacity(reduced.len()),
        stats: ReductionStats {
            orders_seen: groups.len(),
            ..ReductionStats::default()
        },
    };

    for attempt in reduced {
        match attempt {
            Some(attempt) => {
                output.stats.superseded_successes += attempt.success_count - 1;
                output.reduced.push(attempt);
            }
            None => output.stats.orders_without_success += 1,
        }
    }
    output.stats.orders_reduced = output.reduced.len();

    tracing::info!(
        "Reduced {} orders to {} counted attempts ({} without success, {} superseded successes)",
        output.stats.orders_seen,
        output.stats.orders_reduced,
        output.stats.orders_without_success,
        output.stats.superseded_successes
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, hour, 0, 0).unwrap()
    }

    fn event(payment_id: &str, order_id: &str, status: PaymentStatus, hour: u32, cents: i64) -> MonetaryEvent {
        MonetaryEvent {
            payment_id: payment_id.to_string(),
            order_id: order_id.to_string(),
            amount_usd: BigDecimal::new(cents.into(), 2),
            status,
            occurred_at: at(hour),
            is_commercial: true,
        }
    }

    #[test]
    fn test_latest_success_counted_once() {
        let events = vec![
            event("pay_a", "ord_1", PaymentStatus::Failed, 1, 4200),
            event("pay_b", "ord_1", PaymentStatus::Success, 2, 4200),
            event("pay_c", "ord_1", PaymentStatus::Success, 3, 4200),
        ];

        let reduced = reduce(&events).unwrap();
        assert_eq!(reduced.payment_id(), "pay_c");
        assert_eq!(reduced.attempt_count, 3);
        assert_eq!(reduced.success_count, 2);

        let output = reduce_all(events, false);
        assert_eq!(output.reduced.len(), 1);
        let total: BigDecimal = output.reduced.iter().map(|r| r.amount_usd()).sum();
        assert_eq!(total, BigDecimal::new(4200.into(), 2));
        assert_eq!(output.stats.superseded_successes, 1);
    }

    #[test]
    fn test_no_success_yields_nothing() {
        let events = vec![
            event("pay_a", "ord_1", PaymentStatus::Failed, 1, 1000),
            event("pay_b", "ord_1", PaymentStatus::Pending, 2, 1000),
        ];
        assert_eq!(reduce(&events), None);
        assert_eq!(reduce(&[]), None);

        let output = reduce_all(events, false);
        assert!(output.reduced.is_empty());
        assert_eq!(output.stats.orders_without_success, 1);
    }

    #[test]
    fn test_timestamp_tie_breaks_on_highest_payment_id() {
        let events = vec![
            event("pay_m", "ord_1", PaymentStatus::Success, 5, 100),
            event("pay_z", "ord_1", PaymentStatus::Success, 5, 200),
            event("pay_a", "ord_1", PaymentStatus::Success, 5, 300),
        ];
        assert_eq!(reduce(&events).unwrap().payment_id(), "pay_z");

        let mut reversed = events.clone();
        reversed.reverse();
        assert_eq!(reduce(&reversed).unwrap().payment_id(), "pay_z");
    }

    #[test]
    fn test_later_failure_does_not_override_success() {
        let events = vec![
            event("pay_a", "ord_1", PaymentStatus::Success, 1, 100),
            event("pay_b", "ord_1", PaymentStatus::Failed, 9, 100),
        ];
        assert_eq!(reduce(&events).unwrap().payment_id(), "pay_a");
    }

    #[test]
    fn test_group_matches_free_function() {
        let events = vec![
            event("pay_1", "ord_1", PaymentStatus::Pending, 4, 100),
            event("pay_2", "ord_1", PaymentStatus::Success, 2, 100),
            event("pay_3", "ord_1", PaymentStatus::Success, 3, 100),
        ];
        let group = OrderAttemptGroup::new("ord_1".to_string(), events.clone());

        assert_eq!(group.events()[0].payment_id, "pay_1");
        assert_eq!(group.selected_index(), Some(1));
        assert_eq!(group.reduce(), reduce(&events));
    }

    #[test]
    fn test_reduce_all_groups_orders() {
        let events = vec![
            event("pay_3", "ord_b", PaymentStatus::Success, 1, 500),
            event("pay_1", "ord_a", PaymentStatus::Failed, 1, 100),
            event("pay_2", "ord_a", PaymentStatus::Success, 2, 100),
            event("pay_4", "ord_c", PaymentStatus::Failed, 1, 900),
        ];

        let parallel = reduce_all(events.clone(), true);
        let sequential = reduce_all(events, false);
        assert_eq!(parallel, sequential);

        let order_ids: Vec<&str> = parallel.reduced.iter().map(|r| r.order_id()).collect();
        assert_eq!(order_ids, vec!["ord_a", "ord_b"]);
        assert_eq!(
            parallel.stats,
            ReductionStats {
                orders_seen: 3,
                orders_reduced: 2,
                orders_without_success: 1,
                superseded_successes: 0,
            }
        );
    }
}
