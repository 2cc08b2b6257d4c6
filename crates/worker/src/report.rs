//! Snapshot summaries logged by the worker

use assistext_billing::BillingSnapshot;
use assistext_shared::{InvoiceStatus, SubscriptionStatus};
use serde::Serialize;

/// Compact view of a [`BillingSnapshot`] for structured logs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub plan_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub cancel_at_period_end: bool,
    pub payment_methods: usize,
    pub default_payment_method: Option<String>,
    pub open_invoices: usize,
    pub amount_due_cents: i64,
    pub credit_balance_cents: i64,
    pub sms_used_percent: Option<f64>,
    pub failed_resources: Vec<String>,
}

pub fn summarize(snapshot: &BillingSnapshot) -> SnapshotSummary {
    let subscription = snapshot.current_subscription();
    let open_invoices: Vec<_> = snapshot
        .invoices
        .data
        .as_ref()
        .map(|page| {
            page.items
                .iter()
                .filter(|i| i.status == InvoiceStatus::Open)
                .collect()
        })
        .unwrap_or_default();

    let errors = [
        ("subscription", snapshot.subscription.error.as_ref()),
        ("plans", snapshot.plans.error.as_ref()),
        ("payment_methods", snapshot.payment_methods.error.as_ref()),
        ("invoices", snapshot.invoices.error.as_ref()),
        ("payments", snapshot.payments.error.as_ref()),
        ("usage", snapshot.usage.error.as_ref()),
        ("usage_history", snapshot.usage_history.error.as_ref()),
        ("settings", snapshot.settings.error.as_ref()),
        ("analytics", snapshot.analytics.error.as_ref()),
        ("credit_balance", snapshot.credit_balance.error.as_ref()),
        ("credit_history", snapshot.credit_history.error.as_ref()),
    ];

    SnapshotSummary {
        plan_id: subscription.map(|s| s.plan_id.clone()),
        status: subscription.map(|s| s.status),
        cancel_at_period_end: subscription.is_some_and(|s| s.cancel_at_period_end),
        payment_methods: snapshot.payment_methods.data.as_ref().map_or(0, Vec::len),
        default_payment_method: snapshot.default_payment_method().map(|m| m.id.clone()),
        open_invoices: open_invoices.len(),
        amount_due_cents: open_invoices.iter().map(|i| i.amount_remaining_cents()).sum(),
        credit_balance_cents: snapshot.credit_balance(),
        sms_used_percent: snapshot.usage.data.as_ref().map(|u| u.percentage_used()),
        failed_resources: errors
            .iter()
            .filter(|(_, err)| err.is_some())
            .map(|(name, _)| name.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assistext_billing::{BillingError, ResourceState};
    use assistext_shared::{CreditBalance, Invoice, Page};
    use time::macros::datetime;

    fn invoice(id: &str, status: InvoiceStatus, due: i64, paid: i64) -> Invoice {
        Invoice {
            id: id.to_string(),
            number: None,
            status,
            amount_due_cents: due,
            amount_paid_cents: paid,
            currency: "usd".to_string(),
            due_date: None,
            created_at: datetime!(2026-10-01 0:00 UTC),
            hosted_url: None,
        }
    }

    #[test]
    fn test_empty_snapshot_summary() {
        let summary = summarize(&BillingSnapshot::default());
        assert_eq!(summary.plan_id, None);
        assert_eq!(summary.payment_methods, 0);
        assert_eq!(summary.credit_balance_cents, 0);
        assert!(summary.failed_resources.is_empty());
    }

    #[test]
    fn test_summary_totals_open_invoices_and_errors() {
        let snapshot = BillingSnapshot {
            invoices: ResourceState {
                data: Some(Page {
                    items: vec![
                        invoice("inv_1", InvoiceStatus::Open, 2900, 900),
                        invoice("inv_2", InvoiceStatus::Paid, 2900, 2900),
                        invoice("inv_3", InvoiceStatus::Open, 1000, 0),
                    ],
                    page: 1,
                    page_size: 10,
                    total: 3,
                }),
                ..Default::default()
            },
            credit_balance: ResourceState {
                data: Some(CreditBalance {
                    balance: 250,
                    currency: "usd".to_string(),
                }),
                ..Default::default()
            },
            analytics: ResourceState {
                error: Some(BillingError::Timeout),
                ..Default::default()
            },
            ..Default::default()
        };

        let summary = summarize(&snapshot);
        assert_eq!(summary.open_invoices, 2);
        assert_eq!(summary.amount_due_cents, 3000);
        assert_eq!(summary.credit_balance_cents, 250);
        assert_eq!(summary.failed_resources, vec!["analytics".to_string()]);
    }
}
