//! Pushed billing updates
//!
//! Events arrive as JSON objects tagged by `type` over whatever transport
//! the host application uses (WebSocket, SSE, a message bus). Value-carrying
//! events overwrite the cached resource directly; notification-only events
//! invalidate the affected resources and refetch them.

use assistext_shared::{BillingSettings, CreditBalance, PaymentMethod, Subscription, Usage};
use serde::{Deserialize, Serialize};

use crate::error::BillingResult;
use crate::query::QueryClient;
use crate::resources::{InvalidationScope, ResourceKey, ResourcePolicy, ResourceValue};

/// Server-to-client billing update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    /// Subscription changed (null when it ended)
    SubscriptionUpdated { subscription: Option<Subscription> },

    PaymentMethodsUpdated { payment_methods: Vec<PaymentMethod> },

    UsageUpdated { usage: Usage },

    CreditBalanceUpdated { balance: CreditBalance },

    SettingsUpdated { settings: BillingSettings },

    /// A new invoice was issued
    InvoiceCreated { invoice_id: String },

    /// A charge or refund was recorded
    PaymentRecorded { payment_id: String },
}

impl BillingEvent {
    pub fn parse(json: &str) -> BillingResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SubscriptionUpdated { .. } => "subscription_updated",
            Self::PaymentMethodsUpdated { .. } => "payment_methods_updated",
            Self::UsageUpdated { .. } => "usage_updated",
            Self::CreditBalanceUpdated { .. } => "credit_balance_updated",
            Self::SettingsUpdated { .. } => "settings_updated",
            Self::InvoiceCreated { .. } => "invoice_created",
            Self::PaymentRecorded { .. } => "payment_recorded",
        }
    }
}

/// Apply one event to the store. Returns the number of resources touched.
pub(crate) fn apply_event(query: &QueryClient, event: BillingEvent) -> usize {
    let event_type = event.event_type();
    let pushed = match event {
        BillingEvent::SubscriptionUpdated { subscription } => {
            Some((ResourceKey::Subscription, ResourceValue::Subscription(subscription)))
        }
        BillingEvent::PaymentMethodsUpdated { payment_methods } => Some((
            ResourceKey::PaymentMethods,
            ResourceValue::PaymentMethods(payment_methods),
        )),
        BillingEvent::UsageUpdated { usage } => Some((ResourceKey::Usage, ResourceValue::Usage(usage))),
        BillingEvent::CreditBalanceUpdated { balance } => {
            Some((ResourceKey::CreditBalance, ResourceValue::CreditBalance(balance)))
        }
        BillingEvent::SettingsUpdated { settings } => {
            Some((ResourceKey::Settings, ResourceValue::Settings(settings)))
        }
        BillingEvent::InvoiceCreated { .. } | BillingEvent::PaymentRecorded { .. } => None,
    };

    let touched = match pushed {
        Some((key, value)) => {
            let policy = ResourcePolicy::for_key(&key);
            usize::from(query.store().set_value(&key, value, policy.stale_after))
        }
        None => {
            let scope = InvalidationScope::Payments;
            let refetch = query.store().invalidate(|key| scope.covers(key));
            for key in &refetch {
                query.spawn_refetch(key);
            }
            refetch.len()
        }
    };

    tracing::debug!(event = event_type, touched, "Applied billing event");
    touched
}
