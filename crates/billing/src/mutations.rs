//! Mutation coordinator
//!
//! Runs billing write actions against the gateway, one at a time per action
//! kind. After the gateway confirms a write, the affected cached resources
//! are invalidated and refetched in the background; a failed write leaves
//! the cache untouched. Each action produces exactly one notification.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::BillingResult;
use crate::notify::{Notification, NotificationSink};
use crate::query::QueryClient;
use crate::resources::InvalidationScope;

/// Logical write actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    CreateSubscription,
    UpdateSubscription,
    CancelSubscription,
    ResumeSubscription,
    PauseSubscription,
    UpgradeSubscription,
    AddPaymentMethod,
    UpdatePaymentMethod,
    DeletePaymentMethod,
    SetDefaultPaymentMethod,
    ProcessPayment,
    PayInvoice,
    RefundPayment,
    UpdateSettings,
}

impl MutationKind {
    pub const ALL: [MutationKind; 14] = [
        Self::CreateSubscription,
        Self::UpdateSubscription,
        Self::CancelSubscription,
        Self::ResumeSubscription,
        Self::PauseSubscription,
        Self::UpgradeSubscription,
        Self::AddPaymentMethod,
        Self::UpdatePaymentMethod,
        Self::DeletePaymentMethod,
        Self::SetDefaultPaymentMethod,
        Self::ProcessPayment,
        Self::PayInvoice,
        Self::RefundPayment,
        Self::UpdateSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSubscription => "create_subscription",
            Self::UpdateSubscription => "update_subscription",
            Self::CancelSubscription => "cancel_subscription",
            Self::ResumeSubscription => "resume_subscription",
            Self::PauseSubscription => "pause_subscription",
            Self::UpgradeSubscription => "upgrade_subscription",
            Self::AddPaymentMethod => "add_payment_method",
            Self::UpdatePaymentMethod => "update_payment_method",
            Self::DeletePaymentMethod => "delete_payment_method",
            Self::SetDefaultPaymentMethod => "set_default_payment_method",
            Self::ProcessPayment => "process_payment",
            Self::PayInvoice => "pay_invoice",
            Self::RefundPayment => "refund_payment",
            Self::UpdateSettings => "update_settings",
        }
    }

    /// Cached resources a successful write may have changed
    pub fn scope(&self) -> InvalidationScope {
        match self {
            Self::CreateSubscription
            | Self::UpdateSubscription
            | Self::CancelSubscription
            | Self::ResumeSubscription
            | Self::PauseSubscription
            | Self::UpgradeSubscription => InvalidationScope::All,
            Self::AddPaymentMethod
            | Self::UpdatePaymentMethod
            | Self::DeletePaymentMethod
            | Self::SetDefaultPaymentMethod => InvalidationScope::PaymentMethods,
            Self::ProcessPayment | Self::PayInvoice | Self::RefundPayment => InvalidationScope::Payments,
            Self::UpdateSettings => InvalidationScope::Settings,
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Self::CreateSubscription => "Subscription created successfully",
            Self::UpdateSubscription => "Subscription updated successfully",
            Self::CancelSubscription => "Subscription canceled",
            Self::ResumeSubscription => "Subscription resumed",
            Self::PauseSubscription => "Subscription paused",
            Self::UpgradeSubscription => "Plan upgraded successfully",
            Self::AddPaymentMethod => "Payment method added",
            Self::UpdatePaymentMethod => "Payment method updated",
            Self::DeletePaymentMethod => "Payment method removed",
            Self::SetDefaultPaymentMethod => "Default payment method updated",
            Self::ProcessPayment => "Payment processed successfully",
            Self::PayInvoice => "Invoice paid successfully",
            Self::RefundPayment => "Refund issued",
            Self::UpdateSettings => "Billing settings saved",
        }
    }

    fn failure_prefix(&self) -> &'static str {
        match self {
            Self::CreateSubscription => "Failed to create subscription",
            Self::UpdateSubscription => "Failed to update subscription",
            Self::CancelSubscription => "Failed to cancel subscription",
            Self::ResumeSubscription => "Failed to resume subscription",
            Self::PauseSubscription => "Failed to pause subscription",
            Self::UpgradeSubscription => "Failed to upgrade plan",
            Self::AddPaymentMethod => "Failed to add payment method",
            Self::UpdatePaymentMethod => "Failed to update payment method",
            Self::DeletePaymentMethod => "Failed to remove payment method",
            Self::SetDefaultPaymentMethod => "Failed to set default payment method",
            Self::ProcessPayment => "Payment failed",
            Self::PayInvoice => "Failed to pay invoice",
            Self::RefundPayment => "Refund failed",
            Self::UpdateSettings => "Failed to save billing settings",
        }
    }
}

/// Executes writes and keeps the cache consistent afterwards
pub struct MutationCoordinator {
    query: QueryClient,
    notifier: Arc<dyn NotificationSink>,
    locks: HashMap<MutationKind, Arc<Mutex<()>>>,
}

impl MutationCoordinator {
    pub fn new(query: QueryClient, notifier: Arc<dyn NotificationSink>) -> Self {
        let locks = MutationKind::ALL
            .iter()
            .map(|kind| (*kind, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            query,
            notifier,
            locks,
        }
    }

    /// Run one write action.
    ///
    /// `action` performs the precondition checks and the gateway call. Its
    /// error is reported to the notification sink and returned unchanged.
    pub async fn execute<T, F>(&self, kind: MutationKind, action: F) -> BillingResult<T>
    where
        F: Future<Output = BillingResult<T>>,
    {
        let lock = self
            .locks
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::new(Mutex::new(())));
        let _guard = lock.lock().await;

        match action.await {
            Ok(value) => {
                let scope = kind.scope();
                let refetch = self.query.store().invalidate(|key| scope.covers(key));
                for key in &refetch {
                    self.query.spawn_refetch(key);
                }

                tracing::info!(
                    mutation = kind.as_str(),
                    refetching = refetch.len(),
                    "Billing mutation succeeded"
                );
                self.notifier.notify(Notification::success(kind.success_message()));
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(
                    mutation = kind.as_str(),
                    error = %err,
                    "Billing mutation failed"
                );
                self.notifier.notify(Notification::error(format!(
                    "{}: {}",
                    kind.failure_prefix(),
                    err.user_message()
                )));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceKey;

    #[test]
    fn test_subscription_family_invalidates_everything() {
        for kind in [
            MutationKind::CreateSubscription,
            MutationKind::UpdateSubscription,
            MutationKind::CancelSubscription,
            MutationKind::ResumeSubscription,
            MutationKind::PauseSubscription,
            MutationKind::UpgradeSubscription,
        ] {
            assert_eq!(kind.scope(), InvalidationScope::All, "{:?}", kind);
        }
    }

    #[test]
    fn test_payment_method_family_is_narrow() {
        let scope = MutationKind::SetDefaultPaymentMethod.scope();
        assert!(scope.covers(&ResourceKey::PaymentMethods));
        assert!(!scope.covers(&ResourceKey::Subscription));
        assert!(!scope.covers(&ResourceKey::CreditBalance));
    }

    #[test]
    fn test_every_kind_has_a_lock_and_messages() {
        let names: std::collections::HashSet<_> =
            MutationKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), MutationKind::ALL.len());
        for kind in MutationKind::ALL {
            assert!(!kind.success_message().is_empty());
            assert!(!kind.failure_prefix().is_empty());
        }
    }
}
