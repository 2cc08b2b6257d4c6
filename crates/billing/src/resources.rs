//! Billing resources tracked by the cache
//!
//! Each resource has a key (kind + parameters), a staleness policy and a
//! fetch function against the [`BillingGateway`].

use std::fmt;
use std::time::Duration;

use assistext_shared::{
    BillingAnalytics, BillingSettings, CreditBalance, CreditEntry, Granularity, Invoice, Page,
    Payment, PaymentMethod, Subscription, SubscriptionPlan, Usage, UsageSeries,
};
use time::Date;

use crate::error::BillingResult;
use crate::gateway::BillingGateway;

/// Identity of a cached resource, including its parameterization
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Subscription,
    Plans,
    PaymentMethods,
    Invoices { page: u32, page_size: u32 },
    Payments { page: u32, page_size: u32 },
    Usage,
    UsageHistory { start: Date, end: Date, granularity: Granularity },
    Settings,
    Analytics { start: Date, end: Date },
    CreditBalance,
    CreditHistory { page: u32, page_size: u32 },
}

impl ResourceKey {
    /// Resource kind without parameters, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::Plans => "plans",
            Self::PaymentMethods => "payment_methods",
            Self::Invoices { .. } => "invoices",
            Self::Payments { .. } => "payments",
            Self::Usage => "usage",
            Self::UsageHistory { .. } => "usage_history",
            Self::Settings => "settings",
            Self::Analytics { .. } => "analytics",
            Self::CreditBalance => "credit_balance",
            Self::CreditHistory { .. } => "credit_history",
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invoices { page, page_size }
            | Self::Payments { page, page_size }
            | Self::CreditHistory { page, page_size } => {
                write!(f, "{}[page={},size={}]", self.kind(), page, page_size)
            }
            Self::UsageHistory { start, end, granularity } => {
                write!(f, "{}[{}..{},{}]", self.kind(), start, end, granularity.as_str())
            }
            Self::Analytics { start, end } => write!(f, "{}[{}..{}]", self.kind(), start, end),
            _ => f.write_str(self.kind()),
        }
    }
}

/// Cache behaviour for one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePolicy {
    /// Age after which a read triggers a background refresh
    pub stale_after: Duration,
    /// Polled when auto refresh is on
    pub volatile: bool,
}

const MINUTE: Duration = Duration::from_secs(60);

impl ResourcePolicy {
    pub fn for_key(key: &ResourceKey) -> Self {
        let (minutes, volatile) = match key {
            ResourceKey::Subscription => (5, true),
            ResourceKey::Plans => (60, false),
            ResourceKey::PaymentMethods => (5, false),
            ResourceKey::Invoices { .. } => (5, false),
            ResourceKey::Payments { .. } => (5, false),
            ResourceKey::Usage => (2, true),
            ResourceKey::UsageHistory { .. } => (10, false),
            ResourceKey::Settings => (15, false),
            ResourceKey::Analytics { .. } => (30, false),
            ResourceKey::CreditBalance => (5, true),
            ResourceKey::CreditHistory { .. } => (5, false),
        };
        Self {
            stale_after: MINUTE * minutes,
            volatile,
        }
    }
}

/// Which cached resources a successful mutation may have changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationScope {
    /// Every billing resource
    All,
    PaymentMethods,
    /// Charges touch the subscription, invoices, payments and credits
    Payments,
    Settings,
}

impl InvalidationScope {
    pub fn covers(&self, key: &ResourceKey) -> bool {
        match self {
            Self::All => true,
            Self::PaymentMethods => matches!(key, ResourceKey::PaymentMethods),
            Self::Payments => matches!(
                key,
                ResourceKey::Subscription
                    | ResourceKey::Invoices { .. }
                    | ResourceKey::Payments { .. }
                    | ResourceKey::CreditBalance
                    | ResourceKey::CreditHistory { .. }
            ),
            Self::Settings => matches!(key, ResourceKey::Settings),
        }
    }
}

/// Last known value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceValue {
    Subscription(Option<Subscription>),
    Plans(Vec<SubscriptionPlan>),
    PaymentMethods(Vec<PaymentMethod>),
    Invoices(Page<Invoice>),
    Payments(Page<Payment>),
    Usage(Usage),
    UsageHistory(UsageSeries),
    Settings(BillingSettings),
    Analytics(BillingAnalytics),
    CreditBalance(CreditBalance),
    CreditHistory(Page<CreditEntry>),
}

/// Fetch the current value of `key` from the gateway
pub async fn fetch_resource(gateway: &dyn BillingGateway, key: &ResourceKey) -> BillingResult<ResourceValue> {
    Ok(match key {
        ResourceKey::Subscription => ResourceValue::Subscription(gateway.get_current_subscription().await?),
        ResourceKey::Plans => ResourceValue::Plans(gateway.get_subscription_plans().await?),
        ResourceKey::PaymentMethods => ResourceValue::PaymentMethods(gateway.get_payment_methods().await?),
        ResourceKey::Invoices { page, page_size } => {
            ResourceValue::Invoices(gateway.get_invoices(*page, *page_size).await?)
        }
        ResourceKey::Payments { page, page_size } => {
            ResourceValue::Payments(gateway.get_payment_history(*page, *page_size).await?)
        }
        ResourceKey::Usage => ResourceValue::Usage(gateway.get_current_usage().await?),
        ResourceKey::UsageHistory { start, end, granularity } => {
            ResourceValue::UsageHistory(gateway.get_usage_history(*start, *end, *granularity).await?)
        }
        ResourceKey::Settings => ResourceValue::Settings(gateway.get_billing_settings().await?),
        ResourceKey::Analytics { start, end } => {
            ResourceValue::Analytics(gateway.get_billing_analytics(*start, *end).await?)
        }
        ResourceKey::CreditBalance => ResourceValue::CreditBalance(gateway.get_credit_balance().await?),
        ResourceKey::CreditHistory { page, page_size } => {
            ResourceValue::CreditHistory(gateway.get_credit_history(*page, *page_size).await?)
        }
    })
}

/// Typed view over a [`ResourceValue`] variant
pub trait FromResource: Sized {
    fn from_resource(value: &ResourceValue) -> Option<Self>;
}

macro_rules! impl_from_resource {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl FromResource for $ty {
                fn from_resource(value: &ResourceValue) -> Option<Self> {
                    match value {
                        ResourceValue::$variant(inner) => Some(inner.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_resource! {
    Subscription => Option<Subscription>,
    Plans => Vec<SubscriptionPlan>,
    PaymentMethods => Vec<PaymentMethod>,
    Invoices => Page<Invoice>,
    Payments => Page<Payment>,
    Usage => Usage,
    UsageHistory => UsageSeries,
    Settings => BillingSettings,
    Analytics => BillingAnalytics,
    CreditBalance => CreditBalance,
    CreditHistory => Page<CreditEntry>,
}
