//! Billing types exchanged with the AssisText API

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::error::ValidationError;

// Calendar dates travel as `YYYY-MM-DD`
time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

// =============================================================================
// Subscriptions and plans
// =============================================================================

/// Lifecycle state of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Paused,
    Canceled,
    Incomplete,
    Unpaid,
    /// Status added server-side after this client was built
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Whether the subscription currently grants service
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing | Self::PastDue)
    }
}

/// The caller's plan binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub current_period_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub current_period_end: OffsetDateTime,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub canceled_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub paused_until: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub trial_end: Option<OffsetDateTime>,
}

/// Billing cadence of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Month,
    Year,
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub interval: BillingInterval,
    /// Included outbound SMS per period (None = unlimited)
    #[serde(default)]
    pub sms_limit: Option<i64>,
    #[serde(default)]
    pub phone_number_limit: Option<i64>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Proration quote for switching plans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradePreview {
    pub from_plan_id: String,
    pub to_plan_id: String,
    pub prorated_amount_cents: i64,
    pub next_invoice_total_cents: i64,
    pub currency: String,
    #[serde(with = "time::serde::rfc3339")]
    pub effective_date: OffsetDateTime,
}

/// Result of checking a coupon code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponResult {
    pub valid: bool,
    pub code: String,
    #[serde(default)]
    pub percent_off: Option<f64>,
    #[serde(default)]
    pub amount_off_cents: Option<i64>,
    /// "once", "repeating" or "forever"
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Hosted billing portal session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSession {
    pub url: String,
}

// =============================================================================
// Payment methods
// =============================================================================

/// A stored payment instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    /// "card", "us_bank_account", ...
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub exp_month: Option<u8>,
    #[serde(default)]
    pub exp_year: Option<u16>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The account's default payment method.
///
/// An account has at most one default; if the server ever reports more,
/// the first one wins.
pub fn default_payment_method(methods: &[PaymentMethod]) -> Option<&PaymentMethod> {
    methods.iter().find(|m| m.is_default)
}

/// Billing contact attached to a payment method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
}

// =============================================================================
// Invoices, payments, credits
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Void,
    Uncollectible,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub number: Option<String>,
    pub status: InvoiceStatus,
    pub amount_due_cents: i64,
    #[serde(default)]
    pub amount_paid_cents: i64,
    pub currency: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub due_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub hosted_url: Option<String>,
}

impl Invoice {
    pub fn amount_remaining_cents(&self) -> i64 {
        (self.amount_due_cents - self.amount_paid_cents).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
    PartiallyRefunded,
    #[serde(other)]
    Unknown,
}

/// A completed or attempted charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    #[serde(default)]
    pub invoice_id: Option<String>,
    pub amount_cents: i64,
    #[serde(default)]
    pub refunded_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Running account credit (cents)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub balance: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditEntryKind {
    Purchase,
    Grant,
    Usage,
    Refund,
    Adjustment,
    #[serde(other)]
    Unknown,
}

/// One line of the credit ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditEntry {
    pub id: String,
    pub kind: CreditEntryKind,
    /// Signed: negative entries consume credit
    pub amount_cents: i64,
    pub balance_after_cents: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One page of a paginated collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

// =============================================================================
// Usage, settings, analytics
// =============================================================================

/// Current metered usage for the open billing period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(with = "time::serde::rfc3339")]
    pub period_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub period_end: OffsetDateTime,
    pub sms_sent: i64,
    #[serde(default)]
    pub sms_received: i64,
    #[serde(default)]
    pub ai_responses: i64,
    #[serde(default)]
    pub phone_numbers: i64,
    #[serde(default)]
    pub sms_limit: Option<i64>,
    #[serde(default)]
    pub overage_cents: i64,
}

impl Usage {
    /// Share of the SMS allowance consumed, 0.0 when unlimited
    pub fn percentage_used(&self) -> f64 {
        match self.sms_limit {
            Some(limit) if limit > 0 => (self.sms_sent as f64 / limit as f64) * 100.0,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePoint {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub sms_sent: i64,
    #[serde(default)]
    pub sms_received: i64,
    #[serde(default)]
    pub ai_responses: i64,
    #[serde(default)]
    pub cost_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSeries {
    pub granularity: Granularity,
    #[serde(default)]
    pub points: Vec<UsagePoint>,
}

impl UsageSeries {
    pub fn total_sms_sent(&self) -> i64 {
        self.points.iter().map(|p| p.sms_sent).sum()
    }
}

/// Account-level billing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingSettings {
    #[serde(default)]
    pub billing_email: Option<String>,
    #[serde(default)]
    pub auto_pay: bool,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub invoice_prefix: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub low_balance_threshold_cents: Option<i64>,
    #[serde(default)]
    pub usage_alerts_enabled: bool,
}

/// Partial update of [`BillingSettings`]; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingSettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_pay: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_balance_threshold_cents: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_alerts_enabled: Option<bool>,
}

impl BillingSettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyUpdate("billing settings"));
        }
        if let Some(email) = &self.billing_email {
            if !email.contains('@') {
                return Err(ValidationError::InvalidValue {
                    field: "billing_email",
                    reason: format!("'{}' is not an email address", email),
                });
            }
        }
        if matches!(self.low_balance_threshold_cents, Some(t) if t < 0) {
            return Err(ValidationError::InvalidAmount(
                "low balance threshold cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Aggregate statistics over a trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingAnalytics {
    #[serde(with = "iso_date")]
    pub period_start: Date,
    #[serde(with = "iso_date")]
    pub period_end: Date,
    pub total_spent_cents: i64,
    #[serde(default)]
    pub average_monthly_cents: i64,
    #[serde(default)]
    pub total_messages: i64,
    #[serde(default)]
    pub cost_per_message_cents: f64,
    #[serde(default)]
    pub invoices_paid: u32,
    #[serde(default)]
    pub invoices_outstanding: u32,
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_days: Option<u32>,
}

impl CreateSubscriptionRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.plan_id.trim().is_empty() {
            return Err(ValidationError::MissingField("plan_id"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSubscriptionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    /// Prorate the change (server default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prorate: Option<bool>,
}

impl UpdateSubscriptionRequest {
    pub fn is_empty(&self) -> bool {
        self.plan_id.is_none() && self.quantity.is_none() && self.coupon_code.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyUpdate("subscription"));
        }
        if matches!(&self.plan_id, Some(p) if p.trim().is_empty()) {
            return Err(ValidationError::MissingField("plan_id"));
        }
        if self.quantity == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "quantity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddPaymentMethodRequest {
    /// Tokenized instrument from the payment provider's client SDK
    pub token: String,
    #[serde(default)]
    pub set_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_details: Option<BillingDetails>,
}

impl AddPaymentMethodRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.token.trim().is_empty() {
            return Err(ValidationError::MissingField("token"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePaymentMethodRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_month: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_details: Option<BillingDetails>,
}

impl UpdatePaymentMethodRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.exp_month.is_none() && self.exp_year.is_none() && self.billing_details.is_none() {
            return Err(ValidationError::EmptyUpdate("payment method"));
        }
        if matches!(self.exp_month, Some(m) if !(1..=12).contains(&m)) {
            return Err(ValidationError::InvalidValue {
                field: "exp_month",
                reason: "must be between 1 and 12".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessPaymentRequest {
    pub amount_cents: i64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProcessPaymentRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount_cents <= 0 {
            return Err(ValidationError::InvalidAmount(format!(
                "{} cents is not a positive amount",
                self.amount_cents
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(ValidationError::MissingField("currency"));
        }
        Ok(())
    }
}

/// Which records a billing export covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Invoices,
    Payments,
    Usage,
    Credits,
    All,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoices => "invoices",
            Self::Payments => "payments",
            Self::Usage => "usage",
            Self::Credits => "credits",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Pdf => "pdf",
        }
    }

    /// File extension for a downloaded export
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}
