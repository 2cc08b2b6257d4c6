//! Remote billing gateway interface

use assistext_shared::{
    AddPaymentMethodRequest, BillingAnalytics, BillingSettings, BillingSettingsUpdate,
    CouponResult, CreateSubscriptionRequest, CreditBalance, CreditEntry, ExportFormat, ExportKind,
    Granularity, Invoice, Page, Payment, PaymentMethod, PortalSession, ProcessPaymentRequest,
    Subscription, SubscriptionPlan, UpdatePaymentMethodRequest, UpdateSubscriptionRequest,
    UpgradePreview, Usage, UsageSeries,
};
use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use crate::error::BillingResult;

/// CRUD surface of the AssisText billing API.
///
/// [`crate::HttpBillingGateway`] is the production implementation; tests
/// plug in fakes.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    // Subscriptions
    async fn get_current_subscription(&self) -> BillingResult<Option<Subscription>>;
    async fn get_subscription_plans(&self) -> BillingResult<Vec<SubscriptionPlan>>;
    async fn create_subscription(&self, data: &CreateSubscriptionRequest) -> BillingResult<Subscription>;
    async fn update_subscription(
        &self,
        id: &str,
        data: &UpdateSubscriptionRequest,
    ) -> BillingResult<Subscription>;
    async fn cancel_subscription(
        &self,
        id: &str,
        reason: Option<&str>,
        at_period_end: bool,
    ) -> BillingResult<Subscription>;
    async fn resume_subscription(&self, id: &str) -> BillingResult<Subscription>;
    async fn pause_subscription(
        &self,
        id: &str,
        pause_until: Option<OffsetDateTime>,
    ) -> BillingResult<Subscription>;

    // Payment methods
    async fn get_payment_methods(&self) -> BillingResult<Vec<PaymentMethod>>;
    async fn add_payment_method(&self, data: &AddPaymentMethodRequest) -> BillingResult<PaymentMethod>;
    async fn update_payment_method(
        &self,
        id: &str,
        data: &UpdatePaymentMethodRequest,
    ) -> BillingResult<PaymentMethod>;
    async fn delete_payment_method(&self, id: &str) -> BillingResult<()>;
    async fn set_default_payment_method(&self, id: &str) -> BillingResult<PaymentMethod>;

    // Invoices and payments
    async fn get_invoices(&self, page: u32, page_size: u32) -> BillingResult<Page<Invoice>>;
    async fn get_payment_history(&self, page: u32, page_size: u32) -> BillingResult<Page<Payment>>;
    async fn download_invoice(&self, id: &str) -> BillingResult<Vec<u8>>;
    async fn process_payment(&self, data: &ProcessPaymentRequest) -> BillingResult<Payment>;
    async fn pay_invoice(&self, id: &str, payment_method_id: Option<&str>) -> BillingResult<Payment>;
    async fn refund_payment(
        &self,
        id: &str,
        amount_cents: Option<i64>,
        reason: Option<&str>,
    ) -> BillingResult<Payment>;

    // Usage, settings, analytics
    async fn get_current_usage(&self) -> BillingResult<Usage>;
    async fn get_usage_history(
        &self,
        start_date: Date,
        end_date: Date,
        granularity: Granularity,
    ) -> BillingResult<UsageSeries>;
    async fn get_billing_settings(&self) -> BillingResult<BillingSettings>;
    async fn update_billing_settings(&self, data: &BillingSettingsUpdate) -> BillingResult<BillingSettings>;
    async fn get_billing_analytics(&self, start_date: Date, end_date: Date) -> BillingResult<BillingAnalytics>;

    // Credits
    async fn get_credit_balance(&self) -> BillingResult<CreditBalance>;
    async fn get_credit_history(&self, page: u32, page_size: u32) -> BillingResult<Page<CreditEntry>>;

    // Misc
    async fn validate_coupon(&self, code: &str, plan_id: Option<&str>) -> BillingResult<CouponResult>;
    async fn get_billing_portal_url(&self, return_url: Option<&str>) -> BillingResult<PortalSession>;
    async fn export_billing_data(&self, kind: ExportKind, format: ExportFormat) -> BillingResult<Vec<u8>>;
    async fn compare_plans(&self, plan_ids: &[String]) -> BillingResult<Vec<SubscriptionPlan>>;
    async fn get_upgrade_preview(&self, from_plan_id: &str, to_plan_id: &str) -> BillingResult<UpgradePreview>;
}
