//! Shared fixtures for billing integration tests
//!
//! [`FakeGateway`] keeps an in-memory account, counts every call and can be
//! told to fail or hold individual operations.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use assistext_billing::{BillingError, BillingGateway, BillingResult};
use assistext_shared::{
    AddPaymentMethodRequest, BillingAnalytics, BillingInterval, BillingSettings,
    BillingSettingsUpdate, CouponResult, CreateSubscriptionRequest, CreditBalance, CreditEntry,
    ExportFormat, ExportKind, Granularity, Invoice, InvoiceStatus, Page, Payment, PaymentMethod,
    PaymentStatus, PortalSession, ProcessPaymentRequest, Subscription, SubscriptionPlan,
    SubscriptionStatus, UpdatePaymentMethodRequest, UpdateSubscriptionRequest, UpgradePreview,
    Usage, UsageSeries,
};
use async_trait::async_trait;
use time::macros::{date, datetime};
use time::{Date, OffsetDateTime};
use tokio::sync::Semaphore;

pub const TODAY: Date = date!(2026 - 10 - 19);

// ============================================================================
// Fixtures
// ============================================================================

pub fn subscription(plan_id: &str) -> Subscription {
    Subscription {
        id: "sub_1".to_string(),
        plan_id: plan_id.to_string(),
        status: SubscriptionStatus::Active,
        current_period_start: datetime!(2026-10-01 0:00 UTC),
        current_period_end: datetime!(2026-11-01 0:00 UTC),
        cancel_at_period_end: false,
        canceled_at: None,
        paused_until: None,
        trial_end: None,
    }
}

pub fn plan(id: &str, price_cents: i64) -> SubscriptionPlan {
    SubscriptionPlan {
        id: id.to_string(),
        name: id.to_uppercase(),
        description: None,
        price_cents,
        currency: "usd".to_string(),
        interval: BillingInterval::Month,
        sms_limit: Some(1000),
        phone_number_limit: Some(1),
        features: vec!["ai_responses".to_string()],
        is_active: true,
    }
}

pub fn card(id: &str, is_default: bool) -> PaymentMethod {
    PaymentMethod {
        id: id.to_string(),
        kind: "card".to_string(),
        brand: Some("visa".to_string()),
        last4: Some("4242".to_string()),
        exp_month: Some(12),
        exp_year: Some(2030),
        is_default,
        created_at: datetime!(2026-01-15 12:00 UTC),
    }
}

pub fn invoice(id: &str, status: InvoiceStatus) -> Invoice {
    Invoice {
        id: id.to_string(),
        number: Some(format!("AT-{}", id)),
        status,
        amount_due_cents: 2900,
        amount_paid_cents: if status == InvoiceStatus::Paid { 2900 } else { 0 },
        currency: "usd".to_string(),
        due_date: None,
        created_at: datetime!(2026-10-01 0:00 UTC),
        hosted_url: None,
    }
}

pub fn usage(sms_sent: i64) -> Usage {
    Usage {
        period_start: datetime!(2026-10-01 0:00 UTC),
        period_end: datetime!(2026-11-01 0:00 UTC),
        sms_sent,
        sms_received: 0,
        ai_responses: 0,
        phone_numbers: 1,
        sms_limit: Some(1000),
        overage_cents: 0,
    }
}

pub fn settings() -> BillingSettings {
    BillingSettings {
        billing_email: Some("billing@example.com".to_string()),
        auto_pay: true,
        currency: "usd".to_string(),
        invoice_prefix: None,
        tax_id: None,
        low_balance_threshold_cents: None,
        usage_alerts_enabled: false,
    }
}

fn payment(id: &str, amount_cents: i64, invoice_id: Option<&str>) -> Payment {
    Payment {
        id: id.to_string(),
        invoice_id: invoice_id.map(str::to_string),
        amount_cents,
        refunded_cents: 0,
        currency: "usd".to_string(),
        status: PaymentStatus::Succeeded,
        payment_method_id: None,
        failure_reason: None,
        created_at: OffsetDateTime::now_utc(),
    }
}

fn page<T: Clone>(items: &[T], page: u32, page_size: u32) -> Page<T> {
    let start = (page.saturating_sub(1) * page_size) as usize;
    Page {
        items: items.iter().skip(start).take(page_size as usize).cloned().collect(),
        page,
        page_size,
        total: items.len() as u64,
    }
}

// ============================================================================
// Fake gateway
// ============================================================================

/// Server-side account state held by the fake
#[derive(Debug, Clone)]
pub struct Account {
    pub subscription: Option<Subscription>,
    pub plans: Vec<SubscriptionPlan>,
    pub payment_methods: Vec<PaymentMethod>,
    pub invoices: Vec<Invoice>,
    pub payments: Vec<Payment>,
    pub usage: Usage,
    pub settings: BillingSettings,
    pub credit_balance: i64,
    pub credits: Vec<CreditEntry>,
    pub invoice_pdfs: HashMap<String, Vec<u8>>,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            subscription: Some(subscription("starter")),
            plans: vec![plan("starter", 2900), plan("pro", 7900)],
            payment_methods: vec![card("pm_1", true), card("pm_2", false), card("pm_3", false)],
            invoices: vec![invoice("inv_100", InvoiceStatus::Open), invoice("inv_99", InvoiceStatus::Paid)],
            payments: vec![payment("pay_1", 2900, Some("inv_99"))],
            usage: usage(120),
            settings: settings(),
            credit_balance: 1500,
            credits: Vec::new(),
            invoice_pdfs: HashMap::from([("inv_100".to_string(), b"%PDF-1.7 inv_100".to_vec())]),
        }
    }
}

#[derive(Default)]
pub struct FakeGateway {
    account: Mutex<Account>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, BillingError>>,
    gates: Mutex<HashMap<&'static str, Arc<Semaphore>>>,
}

impl FakeGateway {
    pub fn new(account: Account) -> Arc<Self> {
        Arc::new(Self {
            account: Mutex::new(account),
            ..Default::default()
        })
    }

    /// Make `op` fail with `error` until [`FakeGateway::recover`] is called
    pub fn fail(&self, op: &'static str, error: BillingError) {
        self.failures.lock().unwrap().insert(op, error);
    }

    pub fn recover(&self, op: &'static str) {
        self.failures.lock().unwrap().remove(op);
    }

    /// Park every later call to `op` until [`FakeGateway::release`]
    pub fn hold(&self, op: &'static str) {
        self.gates.lock().unwrap().insert(op, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, op: &'static str) {
        if let Some(gate) = self.gates.lock().unwrap().remove(op) {
            gate.close();
        }
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn with_account<R>(&self, f: impl FnOnce(&mut Account) -> R) -> R {
        f(&mut self.account.lock().unwrap())
    }

    async fn call(&self, op: &'static str) -> BillingResult<()> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        let gate = self.gates.lock().unwrap().get(op).cloned();
        if let Some(gate) = gate {
            // Closed on release
            let _ = gate.acquire().await;
        }
        match self.failures.lock().unwrap().get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn require_subscription(&self, id: &str) -> BillingResult<Subscription> {
        self.with_account(|a| a.subscription.clone())
            .filter(|s| s.id == id)
            .ok_or_else(|| BillingError::NotFound("Subscription".to_string()))
    }

    fn store_subscription(&self, subscription: Subscription) -> Subscription {
        self.with_account(|a| a.subscription = Some(subscription.clone()));
        subscription
    }
}

#[async_trait]
impl BillingGateway for FakeGateway {
    async fn get_current_subscription(&self) -> BillingResult<Option<Subscription>> {
        self.call("get_current_subscription").await?;
        Ok(self.with_account(|a| a.subscription.clone()))
    }

    async fn get_subscription_plans(&self) -> BillingResult<Vec<SubscriptionPlan>> {
        self.call("get_subscription_plans").await?;
        Ok(self.with_account(|a| a.plans.clone()))
    }

    async fn create_subscription(&self, data: &CreateSubscriptionRequest) -> BillingResult<Subscription> {
        self.call("create_subscription").await?;
        Ok(self.store_subscription(subscription(&data.plan_id)))
    }

    async fn update_subscription(
        &self,
        id: &str,
        data: &UpdateSubscriptionRequest,
    ) -> BillingResult<Subscription> {
        self.call("update_subscription").await?;
        let mut subscription = self.require_subscription(id)?;
        if let Some(plan_id) = &data.plan_id {
            subscription.plan_id = plan_id.clone();
        }
        Ok(self.store_subscription(subscription))
    }

    async fn cancel_subscription(
        &self,
        id: &str,
        _reason: Option<&str>,
        at_period_end: bool,
    ) -> BillingResult<Subscription> {
        self.call("cancel_subscription").await?;
        let mut subscription = self.require_subscription(id)?;
        subscription.cancel_at_period_end = at_period_end;
        if !at_period_end {
            subscription.status = SubscriptionStatus::Canceled;
            subscription.canceled_at = Some(OffsetDateTime::now_utc());
        }
        Ok(self.store_subscription(subscription))
    }

    async fn resume_subscription(&self, id: &str) -> BillingResult<Subscription> {
        self.call("resume_subscription").await?;
        let mut subscription = self.require_subscription(id)?;
        subscription.status = SubscriptionStatus::Active;
        subscription.paused_until = None;
        subscription.cancel_at_period_end = false;
        Ok(self.store_subscription(subscription))
    }

    async fn pause_subscription(
        &self,
        id: &str,
        pause_until: Option<OffsetDateTime>,
    ) -> BillingResult<Subscription> {
        self.call("pause_subscription").await?;
        let mut subscription = self.require_subscription(id)?;
        subscription.status = SubscriptionStatus::Paused;
        subscription.paused_until = pause_until;
        Ok(self.store_subscription(subscription))
    }

    async fn get_payment_methods(&self) -> BillingResult<Vec<PaymentMethod>> {
        self.call("get_payment_methods").await?;
        Ok(self.with_account(|a| a.payment_methods.clone()))
    }

    async fn add_payment_method(&self, data: &AddPaymentMethodRequest) -> BillingResult<PaymentMethod> {
        self.call("add_payment_method").await?;
        Ok(self.with_account(|a| {
            let method = card(&format!("pm_{}", a.payment_methods.len() + 1), data.set_default);
            if data.set_default {
                a.payment_methods.iter_mut().for_each(|m| m.is_default = false);
            }
            a.payment_methods.push(method.clone());
            method
        }))
    }

    async fn update_payment_method(
        &self,
        id: &str,
        data: &UpdatePaymentMethodRequest,
    ) -> BillingResult<PaymentMethod> {
        self.call("update_payment_method").await?;
        self.with_account(|a| {
            let method = a
                .payment_methods
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| BillingError::NotFound("Payment method".to_string()))?;
            if data.exp_month.is_some() {
                method.exp_month = data.exp_month;
            }
            if data.exp_year.is_some() {
                method.exp_year = data.exp_year;
            }
            Ok(method.clone())
        })
    }

    async fn delete_payment_method(&self, id: &str) -> BillingResult<()> {
        self.call("delete_payment_method").await?;
        self.with_account(|a| {
            let before = a.payment_methods.len();
            a.payment_methods.retain(|m| m.id != id);
            if a.payment_methods.len() == before {
                return Err(BillingError::NotFound("Payment method".to_string()));
            }
            Ok(())
        })
    }

    async fn set_default_payment_method(&self, id: &str) -> BillingResult<PaymentMethod> {
        self.call("set_default_payment_method").await?;
        self.with_account(|a| {
            if !a.payment_methods.iter().any(|m| m.id == id) {
                return Err(BillingError::NotFound("Payment method".to_string()));
            }
            for method in &mut a.payment_methods {
                method.is_default = method.id == id;
            }
            a.payment_methods
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| BillingError::NotFound("Payment method".to_string()))
        })
    }

    async fn get_invoices(&self, page_no: u32, page_size: u32) -> BillingResult<Page<Invoice>> {
        self.call("get_invoices").await?;
        Ok(self.with_account(|a| page(&a.invoices, page_no, page_size)))
    }

    async fn get_payment_history(&self, page_no: u32, page_size: u32) -> BillingResult<Page<Payment>> {
        self.call("get_payment_history").await?;
        Ok(self.with_account(|a| page(&a.payments, page_no, page_size)))
    }

    async fn download_invoice(&self, id: &str) -> BillingResult<Vec<u8>> {
        self.call("download_invoice").await?;
        self.with_account(|a| a.invoice_pdfs.get(id).cloned())
            .ok_or_else(|| BillingError::NotFound("Invoice".to_string()))
    }

    async fn process_payment(&self, data: &ProcessPaymentRequest) -> BillingResult<Payment> {
        self.call("process_payment").await?;
        Ok(self.with_account(|a| {
            let created = payment(&format!("pay_{}", a.payments.len() + 1), data.amount_cents, None);
            a.payments.push(created.clone());
            created
        }))
    }

    async fn pay_invoice(&self, id: &str, _payment_method_id: Option<&str>) -> BillingResult<Payment> {
        self.call("pay_invoice").await?;
        self.with_account(|a| {
            let invoice = a
                .invoices
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or_else(|| BillingError::NotFound("Invoice".to_string()))?;
            invoice.status = InvoiceStatus::Paid;
            invoice.amount_paid_cents = invoice.amount_due_cents;
            let created = payment(
                &format!("pay_{}", a.payments.len() + 1),
                invoice.amount_due_cents,
                Some(id),
            );
            a.payments.push(created.clone());
            Ok(created)
        })
    }

    async fn refund_payment(
        &self,
        id: &str,
        amount_cents: Option<i64>,
        _reason: Option<&str>,
    ) -> BillingResult<Payment> {
        self.call("refund_payment").await?;
        self.with_account(|a| {
            let payment = a
                .payments
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| BillingError::NotFound("Payment".to_string()))?;
            payment.refunded_cents = amount_cents.unwrap_or(payment.amount_cents);
            payment.status = if payment.refunded_cents >= payment.amount_cents {
                PaymentStatus::Refunded
            } else {
                PaymentStatus::PartiallyRefunded
            };
            Ok(payment.clone())
        })
    }

    async fn get_current_usage(&self) -> BillingResult<Usage> {
        self.call("get_current_usage").await?;
        Ok(self.with_account(|a| a.usage.clone()))
    }

    async fn get_usage_history(
        &self,
        _start_date: Date,
        _end_date: Date,
        granularity: Granularity,
    ) -> BillingResult<UsageSeries> {
        self.call("get_usage_history").await?;
        Ok(UsageSeries {
            granularity,
            points: Vec::new(),
        })
    }

    async fn get_billing_settings(&self) -> BillingResult<BillingSettings> {
        self.call("get_billing_settings").await?;
        Ok(self.with_account(|a| a.settings.clone()))
    }

    async fn update_billing_settings(&self, data: &BillingSettingsUpdate) -> BillingResult<BillingSettings> {
        self.call("update_billing_settings").await?;
        Ok(self.with_account(|a| {
            if let Some(email) = &data.billing_email {
                a.settings.billing_email = Some(email.clone());
            }
            if let Some(auto_pay) = data.auto_pay {
                a.settings.auto_pay = auto_pay;
            }
            a.settings.clone()
        }))
    }

    async fn get_billing_analytics(&self, start_date: Date, end_date: Date) -> BillingResult<BillingAnalytics> {
        self.call("get_billing_analytics").await?;
        Ok(BillingAnalytics {
            period_start: start_date,
            period_end: end_date,
            total_spent_cents: 8700,
            average_monthly_cents: 2900,
            total_messages: 360,
            cost_per_message_cents: 24.1,
            invoices_paid: 3,
            invoices_outstanding: 1,
        })
    }

    async fn get_credit_balance(&self) -> BillingResult<CreditBalance> {
        self.call("get_credit_balance").await?;
        Ok(self.with_account(|a| CreditBalance {
            balance: a.credit_balance,
            currency: "usd".to_string(),
        }))
    }

    async fn get_credit_history(&self, page_no: u32, page_size: u32) -> BillingResult<Page<CreditEntry>> {
        self.call("get_credit_history").await?;
        Ok(self.with_account(|a| page(&a.credits, page_no, page_size)))
    }

    async fn validate_coupon(&self, code: &str, _plan_id: Option<&str>) -> BillingResult<CouponResult> {
        self.call("validate_coupon").await?;
        let valid = code == "WELCOME20";
        Ok(CouponResult {
            valid,
            code: code.to_string(),
            percent_off: valid.then_some(20.0),
            amount_off_cents: None,
            duration: valid.then(|| "once".to_string()),
            message: (!valid).then(|| "Coupon not found".to_string()),
        })
    }

    async fn get_billing_portal_url(&self, _return_url: Option<&str>) -> BillingResult<PortalSession> {
        self.call("get_billing_portal_url").await?;
        Ok(PortalSession {
            url: "https://billing.example.com/session/abc".to_string(),
        })
    }

    async fn export_billing_data(&self, kind: ExportKind, format: ExportFormat) -> BillingResult<Vec<u8>> {
        self.call("export_billing_data").await?;
        Ok(format!("{},{}\n", kind.as_str(), format.as_str()).into_bytes())
    }

    async fn compare_plans(&self, plan_ids: &[String]) -> BillingResult<Vec<SubscriptionPlan>> {
        self.call("compare_plans").await?;
        Ok(self.with_account(|a| {
            a.plans
                .iter()
                .filter(|p| plan_ids.contains(&p.id))
                .cloned()
                .collect()
        }))
    }

    async fn get_upgrade_preview(&self, from_plan_id: &str, to_plan_id: &str) -> BillingResult<UpgradePreview> {
        self.call("get_upgrade_preview").await?;
        Ok(UpgradePreview {
            from_plan_id: from_plan_id.to_string(),
            to_plan_id: to_plan_id.to_string(),
            prorated_amount_cents: 2500,
            next_invoice_total_cents: 7900,
            currency: "usd".to_string(),
            effective_date: OffsetDateTime::now_utc(),
        })
    }
}
