//! HTTP billing gateway configuration and client

use std::time::Duration;

use assistext_shared::{
    AddPaymentMethodRequest, ApiErrorBody, BillingAnalytics, BillingSettings,
    BillingSettingsUpdate, CouponResult, CreateSubscriptionRequest, CreditBalance, CreditEntry,
    ExportFormat, ExportKind, Granularity, Invoice, Page, Payment, PaymentMethod, PortalSession,
    ProcessPaymentRequest, Subscription, SubscriptionPlan, UpdatePaymentMethodRequest,
    UpdateSubscriptionRequest, UpgradePreview, Usage, UsageSeries,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::gateway::BillingGateway;

/// Default timeout for billing API requests (30 seconds)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the billing API
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the AssisText API, e.g. `https://api.assistext.com/api`
    pub base_url: Url,
    /// Bearer token of the signed-in account
    pub api_token: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: &str, api_token: impl Into<String>) -> BillingResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BillingError::Config(format!("Invalid API URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BillingError::Config(format!(
                "API URL '{}' cannot be used as a base URL",
                base_url
            )));
        }
        Ok(Self {
            base_url,
            api_token: api_token.into(),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let base_url = std::env::var("ASSISTEXT_API_URL")
            .map_err(|_| BillingError::Config("ASSISTEXT_API_URL not set".to_string()))?;
        let api_token = std::env::var("ASSISTEXT_API_TOKEN")
            .map_err(|_| BillingError::Config("ASSISTEXT_API_TOKEN not set".to_string()))?;

        let mut config = Self::new(&base_url, api_token)?;
        if let Some(ms) = std::env::var("ASSISTEXT_API_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`BillingGateway`] backed by the AssisText REST API
#[derive(Clone)]
pub struct HttpBillingGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpBillingGateway {
    /// Create a new gateway from config
    pub fn new(config: GatewayConfig) -> BillingResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| BillingError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Create a new gateway from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build `{base_url}/billing/{segments...}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> BillingResult<Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BillingError::Config("API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push("billing")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> BillingResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(&self.config.api_token)
            .header("X-Request-Id", Uuid::new_v4().to_string())
            .header("Accept", "application/json"))
    }

    /// Send a request and turn non-2xx responses into errors
    async fn execute(&self, builder: RequestBuilder) -> BillingResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        let parsed: ApiErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let message = parsed
            .text()
            .map(str::to_string)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());

        tracing::warn!(
            status = %status,
            path = %url,
            code = ?parsed.code,
            "Billing API request failed"
        );

        Err(match status {
            StatusCode::UNAUTHORIZED => BillingError::Unauthorized(message),
            StatusCode::NOT_FOUND => BillingError::NotFound(message),
            _ => BillingError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> BillingResult<T> {
        let response = self.execute(builder).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn binary(&self, builder: RequestBuilder) -> BillingResult<Vec<u8>> {
        let response = self.execute(builder).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn page_query(page: u32, page_size: u32) -> [(&'static str, String); 2] {
    [("page", page.to_string()), ("page_size", page_size.to_string())]
}

#[async_trait]
impl BillingGateway for HttpBillingGateway {
    async fn get_current_subscription(&self) -> BillingResult<Option<Subscription>> {
        let builder = self.request(Method::GET, &["subscription"])?;
        let response = match self.execute(builder).await {
            Ok(response) => response,
            // No subscription yet
            Err(BillingError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_subscription_plans(&self) -> BillingResult<Vec<SubscriptionPlan>> {
        self.json(self.request(Method::GET, &["plans"])?).await
    }

    async fn create_subscription(&self, data: &CreateSubscriptionRequest) -> BillingResult<Subscription> {
        self.json(self.request(Method::POST, &["subscription"])?.json(data))
            .await
    }

    async fn update_subscription(
        &self,
        id: &str,
        data: &UpdateSubscriptionRequest,
    ) -> BillingResult<Subscription> {
        self.json(self.request(Method::PUT, &["subscription", id])?.json(data))
            .await
    }

    async fn cancel_subscription(
        &self,
        id: &str,
        reason: Option<&str>,
        at_period_end: bool,
    ) -> BillingResult<Subscription> {
        let body = json!({ "reason": reason, "at_period_end": at_period_end });
        self.json(self.request(Method::POST, &["subscription", id, "cancel"])?.json(&body))
            .await
    }

    async fn resume_subscription(&self, id: &str) -> BillingResult<Subscription> {
        self.json(self.request(Method::POST, &["subscription", id, "resume"])?)
            .await
    }

    async fn pause_subscription(
        &self,
        id: &str,
        pause_until: Option<OffsetDateTime>,
    ) -> BillingResult<Subscription> {
        let pause_until = pause_until
            .map(|t| t.format(&time::format_description::well_known::Rfc3339))
            .transpose()
            .map_err(|e| BillingError::InvalidInput(format!("Invalid pause date: {}", e)))?;
        let body = json!({ "pause_until": pause_until });
        self.json(self.request(Method::POST, &["subscription", id, "pause"])?.json(&body))
            .await
    }

    async fn get_payment_methods(&self) -> BillingResult<Vec<PaymentMethod>> {
        self.json(self.request(Method::GET, &["payment-methods"])?).await
    }

    async fn add_payment_method(&self, data: &AddPaymentMethodRequest) -> BillingResult<PaymentMethod> {
        self.json(self.request(Method::POST, &["payment-methods"])?.json(data))
            .await
    }

    async fn update_payment_method(
        &self,
        id: &str,
        data: &UpdatePaymentMethodRequest,
    ) -> BillingResult<PaymentMethod> {
        self.json(self.request(Method::PUT, &["payment-methods", id])?.json(data))
            .await
    }

    async fn delete_payment_method(&self, id: &str) -> BillingResult<()> {
        self.execute(self.request(Method::DELETE, &["payment-methods", id])?)
            .await?;
        Ok(())
    }

    async fn set_default_payment_method(&self, id: &str) -> BillingResult<PaymentMethod> {
        self.json(self.request(Method::POST, &["payment-methods", id, "default"])?)
            .await
    }

    async fn get_invoices(&self, page: u32, page_size: u32) -> BillingResult<Page<Invoice>> {
        let builder = self
            .request(Method::GET, &["invoices"])?
            .query(&page_query(page, page_size));
        self.json(builder).await
    }

    async fn get_payment_history(&self, page: u32, page_size: u32) -> BillingResult<Page<Payment>> {
        let builder = self
            .request(Method::GET, &["payments"])?
            .query(&page_query(page, page_size));
        self.json(builder).await
    }

    async fn download_invoice(&self, id: &str) -> BillingResult<Vec<u8>> {
        let builder = self
            .request(Method::GET, &["invoices", id, "download"])?
            .header("Accept", "application/pdf");
        self.binary(builder).await
    }

    async fn process_payment(&self, data: &ProcessPaymentRequest) -> BillingResult<Payment> {
        self.json(self.request(Method::POST, &["payments"])?.json(data))
            .await
    }

    async fn pay_invoice(&self, id: &str, payment_method_id: Option<&str>) -> BillingResult<Payment> {
        let body = json!({ "payment_method_id": payment_method_id });
        self.json(self.request(Method::POST, &["invoices", id, "pay"])?.json(&body))
            .await
    }

    async fn refund_payment(
        &self,
        id: &str,
        amount_cents: Option<i64>,
        reason: Option<&str>,
    ) -> BillingResult<Payment> {
        let body = json!({ "amount_cents": amount_cents, "reason": reason });
        self.json(self.request(Method::POST, &["payments", id, "refund"])?.json(&body))
            .await
    }

    async fn get_current_usage(&self) -> BillingResult<Usage> {
        self.json(self.request(Method::GET, &["usage"])?).await
    }

    async fn get_usage_history(
        &self,
        start_date: Date,
        end_date: Date,
        granularity: Granularity,
    ) -> BillingResult<UsageSeries> {
        let builder = self.request(Method::GET, &["usage", "history"])?.query(&[
            ("start_date", start_date.to_string()),
            ("end_date", end_date.to_string()),
            ("granularity", granularity.as_str().to_string()),
        ]);
        self.json(builder).await
    }

    async fn get_billing_settings(&self) -> BillingResult<BillingSettings> {
        self.json(self.request(Method::GET, &["settings"])?).await
    }

    async fn update_billing_settings(&self, data: &BillingSettingsUpdate) -> BillingResult<BillingSettings> {
        self.json(self.request(Method::PUT, &["settings"])?.json(data))
            .await
    }

    async fn get_billing_analytics(&self, start_date: Date, end_date: Date) -> BillingResult<BillingAnalytics> {
        let builder = self.request(Method::GET, &["analytics"])?.query(&[
            ("start_date", start_date.to_string()),
            ("end_date", end_date.to_string()),
        ]);
        self.json(builder).await
    }

    async fn get_credit_balance(&self) -> BillingResult<CreditBalance> {
        self.json(self.request(Method::GET, &["credits"])?).await
    }

    async fn get_credit_history(&self, page: u32, page_size: u32) -> BillingResult<Page<CreditEntry>> {
        let builder = self
            .request(Method::GET, &["credits", "history"])?
            .query(&page_query(page, page_size));
        self.json(builder).await
    }

    async fn validate_coupon(&self, code: &str, plan_id: Option<&str>) -> BillingResult<CouponResult> {
        let body = json!({ "code": code, "plan_id": plan_id });
        self.json(self.request(Method::POST, &["coupons", "validate"])?.json(&body))
            .await
    }

    async fn get_billing_portal_url(&self, return_url: Option<&str>) -> BillingResult<PortalSession> {
        let body = json!({ "return_url": return_url });
        self.json(self.request(Method::POST, &["portal"])?.json(&body))
            .await
    }

    async fn export_billing_data(&self, kind: ExportKind, format: ExportFormat) -> BillingResult<Vec<u8>> {
        let builder = self
            .request(Method::GET, &["export"])?
            .query(&[("type", kind.as_str()), ("format", format.as_str())])
            .header("Accept", "*/*");
        self.binary(builder).await
    }

    async fn compare_plans(&self, plan_ids: &[String]) -> BillingResult<Vec<SubscriptionPlan>> {
        let body = json!({ "plan_ids": plan_ids });
        self.json(self.request(Method::POST, &["plans", "compare"])?.json(&body))
            .await
    }

    async fn get_upgrade_preview(&self, from_plan_id: &str, to_plan_id: &str) -> BillingResult<UpgradePreview> {
        let builder = self
            .request(Method::GET, &["upgrade-preview"])?
            .query(&[("from_plan_id", from_plan_id), ("to_plan_id", to_plan_id)]);
        self.json(builder).await
    }
}
