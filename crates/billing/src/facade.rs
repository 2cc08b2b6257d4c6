//! Billing facade
//!
//! Aggregates the independently cached billing resources into one read
//! model and exposes every billing action behind a single handle. Clones
//! share state; dropping the last clone stops background work.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use assistext_shared::{
    default_payment_method, AddPaymentMethodRequest, BillingAnalytics, BillingSettings,
    BillingSettingsUpdate, CouponResult, CreateSubscriptionRequest, CreditBalance, CreditEntry,
    ExportFormat, ExportKind, Granularity, Invoice, Page, Payment, PaymentMethod,
    ProcessPaymentRequest, Subscription, SubscriptionPlan, UpdatePaymentMethodRequest,
    UpdateSubscriptionRequest, UpgradePreview, Usage, UsageSeries,
};
use futures::future::join_all;
use futures::{Stream, StreamExt};
use time::{Date, Duration as TimeDuration, OffsetDateTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cache::{ResourceEntry, ResourceStore, StoreEvent};
use crate::config::BillingOptions;
use crate::downloads::{DirectorySink, DownloadSink, Downloader};
use crate::error::{BillingError, BillingResult};
use crate::gateway::BillingGateway;
use crate::mutations::{MutationCoordinator, MutationKind};
use crate::notify::{NotificationSink, TracingNotifier};
use crate::query::QueryClient;
use crate::realtime::{self, BillingEvent};
use crate::refresh::AutoRefresher;
use crate::resources::{FromResource, ResourceKey, ResourcePolicy, ResourceValue};

/// Page size for the eagerly loaded first page of paginated resources
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Trailing window of the usage history chart
const USAGE_HISTORY_DAYS: i64 = 30;

/// Trailing window of billing analytics
const ANALYTICS_DAYS: i64 = 90;

// =============================================================================
// Read model
// =============================================================================

/// Typed view of one cached resource
#[derive(Debug, Clone)]
pub struct ResourceState<T> {
    pub data: Option<T>,
    pub error: Option<BillingError>,
    pub is_loading: bool,
    pub is_stale: bool,
    pub last_fetched_at: Option<Instant>,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            is_stale: true,
            last_fetched_at: None,
        }
    }
}

impl<T: FromResource> ResourceState<T> {
    fn from_entry(entry: Option<&ResourceEntry>, now: Instant) -> Self {
        match entry {
            Some(entry) => Self {
                data: entry.data.as_ref().and_then(T::from_resource),
                error: entry.error.clone(),
                is_loading: entry.is_loading,
                is_stale: entry.is_stale(now),
                last_fetched_at: entry.last_fetched_at,
            },
            None => Self::default(),
        }
    }
}

impl<T> ResourceState<T> {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Consistent view over every billing resource
#[derive(Debug, Clone, Default)]
pub struct BillingSnapshot {
    pub subscription: ResourceState<Option<Subscription>>,
    pub plans: ResourceState<Vec<SubscriptionPlan>>,
    pub payment_methods: ResourceState<Vec<PaymentMethod>>,
    pub invoices: ResourceState<Page<Invoice>>,
    pub payments: ResourceState<Page<Payment>>,
    pub usage: ResourceState<Usage>,
    pub usage_history: ResourceState<UsageSeries>,
    pub settings: ResourceState<BillingSettings>,
    pub analytics: ResourceState<BillingAnalytics>,
    pub credit_balance: ResourceState<CreditBalance>,
    pub credit_history: ResourceState<Page<CreditEntry>>,
    /// A [`BillingFacade::refresh_all`] is running
    pub is_refreshing: bool,
}

impl BillingSnapshot {
    pub fn current_subscription(&self) -> Option<&Subscription> {
        self.subscription.data.as_ref().and_then(Option::as_ref)
    }

    pub fn default_payment_method(&self) -> Option<&PaymentMethod> {
        self.payment_methods
            .data
            .as_deref()
            .and_then(default_payment_method)
    }

    /// Credit balance in cents, zero until loaded
    pub fn credit_balance(&self) -> i64 {
        self.credit_balance
            .data
            .as_ref()
            .map(|c| c.balance)
            .unwrap_or(0)
    }

    /// The resources gating first paint are in flight, or a full refresh is running
    pub fn is_loading(&self) -> bool {
        self.subscription.is_loading || self.payment_methods.is_loading || self.is_refreshing
    }

    /// The last subscription fetch failed
    pub fn is_error(&self) -> bool {
        self.subscription.is_error()
    }

    pub fn error(&self) -> Option<&BillingError> {
        self.subscription.error.as_ref()
    }
}

/// Outcome of [`BillingFacade::refresh_all`]
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub refreshed: Vec<ResourceKey>,
    pub failed: Vec<(ResourceKey, BillingError)>,
}

impl RefreshReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// Tracked resources
// =============================================================================

/// Concrete keys the facade reads, parameterized at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedResources {
    pub invoices: ResourceKey,
    pub payments: ResourceKey,
    pub usage_history: ResourceKey,
    pub analytics: ResourceKey,
    pub credit_history: ResourceKey,
}

impl TrackedResources {
    pub fn for_date(today: Date) -> Self {
        Self {
            invoices: ResourceKey::Invoices {
                page: 1,
                page_size: DEFAULT_PAGE_SIZE,
            },
            payments: ResourceKey::Payments {
                page: 1,
                page_size: DEFAULT_PAGE_SIZE,
            },
            usage_history: ResourceKey::UsageHistory {
                start: today - TimeDuration::days(USAGE_HISTORY_DAYS),
                end: today,
                granularity: Granularity::Daily,
            },
            analytics: ResourceKey::Analytics {
                start: today - TimeDuration::days(ANALYTICS_DAYS),
                end: today,
            },
            credit_history: ResourceKey::CreditHistory {
                page: 1,
                page_size: DEFAULT_PAGE_SIZE,
            },
        }
    }

    pub fn all(&self) -> Vec<ResourceKey> {
        vec![
            ResourceKey::Subscription,
            ResourceKey::Plans,
            ResourceKey::PaymentMethods,
            self.invoices.clone(),
            self.payments.clone(),
            ResourceKey::Usage,
            self.usage_history.clone(),
            ResourceKey::Settings,
            self.analytics.clone(),
            ResourceKey::CreditBalance,
            self.credit_history.clone(),
        ]
    }

    pub fn volatile(&self) -> Vec<ResourceKey> {
        self.all()
            .into_iter()
            .filter(|key| ResourcePolicy::for_key(key).volatile)
            .collect()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builds a [`BillingFacade`]
pub struct BillingFacadeBuilder {
    gateway: Arc<dyn BillingGateway>,
    notifier: Arc<dyn NotificationSink>,
    downloads: Arc<dyn DownloadSink>,
    store: Option<ResourceStore>,
    options: BillingOptions,
    today: Option<Date>,
}

impl BillingFacadeBuilder {
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn downloads(mut self, sink: Arc<dyn DownloadSink>) -> Self {
        self.downloads = sink;
        self
    }

    /// Share an existing store instead of creating a fresh one
    pub fn store(mut self, store: ResourceStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn options(mut self, options: BillingOptions) -> Self {
        self.options = options;
        self
    }

    /// Anchor date for the usage history and analytics windows (defaults to today, UTC)
    pub fn today(mut self, today: Date) -> Self {
        self.today = Some(today);
        self
    }

    /// Build the facade. With `auto_refresh` on this spawns polling tasks,
    /// so it must run inside a tokio runtime.
    pub fn build(self) -> BillingFacade {
        let store = self.store.unwrap_or_default();
        let query = QueryClient::new(self.gateway.clone(), store, self.options.query_retries);
        let tracked =
            TrackedResources::for_date(self.today.unwrap_or_else(|| OffsetDateTime::now_utc().date()));

        let auto_refresh = self
            .options
            .auto_refresh
            .then(|| AutoRefresher::start(&query, tracked.volatile(), self.options.refresh_interval));

        BillingFacade {
            inner: Arc::new(FacadeInner {
                mutations: MutationCoordinator::new(query.clone(), self.notifier.clone()),
                downloads: Downloader::new(self.gateway, self.downloads, self.notifier),
                query,
                options: self.options,
                tracked,
                refreshing: AtomicUsize::new(0),
                auto_refresh: Mutex::new(auto_refresh),
                background: Mutex::new(Vec::new()),
            }),
        }
    }
}

// =============================================================================
// Facade
// =============================================================================

struct FacadeInner {
    query: QueryClient,
    mutations: MutationCoordinator,
    downloads: Downloader,
    options: BillingOptions,
    tracked: TrackedResources,
    refreshing: AtomicUsize,
    auto_refresh: Mutex<Option<AutoRefresher>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for FacadeInner {
    fn drop(&mut self) {
        let handles = self.background.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in handles.drain(..) {
            handle.abort();
        }
    }
}

/// Decrements the refresh counter when a refresh ends, even on cancellation
struct RefreshGuard<'a>(&'a AtomicUsize);

impl<'a> RefreshGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Billing state and actions for one signed-in account
#[derive(Clone)]
pub struct BillingFacade {
    inner: Arc<FacadeInner>,
}

impl BillingFacade {
    /// Start building a facade over `gateway`.
    ///
    /// Defaults: fresh store, [`TracingNotifier`], downloads to the system
    /// temp directory, [`BillingOptions::default`].
    pub fn builder(gateway: Arc<dyn BillingGateway>) -> BillingFacadeBuilder {
        BillingFacadeBuilder {
            gateway,
            notifier: Arc::new(TracingNotifier),
            downloads: Arc::new(DirectorySink::new(std::env::temp_dir())),
            store: None,
            options: BillingOptions::default(),
            today: None,
        }
    }

    pub fn store(&self) -> &ResourceStore {
        self.inner.query.store()
    }

    pub fn options(&self) -> &BillingOptions {
        &self.inner.options
    }

    pub fn tracked(&self) -> &TrackedResources {
        &self.inner.tracked
    }

    fn gateway(&self) -> &dyn BillingGateway {
        self.inner.query.gateway().as_ref()
    }

    /// Observe cache changes
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store().subscribe()
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.inner
            .auto_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(AutoRefresher::is_running)
    }

    /// Stop background polling and event streams started by this facade
    pub fn shutdown(&self) {
        if let Some(mut refresher) = self
            .inner
            .auto_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            refresher.stop();
        }
        for handle in self
            .inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            handle.abort();
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    fn state<T: FromResource>(&self, key: &ResourceKey, now: Instant) -> ResourceState<T> {
        ResourceState::from_entry(self.store().entry(key).as_ref(), now)
    }

    /// Current cached view, without fetching
    pub fn snapshot(&self) -> BillingSnapshot {
        let now = Instant::now();
        let tracked = &self.inner.tracked;
        BillingSnapshot {
            subscription: self.state(&ResourceKey::Subscription, now),
            plans: self.state(&ResourceKey::Plans, now),
            payment_methods: self.state(&ResourceKey::PaymentMethods, now),
            invoices: self.state(&tracked.invoices, now),
            payments: self.state(&tracked.payments, now),
            usage: self.state(&ResourceKey::Usage, now),
            usage_history: self.state(&tracked.usage_history, now),
            settings: self.state(&ResourceKey::Settings, now),
            analytics: self.state(&tracked.analytics, now),
            credit_balance: self.state(&ResourceKey::CreditBalance, now),
            credit_history: self.state(&tracked.credit_history, now),
            is_refreshing: self.inner.refreshing.load(Ordering::Acquire) > 0,
        }
    }

    async fn read<T: FromResource>(&self, key: &ResourceKey) -> ResourceState<T> {
        let entry = self.inner.query.ensure(key).await;
        ResourceState::from_entry(entry.as_ref(), Instant::now())
    }

    /// Fetch every resource that is missing or stale, in parallel
    pub async fn load(&self) -> BillingSnapshot {
        let keys = self.inner.tracked.all();
        join_all(keys.iter().map(|key| self.inner.query.ensure(key))).await;
        self.snapshot()
    }

    pub async fn subscription(&self) -> ResourceState<Option<Subscription>> {
        self.read(&ResourceKey::Subscription).await
    }

    pub async fn plans(&self) -> ResourceState<Vec<SubscriptionPlan>> {
        self.read(&ResourceKey::Plans).await
    }

    pub async fn payment_methods(&self) -> ResourceState<Vec<PaymentMethod>> {
        self.read(&ResourceKey::PaymentMethods).await
    }

    pub async fn invoices(&self) -> ResourceState<Page<Invoice>> {
        self.read(&self.inner.tracked.invoices).await
    }

    pub async fn payments(&self) -> ResourceState<Page<Payment>> {
        self.read(&self.inner.tracked.payments).await
    }

    pub async fn usage(&self) -> ResourceState<Usage> {
        self.read(&ResourceKey::Usage).await
    }

    pub async fn usage_history(&self) -> ResourceState<UsageSeries> {
        self.read(&self.inner.tracked.usage_history).await
    }

    pub async fn settings(&self) -> ResourceState<BillingSettings> {
        self.read(&ResourceKey::Settings).await
    }

    pub async fn analytics(&self) -> ResourceState<BillingAnalytics> {
        self.read(&self.inner.tracked.analytics).await
    }

    pub async fn credit_balance_state(&self) -> ResourceState<CreditBalance> {
        self.read(&ResourceKey::CreditBalance).await
    }

    pub async fn credit_history(&self) -> ResourceState<Page<CreditEntry>> {
        self.read(&self.inner.tracked.credit_history).await
    }

    /// Default payment method from the cached list
    pub fn default_payment_method(&self) -> Option<PaymentMethod> {
        self.snapshot().default_payment_method().cloned()
    }

    /// Credit balance in cents from the cache, zero until loaded
    pub fn credit_balance(&self) -> i64 {
        self.snapshot().credit_balance()
    }

    /// Refetch every tracked resource in parallel.
    ///
    /// Waits for all fetches to settle; one failure does not stop the others.
    pub async fn refresh_all(&self) -> RefreshReport {
        let _guard = RefreshGuard::new(&self.inner.refreshing);
        let keys = self.inner.tracked.all();
        let results = join_all(keys.iter().map(|key| self.inner.query.refetch(key))).await;

        let mut report = RefreshReport::default();
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(_) => report.refreshed.push(key),
                Err(e) => report.failed.push((key, e)),
            }
        }

        tracing::info!(
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            "Refreshed billing data"
        );
        report
    }

    // -------------------------------------------------------------------------
    // Subscription actions
    // -------------------------------------------------------------------------

    /// The loaded subscription, without fetching
    fn require_subscription(&self) -> BillingResult<Subscription> {
        match self.store().entry(&ResourceKey::Subscription).and_then(|e| e.data) {
            Some(ResourceValue::Subscription(Some(subscription))) => Ok(subscription),
            _ => Err(BillingError::NoActiveSubscription),
        }
    }

    pub async fn create_subscription(&self, request: CreateSubscriptionRequest) -> BillingResult<Subscription> {
        self.inner
            .mutations
            .execute(MutationKind::CreateSubscription, async {
                request.validate()?;
                self.gateway().create_subscription(&request).await
            })
            .await
    }

    pub async fn update_subscription(&self, request: UpdateSubscriptionRequest) -> BillingResult<Subscription> {
        self.inner
            .mutations
            .execute(MutationKind::UpdateSubscription, async {
                let subscription = self.require_subscription()?;
                request.validate()?;
                self.gateway()
                    .update_subscription(&subscription.id, &request)
                    .await
            })
            .await
    }

    pub async fn cancel_subscription(
        &self,
        reason: Option<&str>,
        at_period_end: bool,
    ) -> BillingResult<Subscription> {
        self.inner
            .mutations
            .execute(MutationKind::CancelSubscription, async {
                let subscription = self.require_subscription()?;
                self.gateway()
                    .cancel_subscription(&subscription.id, reason, at_period_end)
                    .await
            })
            .await
    }

    pub async fn resume_subscription(&self) -> BillingResult<Subscription> {
        self.inner
            .mutations
            .execute(MutationKind::ResumeSubscription, async {
                let subscription = self.require_subscription()?;
                self.gateway().resume_subscription(&subscription.id).await
            })
            .await
    }

    pub async fn pause_subscription(&self, pause_until: Option<OffsetDateTime>) -> BillingResult<Subscription> {
        self.inner
            .mutations
            .execute(MutationKind::PauseSubscription, async {
                let subscription = self.require_subscription()?;
                if let Some(until) = pause_until {
                    if until <= OffsetDateTime::now_utc() {
                        return Err(BillingError::InvalidInput(
                            "Pause end date must be in the future".to_string(),
                        ));
                    }
                }
                self.gateway()
                    .pause_subscription(&subscription.id, pause_until)
                    .await
            })
            .await
    }

    /// Move the subscription to another plan, prorated
    pub async fn upgrade_subscription(&self, plan_id: &str) -> BillingResult<Subscription> {
        self.inner
            .mutations
            .execute(MutationKind::UpgradeSubscription, async {
                let subscription = self.require_subscription()?;
                if subscription.plan_id == plan_id {
                    return Err(BillingError::InvalidInput(format!(
                        "Already subscribed to plan '{}'",
                        plan_id
                    )));
                }
                let request = UpdateSubscriptionRequest {
                    plan_id: Some(plan_id.to_string()),
                    prorate: Some(true),
                    ..Default::default()
                };
                request.validate()?;
                self.gateway()
                    .update_subscription(&subscription.id, &request)
                    .await
            })
            .await
    }

    // -------------------------------------------------------------------------
    // Payment method actions
    // -------------------------------------------------------------------------

    pub async fn add_payment_method(&self, request: AddPaymentMethodRequest) -> BillingResult<PaymentMethod> {
        self.inner
            .mutations
            .execute(MutationKind::AddPaymentMethod, async {
                request.validate()?;
                self.gateway().add_payment_method(&request).await
            })
            .await
    }

    pub async fn update_payment_method(
        &self,
        id: &str,
        request: UpdatePaymentMethodRequest,
    ) -> BillingResult<PaymentMethod> {
        self.inner
            .mutations
            .execute(MutationKind::UpdatePaymentMethod, async {
                require_id("Payment method", id)?;
                request.validate()?;
                self.gateway().update_payment_method(id, &request).await
            })
            .await
    }

    pub async fn delete_payment_method(&self, id: &str) -> BillingResult<()> {
        self.inner
            .mutations
            .execute(MutationKind::DeletePaymentMethod, async {
                require_id("Payment method", id)?;
                self.gateway().delete_payment_method(id).await
            })
            .await
    }

    pub async fn set_default_payment_method(&self, id: &str) -> BillingResult<PaymentMethod> {
        self.inner
            .mutations
            .execute(MutationKind::SetDefaultPaymentMethod, async {
                require_id("Payment method", id)?;
                self.gateway().set_default_payment_method(id).await
            })
            .await
    }

    // -------------------------------------------------------------------------
    // Payment actions
    // -------------------------------------------------------------------------

    pub async fn process_payment(&self, request: ProcessPaymentRequest) -> BillingResult<Payment> {
        self.inner
            .mutations
            .execute(MutationKind::ProcessPayment, async {
                request.validate()?;
                self.gateway().process_payment(&request).await
            })
            .await
    }

    pub async fn pay_invoice(&self, invoice_id: &str, payment_method_id: Option<&str>) -> BillingResult<Payment> {
        self.inner
            .mutations
            .execute(MutationKind::PayInvoice, async {
                require_id("Invoice", invoice_id)?;
                self.gateway().pay_invoice(invoice_id, payment_method_id).await
            })
            .await
    }

    /// Refund a payment, fully when `amount_cents` is `None`
    pub async fn refund_payment(
        &self,
        payment_id: &str,
        amount_cents: Option<i64>,
        reason: Option<&str>,
    ) -> BillingResult<Payment> {
        self.inner
            .mutations
            .execute(MutationKind::RefundPayment, async {
                require_id("Payment", payment_id)?;
                if matches!(amount_cents, Some(amount) if amount <= 0) {
                    return Err(BillingError::InvalidInput(
                        "Refund amount must be positive".to_string(),
                    ));
                }
                self.gateway()
                    .refund_payment(payment_id, amount_cents, reason)
                    .await
            })
            .await
    }

    pub async fn update_settings(&self, update: BillingSettingsUpdate) -> BillingResult<BillingSettings> {
        self.inner
            .mutations
            .execute(MutationKind::UpdateSettings, async {
                update.validate()?;
                self.gateway().update_billing_settings(&update).await
            })
            .await
    }

    // -------------------------------------------------------------------------
    // One-shot lookups
    // -------------------------------------------------------------------------

    pub async fn validate_coupon(&self, code: &str, plan_id: Option<&str>) -> BillingResult<CouponResult> {
        let code = code.trim();
        if code.is_empty() {
            return Err(BillingError::InvalidInput("Coupon code is required".to_string()));
        }
        self.gateway().validate_coupon(code, plan_id).await
    }

    /// URL of the hosted billing portal
    pub async fn billing_portal_url(&self, return_url: Option<&str>) -> BillingResult<String> {
        Ok(self.gateway().get_billing_portal_url(return_url).await?.url)
    }

    pub async fn compare_plans(&self, plan_ids: &[String]) -> BillingResult<Vec<SubscriptionPlan>> {
        if plan_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.gateway().compare_plans(plan_ids).await
    }

    /// Proration quote for moving the loaded subscription to `to_plan_id`
    pub async fn upgrade_preview(&self, to_plan_id: &str) -> BillingResult<UpgradePreview> {
        let subscription = self.require_subscription()?;
        self.gateway()
            .get_upgrade_preview(&subscription.plan_id, to_plan_id)
            .await
    }

    // -------------------------------------------------------------------------
    // Downloads
    // -------------------------------------------------------------------------

    /// Save the invoice PDF as `invoice_{id}.pdf`. Failures are only notified.
    pub async fn download_invoice(&self, invoice_id: &str) -> Option<PathBuf> {
        self.inner.downloads.download_invoice(invoice_id).await
    }

    /// Save a billing export. Failures are only notified.
    pub async fn export_billing_data(&self, kind: ExportKind, format: ExportFormat) -> Option<PathBuf> {
        self.inner.downloads.export_billing_data(kind, format).await
    }

    // -------------------------------------------------------------------------
    // Real-time updates
    // -------------------------------------------------------------------------

    /// Apply a pushed update. Ignored unless real-time is enabled.
    pub fn apply_event(&self, event: BillingEvent) -> bool {
        if !self.inner.options.enable_real_time {
            tracing::debug!(event = event.event_type(), "Real-time disabled, ignoring billing event");
            return false;
        }
        realtime::apply_event(&self.inner.query, event);
        true
    }

    /// Consume a stream of pushed updates on a background task.
    ///
    /// Returns false (and drops the stream) when real-time is disabled.
    pub fn attach_events<S>(&self, events: S) -> bool
    where
        S: Stream<Item = BillingEvent> + Send + 'static,
    {
        if !self.inner.options.enable_real_time {
            tracing::debug!("Real-time disabled, not attaching billing event stream");
            return false;
        }

        let query = self.inner.query.clone();
        let handle = tokio::spawn(async move {
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                if query.store().is_closed() {
                    break;
                }
                realtime::apply_event(&query, event);
            }
            tracing::debug!("Billing event stream ended");
        });

        self.inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        true
    }
}

fn require_id(what: &str, id: &str) -> BillingResult<()> {
    if id.trim().is_empty() {
        return Err(BillingError::InvalidInput(format!("{} id is required", what)));
    }
    Ok(())
}
