//! AssisText Billing Client
//!
//! Client-side billing state and actions: a cached, self-refreshing view of
//! subscription, payment, usage and credit data, plus every billing write
//! with consistent cache invalidation and user notifications.

pub mod cache;
pub mod client;
pub mod config;
pub mod downloads;
pub mod error;
pub mod facade;
pub mod gateway;
pub mod mutations;
pub mod notify;
pub mod query;
pub mod realtime;
pub mod refresh;
pub mod resources;

pub use cache::{should_refetch, ResourceEntry, ResourceStore, StoreEvent, StoreStats};
pub use client::{GatewayConfig, HttpBillingGateway};
pub use config::BillingOptions;
pub use downloads::{DirectorySink, DownloadSink};
pub use error::{BillingError, BillingResult};
pub use facade::{BillingFacade, BillingFacadeBuilder, BillingSnapshot, RefreshReport, ResourceState, TrackedResources};
pub use gateway::BillingGateway;
pub use mutations::MutationKind;
pub use notify::{ChannelNotifier, MemoryNotifier, Notification, NotificationLevel, NotificationSink, TracingNotifier};
pub use realtime::BillingEvent;
pub use resources::{InvalidationScope, ResourceKey, ResourcePolicy, ResourceValue};
