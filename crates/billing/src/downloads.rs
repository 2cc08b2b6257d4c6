//! Invoice and billing export downloads
//!
//! Both flows fetch a binary payload and hand it to a [`DownloadSink`] under
//! a deterministic file name. Outcomes are reported only through the
//! notification sink; callers never see an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assistext_shared::{ExportFormat, ExportKind};
use async_trait::async_trait;

use crate::error::{BillingError, BillingResult};
use crate::gateway::BillingGateway;
use crate::notify::{Notification, NotificationSink};

/// File name for a downloaded invoice
pub fn invoice_file_name(invoice_id: &str) -> String {
    format!("invoice_{}.pdf", sanitize(invoice_id))
}

/// File name for a billing data export
pub fn export_file_name(kind: ExportKind, format: ExportFormat) -> String {
    format!("billing_{}_export.{}", kind.as_str(), format.extension())
}

// Ids come from the API; keep them from escaping the download directory
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Destination for downloaded files
#[async_trait]
pub trait DownloadSink: Send + Sync {
    /// Persist `bytes` under `file_name`, returning where it went
    async fn save(&self, file_name: &str, bytes: &[u8]) -> BillingResult<PathBuf>;
}

/// Writes downloads into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> BillingResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// Runs download flows
pub struct Downloader {
    gateway: Arc<dyn BillingGateway>,
    sink: Arc<dyn DownloadSink>,
    notifier: Arc<dyn NotificationSink>,
}

impl Downloader {
    pub fn new(
        gateway: Arc<dyn BillingGateway>,
        sink: Arc<dyn DownloadSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            gateway,
            sink,
            notifier,
        }
    }

    /// Download an invoice PDF as `invoice_{id}.pdf`
    pub async fn download_invoice(&self, invoice_id: &str) -> Option<PathBuf> {
        let result = async {
            if invoice_id.trim().is_empty() {
                return Err(BillingError::InvalidInput("Invoice id is required".to_string()));
            }
            let bytes = self.gateway.download_invoice(invoice_id).await?;
            self.sink.save(&invoice_file_name(invoice_id), &bytes).await
        }
        .await;

        self.report(result, "Invoice downloaded", "Failed to download invoice")
    }

    /// Export billing data as `billing_{kind}_export.{ext}`
    pub async fn export_billing_data(&self, kind: ExportKind, format: ExportFormat) -> Option<PathBuf> {
        let result = async {
            let bytes = self.gateway.export_billing_data(kind, format).await?;
            self.sink.save(&export_file_name(kind, format), &bytes).await
        }
        .await;

        self.report(result, "Billing data exported", "Failed to export billing data")
    }

    fn report(&self, result: BillingResult<PathBuf>, success: &str, failure: &str) -> Option<PathBuf> {
        match result {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Billing download saved");
                self.notifier.notify(Notification::success(success));
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Billing download failed");
                self.notifier
                    .notify(Notification::error(format!("{}: {}", failure, e.user_message())));
                None
            }
        }
    }
}
