use crate::core::{CheckoutPresenter, WalletSheet};
use crate::domain::model::PaymentRequest;
use crate::utils::error::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use url::Url;

/// Stands in for the platform sheet when replaying events from a file:
/// every presentation succeeds and is logged.
#[derive(Debug, Default)]
pub struct LoggingSheet;

#[async_trait]
impl WalletSheet for LoggingSheet {
    async fn present(&self, request: PaymentRequest) -> Result<bool> {
        tracing::info!(
            "📱 Presenting wallet sheet for {} ({} {}, {} shipping method(s))",
            request.merchant_identifier,
            request
                .summary
                .last()
                .map(|total| total.amount.amount.to_string())
                .unwrap_or_default(),
            request.currency_code,
            request.shipping_methods.len()
        );
        for line in &request.summary {
            tracing::debug!("  {}: {}", line.label, line.amount.amount);
        }
        Ok(true)
    }

    async fn dismiss(&self) {
        tracing::info!("📱 Wallet sheet dismissed");
    }
}

/// Prints the checkout hand-off and remembers it for the exit report.
#[derive(Debug, Default)]
pub struct StdoutPresenter {
    handed_off: Mutex<Vec<Url>>,
}

impl StdoutPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn handed_off(&self) -> Vec<Url> {
        self.handed_off.lock().await.clone()
    }
}

#[async_trait]
impl CheckoutPresenter for StdoutPresenter {
    async fn present(&self, url: Url) {
        println!("🔗 Continue checkout at: {}", url);
        self.handed_off.lock().await.push(url);
    }
}
