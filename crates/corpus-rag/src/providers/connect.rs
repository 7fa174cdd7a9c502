//! Start-up backend acquisition

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::{MonitorConfig, RagConfig};
use crate::error::{Error, Result};

use super::backend::ModelBackend;
use super::ollama::OllamaClient;

/// Build the Ollama client and wait until it answers a health probe.
///
/// Runs once at start-up. Exhausting the attempts is fatal.
pub async fn acquire_backend(config: &RagConfig) -> Result<Arc<OllamaClient>> {
    let client = Arc::new(OllamaClient::new(&config.llm)?);
    tracing::info!("Connecting to Ollama at {}", client.base_url());
    connect_with_backoff(client, &config.monitor).await
}

/// Probe `backend` with exponential backoff until it reports healthy
pub async fn connect_with_backoff<B>(backend: Arc<B>, config: &MonitorConfig) -> Result<Arc<B>>
where
    B: ModelBackend + ?Sized,
{
    let attempts = config.connect_attempts.max(1);

    for attempt in 0..attempts {
        match tokio::time::timeout(config.probe_timeout(), backend.health_check()).await {
            Ok(Ok(true)) => {
                tracing::info!("Model backend '{}' is reachable", backend.name());
                return Ok(backend);
            }
            Ok(Ok(false)) => tracing::warn!("Model backend '{}' reported unhealthy", backend.name()),
            Ok(Err(e)) => tracing::warn!("Model backend probe failed: {}", e),
            Err(_) => tracing::warn!("Model backend probe timed out"),
        }

        if attempt + 1 < attempts {
            let delay = Duration::from_millis(
                config
                    .connect_base_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt)),
            );
            tracing::warn!(
                "Backend not ready (attempt {}/{}), retrying in {:?}",
                attempt + 1,
                attempts,
                delay
            );
            sleep(delay).await;
        }
    }

    Err(Error::fatal(format!(
        "Model backend '{}' unreachable after {} attempts",
        backend.name(),
        attempts
    )))
}
