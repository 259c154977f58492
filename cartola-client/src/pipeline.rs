//! Orchestrator: telemetry capture → token exchange → record fetch →
//! classify/aggregate, strictly sequential, aborting on the first failure.
//! Nothing is retried and nothing partial is returned; the browser session
//! is released inside the capture stage before anything else runs.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::info;

use cartola_core::{DailyLedger, Totals, ledger_totals};

use crate::error::{ClientError, Stage};
use crate::movements::LedgerFetcher;
use crate::telemetry::TelemetryCapture;
use crate::token::TokenExchanger;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-invocation credential bundle. Never persisted; the two client
/// identifiers belong to different endpoints and are not interchangeable.
#[derive(Clone)]
pub struct Credentials {
    /// Login identifier (RUT).
    pub username: String,
    /// Login secret.
    pub password: String,
    /// Client id for the token endpoint.
    pub client_id: String,
    /// Client id for the movements endpoint.
    pub api_client_id: String,
}

impl Credentials {
    /// Name of the first required field that is missing or empty, if any.
    /// Callers reject the request before the pipeline runs.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.username.trim().is_empty() {
            Some("username")
        } else if self.password.trim().is_empty() {
            Some("password")
        } else if self.client_id.trim().is_empty() {
            Some("clientId")
        } else if self.api_client_id.trim().is_empty() {
            Some("apiClientId")
        } else {
            None
        }
    }
}

// Credentials in log output keep an identifier prefix for correlation and
// nothing of the secret.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &redact(&self.username))
            .field("password", &"***")
            .field("client_id", &redact(&self.client_id))
            .field("api_client_id", &redact(&self.api_client_id))
            .finish()
    }
}

fn redact(s: &str) -> String {
    let prefix: String = s.chars().take(4).collect();
    format!("{prefix}…")
}

/// Explicit per-call configuration; there are no process-wide defaults.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Run the browser without a visible window.
    pub headless: bool,
    /// Maximum records to request from the storage endpoint.
    pub limit: u32,
    /// Compute aggregate totals alongside the ledger.
    pub totals: bool,
    /// Optional end-to-end deadline covering all stages.
    pub deadline: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            headless: true,
            limit: 50,
            totals: true,
            deadline: None,
        }
    }
}

/// Successful pipeline result, serialized as the `data` payload of the
/// caller-facing envelope.
#[derive(Debug, Serialize)]
pub struct PipelineOutput {
    pub token: String,
    #[serde(rename = "movimientos")]
    pub ledger: DailyLedger,
    #[serde(rename = "totales", skip_serializing_if = "Option::is_none")]
    pub totals: Option<Totals>,
}

pub struct Pipeline;

impl Pipeline {
    /// Run all stages. On failure the error names the stage it aborted in
    /// (see [`ClientError::stage`]).
    pub async fn run(
        credentials: &Credentials,
        options: &PipelineOptions,
    ) -> Result<PipelineOutput, ClientError> {
        match options.deadline {
            // A firing deadline cancels whatever stage is in flight; a
            // capture session dropped mid-login still releases its browser
            // through its drop guard.
            Some(limit) => timeout(limit, Self::run_stages(credentials, options))
                .await
                .map_err(|_| ClientError::Deadline(limit))?,
            None => Self::run_stages(credentials, options).await,
        }
    }

    async fn run_stages(
        credentials: &Credentials,
        options: &PipelineOptions,
    ) -> Result<PipelineOutput, ClientError> {
        info!("{}: capturing telemetry credential", Stage::Telemetry);
        let telemetry = TelemetryCapture::new(options.headless)
            .run(&credentials.username, &credentials.password)
            .await?;

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ClientError::transport(Stage::Token, e))?;

        info!("{}: exchanging telemetry for an access token", Stage::Token);
        let token = TokenExchanger::new(http.clone())
            .exchange(
                &credentials.username,
                &credentials.password,
                &credentials.client_id,
                &telemetry,
            )
            .await?;

        info!("{}: fetching movement records", Stage::Fetch);
        let fetcher = LedgerFetcher::new(http)?;
        let ledger = fetcher
            .fetch(
                &token,
                &credentials.api_client_id,
                &credentials.username,
                options.limit,
            )
            .await?;
        info!(
            dates = ledger.len(),
            entries = ledger.entry_count(),
            "pipeline complete"
        );

        let totals = options.totals.then(|| ledger_totals(&ledger));

        Ok(PipelineOutput {
            token: token.access_token,
            ledger,
            totals,
        })
    }
}

/// Admission control for embedders running the pipeline as a service.
/// Every run owns an entire browser process, so concurrent invocations
/// are bounded by a fixed number of permits.
#[derive(Clone)]
pub struct PipelineRunner {
    permits: Arc<Semaphore>,
}

impl PipelineRunner {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub async fn run(
        &self,
        credentials: &Credentials,
        options: &PipelineOptions,
    ) -> Result<PipelineOutput, ClientError> {
        // The semaphore is never closed, so acquisition only ever waits.
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("pipeline semaphore closed");
        Pipeline::run(credentials, options).await
    }
}
