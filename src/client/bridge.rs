//! Session bridge client.
//!
//! Talks JSON over HTTP to a local process that holds the actual Steam
//! connection. Commands are plain POSTs; lifecycle events are long-polled
//! from `GET /events` and forwarded onto a channel.

use crate::client::{Credentials, EntitlementClient, PersonaState, SessionEvent};
use crate::models::{FreebieError, Result, SessionConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Consecutive failed polls before the session is declared lost.
const MAX_POLL_FAILURES: u32 = 3;

#[derive(Debug, Serialize)]
struct PersonaRequest {
    state: u8,
}

#[derive(Debug, Serialize)]
struct AppIdsRequest<'a> {
    app_ids: &'a [u32],
}

#[derive(Debug, Deserialize)]
struct LicenseResponse {
    #[serde(default)]
    granted: Vec<u32>,
}

/// HTTP client for the session bridge.
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    event_wait: Duration,
    /// Base of the exponential wait between failed polls
    poll_backoff: Duration,
}

impl BridgeClient {
    /// Create a new bridge client.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FreebieError::Network)?;

        Ok(Self {
            client,
            base_url: config.bridge_url.trim_end_matches('/').to_string(),
            timeout,
            event_wait: Duration::from_secs(config.event_wait_secs),
            poll_backoff: Duration::from_secs(1),
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(path, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(FreebieError::Bridge(format!(
                "{path} returned {status}: {message}"
            )));
        }
        Ok(response)
    }

    fn transport_error(&self, path: &str, e: reqwest::Error) -> FreebieError {
        if e.is_timeout() {
            FreebieError::Timeout(self.timeout)
        } else {
            FreebieError::Bridge(format!("{path}: {e}"))
        }
    }

    async fn poll_events(&self) -> Result<Vec<SessionEvent>> {
        let url = format!("{}/events", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("wait", self.event_wait.as_secs())])
            .timeout(self.event_wait + self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error("/events", e))?;

        if !response.status().is_success() {
            return Err(FreebieError::Bridge(format!(
                "/events returned {}",
                response.status().as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FreebieError::ParseError(format!("Invalid event batch: {e}")))
    }

    /// Forward bridge events onto `tx` until the receiver goes away.
    ///
    /// Losing the bridge is reported as a terminal [`SessionEvent::Error`].
    pub fn spawn_event_pump(self: &Arc<Self>, tx: mpsc::Sender<SessionEvent>) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let mut failures = 0u32;
            loop {
                match bridge.poll_events().await {
                    Ok(events) => {
                        failures = 0;
                        for event in events {
                            debug!(?event, "Session event received");
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        warn!(error = %e, failures = failures, "Event poll failed");
                        if failures >= MAX_POLL_FAILURES {
                            let _ = tx
                                .send(SessionEvent::Error {
                                    message: format!("Session bridge lost: {e}"),
                                })
                                .await;
                            return;
                        }
                        tokio::time::sleep(bridge.poll_backoff * 2u32.pow(failures)).await;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl EntitlementClient for BridgeClient {
    async fn connect(&self, credentials: &Credentials) -> Result<()> {
        self.post("/logon", credentials).await?;
        Ok(())
    }

    async fn set_presence(&self, state: PersonaState) -> Result<()> {
        self.post("/persona", &PersonaRequest { state: state.0 })
            .await?;
        Ok(())
    }

    async fn set_active_products(&self, app_ids: &[u32]) -> Result<()> {
        self.post("/games-played", &AppIdsRequest { app_ids }).await?;
        Ok(())
    }

    async fn request_free_licenses(&self, app_ids: &[u32]) -> Result<Vec<u32>> {
        let response = self.post("/licenses", &AppIdsRequest { app_ids }).await?;
        let body: LicenseResponse = response
            .json()
            .await
            .map_err(|e| FreebieError::ParseError(format!("Invalid license response: {e}")))?;
        Ok(body.granted)
    }
}
