// HTTP device endpoint
//
// Polls a device agent that serves its LLDP local system data as JSON
// (`GET <url>` → `LocalSystemData`). Each poll has its own timeout and
// retry budget; failures land on the error stream and never stop the
// worker. The worker exits when its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

use crate::endpoint::{Endpoint, EndpointStreams, SlotSender, slots};
use crate::error::Error;
use crate::lldp::{LocalSystemData, Snapshot};
use crate::transport::TransportConfig;

/// Default sleep between polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Interval used when a zero interval is configured.
pub const FALLBACK_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for a single HTTP-polled device.
#[derive(Debug, Clone)]
pub struct HttpEndpointConfig {
    /// Device label (also the reconciler's key for this device).
    pub name: String,
    /// Full URL of the device's LLDP document.
    pub url: Url,
    /// Optional bearer token sent as `Authorization: Bearer ...`.
    pub token: Option<SecretString>,
    /// Time between polls.
    pub interval: Duration,
    pub transport: TransportConfig,
}

impl HttpEndpointConfig {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
            token: None,
            interval: DEFAULT_INTERVAL,
            transport: TransportConfig::default(),
        }
    }

    fn effective_interval(&self) -> Duration {
        if self.interval.is_zero() {
            FALLBACK_INTERVAL
        } else {
            self.interval
        }
    }
}

/// Endpoint that polls a device agent over HTTP.
pub struct HttpEndpoint {
    config: HttpEndpointConfig,
    poller: Arc<Poller>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl HttpEndpoint {
    /// Build the endpoint and its HTTP client. Does not start polling.
    pub fn new(config: HttpEndpointConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        if let Some(ref token) = config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|_| Error::Unavailable {
                    device: config.name.clone(),
                    reason: "token contains characters not allowed in a header".into(),
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = config.transport.build_client(headers)?;
        let poller = Arc::new(Poller {
            device: config.name.clone(),
            url: config.url.clone(),
            http,
            transport: config.transport.clone(),
        });

        Ok(Self {
            config,
            poller,
            cancel: CancellationToken::new(),
            worker: None,
        })
    }

    pub fn config(&self) -> &HttpEndpointConfig {
        &self.config
    }

    /// Fetch one snapshot right now, with the configured retry budget.
    pub async fn fetch(&self) -> Result<Snapshot, Error> {
        self.poller.fetch().await
    }
}

impl Endpoint for HttpEndpoint {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn start(&mut self) -> Result<EndpointStreams, Error> {
        if self.worker.is_some() || self.cancel.is_cancelled() {
            return Err(Error::AlreadyStarted {
                device: self.config.name.clone(),
            });
        }

        let (sender, streams) = slots();
        let poller = Arc::clone(&self.poller);
        let interval = self.config.effective_interval();
        let cancel = self.cancel.clone();
        self.worker = Some(tokio::spawn(poll_loop(poller, interval, sender, cancel)));

        debug!(device = %self.config.name, url = %self.config.url, ?interval, "endpoint started");
        Ok(streams)
    }

    fn stop(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!(device = %self.config.name, "stopping endpoint");
            self.cancel.cancel();
        }
    }
}

impl Drop for HttpEndpoint {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Worker ───────────────────────────────────────────────────────────

/// Poll until cancelled, then emit `Stopped` and close both streams.
async fn poll_loop(
    poller: Arc<Poller>,
    period: Duration,
    sender: SlotSender,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = poller.fetch() => result,
                };
                match result {
                    Ok(snapshot) => {
                        trace!(device = %poller.device, partial = snapshot.is_partial(), "snapshot collected");
                        sender.publish_snapshot(snapshot);
                    }
                    Err(e) => {
                        warn!(device = %poller.device, error = %e, "poll failed");
                        sender.publish_error(e);
                    }
                }
                if sender.is_closed() {
                    debug!(device = %poller.device, "no consumers left");
                    break;
                }
            }
        }
    }

    sender.publish_error(Error::Stopped {
        device: poller.device.clone(),
    });
    debug!(device = %poller.device, "endpoint worker exited");
}

// ── Request handling ─────────────────────────────────────────────────

struct Poller {
    device: String,
    url: Url,
    http: reqwest::Client,
    transport: TransportConfig,
}

impl Poller {
    /// One fetch including retries for transient failures.
    async fn fetch(&self) -> Result<Snapshot, Error> {
        let retry = &self.transport.retry;
        let mut attempt: u32 = 0;

        loop {
            match self.fetch_once().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_transient() && attempt < retry.retries => {
                    let delay = retry.backoff(attempt);
                    debug!(device = %self.device, error = %e, attempt, ?delay, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self) -> Result<Snapshot, Error> {
        trace!("GET {}", self.url);
        let timeout_ms = self.transport.timeout_ms();

        let resp = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::from_request(&self.device, e, timeout_ms))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(Error::Unavailable {
                device: self.device.clone(),
                reason: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(Error::Rejected {
                device: self.device.clone(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::from_request(&self.device, e, timeout_ms))?;

        let local: LocalSystemData = serde_json::from_str(&body).map_err(|e| {
            let preview = body.chars().take(200).collect::<String>();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })?;

        Ok(Snapshot::new(local))
    }
}
