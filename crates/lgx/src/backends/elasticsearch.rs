//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! The cluster is RED. The application is fine. The application has no idea the
//! cluster is RED, and that is the whole point of this file. We POST, we time out
//! politely, we shrug, we try again on the next flush. The app keeps logging.
//!
//! 🚀 One batch, one `POST /_bulk`, one newline-delimited body. Connection refused is
//! an outcome, not an error. A bad status or a garbled response is an error; the
//! worker logs it once and throws the batch away.
//!
//! ⏱️ Timeouts are short on purpose: 5s to connect, 15s to read. A stuck backend
//! must never park the consumer thread for long. 🦆

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::backends::{BulkOutcome, Destination, Sink};
use crate::common::LogRecord;
use crate::composers::NdjsonBulkComposer;

const BULK_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// 🚰 ElasticsearchSinkConfig — "What's the DEAL with index names?" — Jerry Seinfeld,
/// if he were a DevOps engineer.
///
/// `port` is a string on purpose: it arrives from config files and env vars written by
/// humans, and validation wants to see exactly what they typed.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ElasticsearchSinkConfig {
    /// 🎚️ The master switch. Off means the whole pipeline stays Stopped.
    pub enabled: bool,
    /// 📡 Host name or IP of the cluster. No scheme, no port.
    pub host: String,
    /// 🔌 Port, as text. Must parse as a positive 16-bit integer.
    pub port: String,
    /// 📦 Target index.
    pub index: String,
    /// 🏷️ Document type for older clusters. Empty or absent means "don't send one".
    pub doc_type: Option<String>,
    /// 🔒 Username. The bouncer at the club. Except the club is a database.
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    pub password: Option<String>,
    /// 🔒 API key — the velvet rope variant of authentication. Wins over basic auth.
    pub api_key: Option<String>,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// 🧹 How long an idle pooled connection may linger before it's closed.
    pub pool_idle_timeout_ms: u64,
}

impl Default for ElasticsearchSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: String::new(),
            index: "syslog".to_string(),
            doc_type: Some("log".to_string()),
            username: None,
            password: None,
            api_key: None,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 15_000,
            pool_idle_timeout_ms: 5_000,
        }
    }
}

impl ElasticsearchSinkConfig {
    /// 🔒 Check the switch, the host and the port. Returns the base URL on success.
    ///
    /// Any failure here is "configuration invalid": the caller keeps the pipeline
    /// Stopped and producers' records become silent discards.
    pub fn validate(&self) -> Result<String> {
        if !self.enabled {
            anyhow::bail!("💤 Log shipping is disabled. Set `enabled = true` to wake it up.");
        }
        let host = self.host.trim();
        if host.is_empty() {
            anyhow::bail!("💀 No Elasticsearch host configured. We can't ship logs to the void.");
        }
        let port: u16 = self.port.trim().parse().with_context(|| {
            format!(
                "💀 Port '{}' is not a number a socket would accept. Ports are 1 to 65535. We checked.",
                self.port
            )
        })?;
        if port == 0 {
            anyhow::bail!("💀 Port 0 means 'any port' to the kernel and 'no port' to us.");
        }
        Ok(format!("http://{host}:{port}"))
    }

    /// 📍 Where batches go, per this config.
    pub fn destination(&self) -> Destination {
        Destination {
            index: self.index.clone(),
            doc_type: self.doc_type.clone().filter(|t| !t.trim().is_empty()),
        }
    }
}

/// 📡 The sink side of the Elasticsearch backend — pure I/O, zero buffering.
///
/// Batching lives upstream in the consumer worker. This struct holds an HTTP client
/// and a URL and knows how to fire one bulk request and read the verdict.
#[derive(Debug)]
pub struct ElasticsearchSink {
    client: reqwest::Client,
    bulk_url: String,
    sink_config: ElasticsearchSinkConfig,
}

/// 📬 The parts of a `_bulk` response we care about. Everything else is ignored.
#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl BulkResponse {
    fn rejected(&self) -> usize {
        if !self.errors {
            return 0;
        }
        self.items
            .iter()
            .filter(|item| {
                item.values()
                    .any(|result| result.error.is_some() || result.status >= 300)
            })
            .count()
    }
}

impl ElasticsearchSink {
    /// 🚀 Validate the config and build the HTTP client. No network traffic happens here:
    /// a cluster that's down at startup is just a cluster that's down, and the first
    /// flush will find out on its own.
    pub fn new(config: ElasticsearchSinkConfig) -> Result<Self> {
        let base_url = config.validate()?;
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let read_timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .timeout(connect_timeout + read_timeout)
            .pool_idle_timeout(Duration::from_millis(config.pool_idle_timeout_ms))
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept. The architect shrugged.")?;

        Ok(Self {
            client,
            bulk_url: format!("{base_url}/_bulk"),
            sink_config: config,
        })
    }

    pub fn bulk_url(&self) -> &str {
        &self.bulk_url
    }

    /// 📡 Fire one `_bulk` POST. Connect failures come back as `BackendUnavailable`.
    ///
    /// 🔄 This function does not retry. The next flush is the retry.
    async fn submit_bulk_request(&self, request_body: String, documents: usize) -> Result<BulkOutcome> {
        let mut request = self
            .client
            .post(&self.bulk_url)
            .header("Content-Type", BULK_CONTENT_TYPE);

        // -- 🔒 api_key beats basic auth in this club
        if let Some(ref api_key) = self.sink_config.api_key {
            request = request.header("Authorization", format!("ApiKey {}", api_key));
        } else if let Some(ref username) = self.sink_config.username {
            request = request.basic_auth(username, self.sink_config.password.as_ref());
        }

        let response = match request.body(request_body).send().await {
            Ok(response) => response,
            Err(err) if err.is_connect() => {
                // -- 🔌 nobody home. not an incident, just a Tuesday.
                trace!("🔌 Elasticsearch unreachable at {}: {}", self.bulk_url, err);
                return Ok(BulkOutcome::BackendUnavailable);
            }
            Err(err) => {
                return Err(err).context(
                    "💀 The bulk request never came back. We launched the payload and the network responded with what can only be described as 'not vibing with it.'",
                );
            }
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .context("💀 Elasticsearch answered, then trailed off mid-sentence.")?;
        if !status.is_success() {
            anyhow::bail!(
                "💀 The bulk request arrived, but Elasticsearch looked at our documents and said '{}'. The body of the response read: '{}'.",
                status,
                body
            );
        }

        let verdict: BulkResponse = serde_json::from_str(&body).with_context(|| {
            format!("💀 Elasticsearch said {status} but the body isn't a bulk response: '{body}'")
        })?;
        let rejected = verdict.rejected();
        if rejected > 0 {
            warn!(
                "⚠️ Elasticsearch rejected {} of {} documents in a bulk request. They're gone; we don't retry.",
                rejected, documents
            );
        } else {
            trace!("🚀 Bulk request landed — {} documents have left the building, Elvis-style", documents);
        }
        Ok(BulkOutcome::Indexed { documents, rejected })
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    async fn bulk_insert(
        &mut self,
        destination: &Destination,
        batch: &[LogRecord],
    ) -> Result<BulkOutcome> {
        if batch.is_empty() {
            return Ok(BulkOutcome::Empty);
        }
        let payload = NdjsonBulkComposer::compose(destination, batch)?;
        debug!(
            "📡 Sending {} records ({} bytes) to {}",
            batch.len(),
            payload.len(),
            self.bulk_url
        );
        self.submit_bulk_request(payload, batch.len()).await
    }
}
