//! HTTP POST delivery.
//!
//! Posts `{"recipient": ..., "message": ..., ...extra}` as JSON to a fixed
//! endpoint, optionally with a bearer token. A non-2xx status or a transport
//! failure is logged and reported as `None`; nothing is retried here.

use crate::config::HttpConfig;
use crate::message::RelayRecord;
use crate::relay::{DeliveryOutcome, DeliverySink};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{error, info};

pub struct HttpSender {
    client: reqwest::Client,
    url: String,
    auth_token: Option<String>,
    timeout: Duration,
    /// Fields merged into every request body.
    defaults: Map<String, Value>,
}

impl std::fmt::Debug for HttpSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSender")
            .field("url", &self.url)
            .field("auth", &self.auth_token.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpSender {
    pub fn new(url: impl Into<String>, auth_token: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            auth_token: auth_token.filter(|t| !t.is_empty()),
            timeout,
            defaults: Map::new(),
        }
    }

    /// Build a sender from the `[http]` section. Returns `None` without a URL.
    pub fn from_config(config: &HttpConfig) -> Option<Self> {
        let url = config.url.as_ref()?;
        let mut sender = Self::new(url.clone(), config.auth_token.clone(), config.timeout());
        sender.defaults = config
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Some(sender)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// JSON body for one message. Extra fields override the standard ones.
    pub fn body(&self, recipient: &str, message: &str, extra: &Map<String, Value>) -> Value {
        let mut data = self.defaults.clone();
        data.insert("recipient".into(), Value::String(recipient.to_string()));
        data.insert("message".into(), Value::String(message.to_string()));
        data.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Value::Object(data)
    }

    pub fn build_request(
        &self,
        recipient: &str,
        message: &str,
        extra: &Map<String, Value>,
    ) -> reqwest::Result<reqwest::Request> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&self.body(recipient, message, extra));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        request.build()
    }

    /// POST one message. Returns the status on success, `None` on any failure.
    pub async fn send_sms(
        &self,
        recipient: &str,
        message: &str,
        extra: &Map<String, Value>,
    ) -> Option<StatusCode> {
        let result = match self.build_request(recipient, message, extra) {
            Ok(request) => self.client.execute(request).await,
            Err(e) => Err(e),
        };

        match result.and_then(|resp| resp.error_for_status()) {
            Ok(resp) => {
                info!("SMS for {} posted to {}", recipient, self.url);
                Some(resp.status())
            }
            Err(e) => {
                error!("Failed to post SMS for {}: {}", recipient, e);
                None
            }
        }
    }
}

#[async_trait]
impl DeliverySink for HttpSender {
    fn name(&self) -> &str {
        "http"
    }

    async fn deliver(&self, record: &RelayRecord) -> DeliveryOutcome {
        let mut extra = Map::new();
        extra.insert("timestamp".into(), Value::from(record.timestamp));

        match self.send_sms(&record.sender, &record.body, &extra).await {
            Some(_) => DeliveryOutcome::Delivered {
                topic: self.url.clone(),
            },
            None => DeliveryOutcome::NotDelivered {
                reason: format!("POST to {} failed", self.url),
            },
        }
    }

    async fn shutdown(&self) {}
}
