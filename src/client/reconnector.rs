use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::broker::message::CONNECTED_EVENT;
use crate::broker::topic::TopicKey;
use crate::client::decoder::{EventDecoder, RawEvent};
use crate::client::policy::ReconnectPolicy;
use crate::utils::error::ClientError;

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;
type AnyHandler = Arc<dyn Fn(&str, &Value) + Send + Sync>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Long-lived consumer of a `pollcast` event stream.
///
/// Connections are strictly sequential: a new one is only opened after the
/// previous one has been dropped. Any transport failure (refused connection,
/// 5xx, broken or finished body) is followed by a reconnect after
/// `ReconnectPolicy::delay`, and so is any non-success status other than
/// 400. The attempt counter resets whenever the server acknowledges a
/// connection. A 400 answer means the handshake itself was rejected and is
/// returned instead of retried.
pub struct Reconnector {
    url: Url,
    policy: ReconnectPolicy,
    http: reqwest::Client,
    handlers: HashMap<String, Handler>,
    any: Option<AnyHandler>,
}

impl Reconnector {
    pub fn new(url: &str, policy: ReconnectPolicy) -> Result<Self, ClientError> {
        let url = Url::parse(url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            url,
            policy,
            http,
            handlers: HashMap::new(),
            any: None,
        })
    }

    /// Builds the stream URL for a topic from the endpoint URL.
    pub fn for_topic(
        endpoint: &str,
        topic: &TopicKey,
        username: &str,
        variant: &str,
        policy: ReconnectPolicy,
    ) -> Result<Self, ClientError> {
        let mut url = Url::parse(endpoint).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(project) = &topic.project {
                query.append_pair("project", project);
            }
            query
                .append_pair("display_mode", if topic.display_mode { "true" } else { "false" })
                .append_pair("username", username)
                .append_pair("variant", variant);
        }
        Self::new(url.as_str(), policy)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Registers the handler for one event name, replacing any earlier one.
    pub fn on<F>(mut self, event: &str, handler: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.handlers.insert(event.to_string(), Arc::new(handler));
        self
    }

    /// Called for every event, after the named handler.
    pub fn on_any<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.any = Some(Arc::new(handler));
        self
    }

    /// Streams until `enabled` turns false (`Ok`) or the server rejects the
    /// handshake (`Err(ClientError::Rejected)`).
    pub async fn run(&self, mut enabled: watch::Receiver<bool>) -> Result<(), ClientError> {
        let mut attempt: u32 = 0;

        loop {
            if !*enabled.borrow_and_update() {
                info!(url = %self.url, "stream disabled");
                return Ok(());
            }

            let err = tokio::select! {
                err = self.connect(&mut attempt) => err,
                _ = disabled(&mut enabled) => {
                    info!(url = %self.url, "stream disabled, connection closed");
                    return Ok(());
                }
            };
            if let ClientError::Rejected { .. } = err {
                warn!(url = %self.url, "{err}");
                return Err(err);
            }

            let delay = self.policy.delay(attempt);
            attempt = attempt.saturating_add(1);
            warn!(url = %self.url, attempt, ?delay, "stream lost: {err}; reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = disabled(&mut enabled) => {
                    info!(url = %self.url, "stream disabled");
                    return Ok(());
                }
            }
        }
    }

    /// One connection, from request to the end of the body. Always ends in
    /// an error: a stream that finishes cleanly is still a lost stream.
    async fn connect(&self, attempt: &mut u32) -> ClientError {
        match self.stream(attempt).await {
            Ok(()) => ClientError::Ended,
            Err(e) => e,
        }
    }

    async fn stream(&self, attempt: &mut u32) -> Result<(), ClientError> {
        let response = self
            .http
            .get(self.url.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        // only 400 is final; 408, 429 and the like are retried
        if status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }
        debug!(url = %self.url, "stream open");

        let mut decoder = EventDecoder::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            for event in decoder.push(&chunk?)? {
                if event.name == CONNECTED_EVENT {
                    *attempt = 0;
                }
                self.dispatch(event);
            }
        }
        Ok(())
    }

    fn dispatch(&self, event: RawEvent) {
        let data = serde_json::from_str(&event.data).unwrap_or(Value::String(event.data));
        match self.handlers.get(&event.name) {
            Some(handler) => handler(&data),
            None if self.any.is_none() => debug!(event = %event.name, "no handler registered"),
            None => {}
        }
        if let Some(any) = &self.any {
            any(&event.name, &data);
        }
    }
}

/// Resolves once the flag reads false. A dropped sender freezes the flag.
async fn disabled(flag: &mut watch::Receiver<bool>) {
    loop {
        if !*flag.borrow_and_update() {
            return;
        }
        if flag.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl std::fmt::Debug for Reconnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconnector")
            .field("url", &self.url.as_str())
            .field("policy", &self.policy)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
