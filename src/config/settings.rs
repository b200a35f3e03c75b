use std::time::Duration;

use serde::Deserialize;

use crate::broker::engine::EngineOptions;
use crate::client::ReconnectPolicy;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub stream: StreamSettings,
    pub variants: VariantSettings,
    pub source: SourceSettings,
    pub client: ClientSettings,
    pub log: LogSettings,
}

/// Address the HTTP server binds to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Timing and naming of the event stream.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StreamSettings {
    pub poll_interval_secs: u64,
    pub heartbeat_secs: u64,
    /// Events buffered per subscriber before a write counts as failed.
    pub sink_capacity: usize,
    pub data_event: String,
    pub error_event: String,
}

/// Fields hidden from the `external` variant.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct VariantSettings {
    pub hidden_fields: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SourceSettings {
    pub data_dir: String,
    pub latency_ms: u64,
}

/// Reconnect behaviour of the stream client.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientSettings {
    pub url: String,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    pub backoff_factor: f64,
    pub jitter: f64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub stream: Option<PartialStreamSettings>,
    pub variants: Option<PartialVariantSettings>,
    pub source: Option<PartialSourceSettings>,
    pub client: Option<PartialClientSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialStreamSettings {
    pub poll_interval_secs: Option<u64>,
    pub heartbeat_secs: Option<u64>,
    pub sink_capacity: Option<usize>,
    pub data_event: Option<String>,
    pub error_event: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialVariantSettings {
    pub hidden_fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialSourceSettings {
    pub data_dir: Option<String>,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialClientSettings {
    pub url: Option<String>,
    pub reconnect_delay_secs: Option<u64>,
    pub max_reconnect_delay_secs: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub jitter: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let stream = self.stream.unwrap_or_default();
        let variants = self.variants.unwrap_or_default();
        let source = self.source.unwrap_or_default();
        let client = self.client.unwrap_or_default();
        let log = self.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            stream: StreamSettings {
                poll_interval_secs: stream
                    .poll_interval_secs
                    .unwrap_or(default.stream.poll_interval_secs),
                heartbeat_secs: stream.heartbeat_secs.unwrap_or(default.stream.heartbeat_secs),
                sink_capacity: stream.sink_capacity.unwrap_or(default.stream.sink_capacity),
                data_event: stream.data_event.unwrap_or(default.stream.data_event),
                error_event: stream.error_event.unwrap_or(default.stream.error_event),
            },
            variants: VariantSettings {
                hidden_fields: variants
                    .hidden_fields
                    .unwrap_or(default.variants.hidden_fields),
            },
            source: SourceSettings {
                data_dir: source.data_dir.unwrap_or(default.source.data_dir),
                latency_ms: source.latency_ms.unwrap_or(default.source.latency_ms),
            },
            client: ClientSettings {
                url: client.url.unwrap_or(default.client.url),
                reconnect_delay_secs: client
                    .reconnect_delay_secs
                    .unwrap_or(default.client.reconnect_delay_secs),
                max_reconnect_delay_secs: client
                    .max_reconnect_delay_secs
                    .unwrap_or(default.client.max_reconnect_delay_secs),
                backoff_factor: client.backoff_factor.unwrap_or(default.client.backoff_factor),
                jitter: client.jitter.unwrap_or(default.client.jitter),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            stream: StreamSettings {
                poll_interval_secs: 15,
                heartbeat_secs: 30,
                sink_capacity: 64,
                data_event: "update".to_string(),
                error_event: "error".to_string(),
            },
            variants: VariantSettings {
                hidden_fields: vec!["internal".to_string()],
            },
            source: SourceSettings {
                data_dir: "data".to_string(),
                latency_ms: 0,
            },
            client: ClientSettings {
                url: "http://127.0.0.1:8080/stream".to_string(),
                reconnect_delay_secs: 5,
                max_reconnect_delay_secs: 60,
                backoff_factor: 2.0,
                jitter: 0.2,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl StreamSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            poll_interval: self.poll_interval(),
            data_event: self.data_event.clone(),
            error_event: self.error_event.clone(),
        }
    }
}

impl ClientSettings {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_secs(self.reconnect_delay_secs),
            Duration::from_secs(self.max_reconnect_delay_secs),
            self.backoff_factor,
            self.jitter,
        )
    }
}
