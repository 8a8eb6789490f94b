//! Webhook server configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// Inbound webhook listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Route for processor callbacks.
    #[serde(default = "default_path")]
    pub path: String,
    /// Shared HMAC secret (loaded from WEBHOOK_SECRET env var).
    #[serde(skip)]
    pub secret: String,
}

impl WebhookConfig {
    /// Returns the socket address to bind, if host and port form a valid one.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().ok()
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            secret: String::new(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/webhook/processor".to_string()
}
