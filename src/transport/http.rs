//! Blocking HTTP transport built on `ureq`.
//!
//! One [`ureq::Agent`] is kept per transport so connections are pooled
//! across batches. Each batch is a single POST; the client decides whether
//! and when to try again.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use thiserror::Error;
use ureq::{Agent, AgentBuilder};

use super::{Transport, TransportResult};

/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout for the whole request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authentication applied to every request.
#[derive(Clone, Debug, Default)]
pub enum AuthConfig {
    #[default]
    None,
    /// HTTP Basic authentication with username and password.
    Basic { username: String, password: String },
    /// Bearer token authentication.
    Bearer { token: String },
}

/// Settings for [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// Collector URL that receives the POSTed batches.
    pub endpoint: String,
    pub auth: AuthConfig,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl HttpTransportConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth: AuthConfig::None,
            headers: BTreeMap::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Failure to construct an [`HttpTransport`].
#[derive(Debug, Error)]
pub enum TransportBuildError {
    #[error("endpoint must be an http:// or https:// URL, got {0:?}")]
    InvalidEndpoint(String),
    #[error("failed to initialise TLS: {0}")]
    Tls(#[from] native_tls::Error),
}

/// POSTs each batch to a fixed endpoint.
pub struct HttpTransport {
    config: HttpTransportConfig,
    agent: Agent,
}

impl HttpTransport {
    /// Build a transport with a pooled agent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportBuildError::InvalidEndpoint`] for anything other
    /// than an http(s) URL, or [`TransportBuildError::Tls`] if the platform TLS
    /// stack cannot be initialised.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportBuildError> {
        let endpoint = config.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(TransportBuildError::InvalidEndpoint(config.endpoint));
        }
        let tls = native_tls::TlsConnector::new()?;
        let agent = AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout(config.request_timeout)
            .tls_connector(Arc::new(tls))
            .build();
        Ok(Self { config, agent })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn apply_auth(&self, req: ureq::Request) -> ureq::Request {
        match &self.config.auth {
            AuthConfig::None => req,
            AuthConfig::Basic { username, password } => {
                let encoded = base64_encode(format!("{username}:{password}").as_bytes());
                req.set("Authorization", &format!("Basic {encoded}"))
            }
            AuthConfig::Bearer { token } => req.set("Authorization", &format!("Bearer {token}")),
        }
    }

    fn apply_headers(&self, mut req: ureq::Request) -> ureq::Request {
        for (key, value) in &self.config.headers {
            req = req.set(key, value);
        }
        req
    }

    fn post(&self, payload: &[u8], content_type: &str) -> Result<ureq::Response, Box<ureq::Error>> {
        let mut req = self.agent.post(self.config.endpoint.trim());
        req = self.apply_auth(req);
        req = self.apply_headers(req);
        req = req.set("Content-Type", content_type);
        req.send_bytes(payload).map_err(Box::new)
    }
}

impl Transport for HttpTransport {
    fn send(&self, payload: &[u8], content_type: &str) -> TransportResult {
        match self.post(payload, content_type) {
            Ok(response) => TransportResult::from_status(response.status()),
            Err(err) => match *err {
                ureq::Error::Status(code, _) => TransportResult::from_status(code),
                ureq::Error::Transport(transport_err) => {
                    TransportResult::retryable(0, transport_err.to_string())
                }
            },
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.config.endpoint)
            .finish_non_exhaustive()
    }
}

fn base64_encode(input: &[u8]) -> String {
    BASE64_STANDARD.encode(input)
}
