use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::normalize::ErrorKind;
use crate::request::ScanRequest;

/// Path of the synchronous scan API, appended to the configured endpoint.
pub const SCAN_PATH: &str = "/v1/scan/sync/request";
/// Header carrying the API key.
pub const TOKEN_HEADER: &str = "x-pan-token";

const USER_AGENT: &str = concat!("airs-guard/", env!("CARGO_PKG_VERSION"));

/// Why a scan exchange could not produce a usable reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Failure {
    #[error("invalid scan endpoint: {reason}")]
    Config { reason: String },
    #[error("API request failed: {status} - {body}")]
    Http { status: u16, body: String },
    #[error("network error: {reason}")]
    Network { reason: String },
    #[error("invalid response from scan service: {reason}")]
    Protocol { reason: String },
}

impl Failure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Http { .. } => ErrorKind::Http,
            Self::Network { .. } => ErrorKind::Network,
            Self::Protocol { .. } => ErrorKind::Protocol,
        }
    }
}

/// JSON object returned by the scan service, untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawReply(Map<String, Value>);

impl RawReply {
    /// Parse a reply body. Anything other than a JSON object is a protocol failure.
    pub fn parse(body: &str) -> Result<Self, Failure> {
        let value: Value = serde_json::from_str(body).map_err(|err| Failure::Protocol {
            reason: format!("response body is not valid JSON: {err}"),
        })?;
        Self::try_from(value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Value> for RawReply {
    type Error = Failure;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Failure::Protocol {
                reason: format!("expected a JSON object, got {}", json_type(&other)),
            }),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One request/reply exchange with the scan service.
#[async_trait]
pub trait ScanTransport: Send + Sync {
    /// Send exactly one request. Implementations must not retry.
    async fn send(&self, request: &ScanRequest) -> Result<RawReply, Failure>;
}

/// reqwest-backed transport bound to one endpoint, credential and timeout.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    url: Url,
    api_key: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Failure> {
        let url = scan_url(endpoint)?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|err| Failure::Config {
                reason: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self {
            http,
            url,
            api_key: api_key.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn classify(&self, err: reqwest::Error) -> Failure {
        if err.is_timeout() {
            Failure::Network {
                reason: format!(
                    "request timed out after {}",
                    humantime::format_duration(self.timeout)
                ),
            }
        } else if err.is_connect() {
            Failure::Network {
                reason: format!("failed to connect to {}: {err}", self.url),
            }
        } else {
            Failure::Network {
                reason: err.to_string(),
            }
        }
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url.as_str())
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ScanTransport for HttpTransport {
    async fn send(&self, request: &ScanRequest) -> Result<RawReply, Failure> {
        debug!(trace_id = request.trace_id(), url = %self.url, "sending scan request");
        let response = self
            .http
            .post(self.url.clone())
            .header(TOKEN_HEADER, &self.api_key)
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| self.classify(err))?;
        debug!(trace_id = request.trace_id(), status = status.as_u16(), "scan reply received");
        if !status.is_success() {
            return Err(Failure::Http {
                status: status.as_u16(),
                body,
            });
        }
        RawReply::parse(&body)
    }
}

fn scan_url(endpoint: &str) -> Result<Url, Failure> {
    let base = endpoint.trim().trim_end_matches('/');
    let url = Url::parse(&format!("{base}{SCAN_PATH}")).map_err(|err| Failure::Config {
        reason: format!("`{endpoint}` is not a valid URL: {err}"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Failure::Config {
            reason: format!("unsupported URL scheme `{other}` in `{endpoint}`"),
        }),
    }
}
