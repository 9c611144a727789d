// HTTP transport adapter
//
// The session layer talks to the device through the `Transport` trait so
// tests and hosts can substitute their own exchange. `HttpTransport` is the
// reqwest-backed implementation built from a shared `TransportConfig`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::HeaderMap;
use tracing::trace;
use url::Url;

use crate::error::Error;

/// One outbound request, path relative to the device root.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// The device's answer. `headers` keeps every occurrence of repeated
/// headers such as `set-cookie`; lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Performs a single request/response exchange with the device.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, host: &str, port: u16, request: HttpRequest)
    -> Result<HttpResponse, Error>;
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("tieline/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// No cookie store: the session token is tracked by the session layer
    /// and echoed explicitly.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| Error::Client(format!("failed to build HTTP client: {e}")))
    }
}

/// [`Transport`] over plain HTTP using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_client()?,
            timeout: config.timeout,
        })
    }

    fn url(host: &str, port: u16, path: &str) -> Result<Url, Error> {
        Ok(Url::parse(&format!("http://{host}:{port}"))?.join(path)?)
    }

    fn map_err(&self, err: &reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport {
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        host: &str,
        port: u16,
        request: HttpRequest,
    ) -> Result<HttpResponse, Error> {
        let url = Self::url(host, port, &request.path)?;
        trace!(method = %request.method, %url, "sending request");

        let mut builder = self.http.request(request.method, url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await.map_err(|e| self.map_err(&e))?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.text().await.map_err(|e| self.map_err(&e))?;

        trace!(status, bytes = body.len(), "received response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
