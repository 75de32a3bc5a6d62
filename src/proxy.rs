//! Upload forwarding to the fixed upstream function endpoint.
//!
//! The proxy asserts the gateway's own identity toward the upstream: the
//! outbound `Origin` is always the configured literal and the inbound `Host`
//! never crosses the boundary. Inbound path and query are discarded — the
//! upstream sees only the fixed target path. One attempt per request; a
//! timed-out or refused attempt is reported once and never retried.

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::ProxyConfig;
use crate::{Error, Result};

/// Headers never forwarded upstream: the gateway's own identity assertions
/// plus the hop-by-hop set.
const STRIPPED_HEADERS: [&str; 10] = [
    "host",
    "origin",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// Forwards inbound uploads to a single fixed upstream target.
#[derive(Debug)]
pub struct UploadProxy {
    client: Client,
    target: Url,
    origin: HeaderValue,
}

impl UploadProxy {
    /// Build the proxy from its policy. The client carries both deadlines;
    /// reqwest aborts the in-flight attempt when either expires.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the target URL or Origin literal is malformed.
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        let scheme = if config.tls { "https" } else { "http" };
        let target = Url::parse(&format!(
            "{scheme}://{}:{}{}",
            config.host, config.port, config.path
        ))
        .map_err(|e| Error::Config(format!("Invalid proxy target: {e}")))?;

        let origin = HeaderValue::from_str(&config.origin)
            .map_err(|e| Error::Config(format!("Invalid proxy origin '{}': {e}", config.origin)))?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.response_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create proxy client: {e}")))?;

        Ok(Self {
            client,
            target,
            origin,
        })
    }

    /// The fixed upstream target
    #[must_use]
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Forward an inbound upload request.
    ///
    /// Upstream status and body pass through unmodified. The attempt is
    /// bounded by the configured connect and total-response deadlines.
    ///
    /// # Errors
    ///
    /// [`Error::ProxyTimeout`] when either deadline expires;
    /// [`Error::ProxyConnect`] when the upstream refuses or the transfer
    /// fails.
    pub async fn forward(&self, headers: &HeaderMap, body: Bytes) -> Result<Response> {
        let mut outbound = HeaderMap::new();
        for (name, value) in headers {
            if STRIPPED_HEADERS.contains(&name.as_str()) {
                continue;
            }
            outbound.append(name.clone(), value.clone());
        }
        outbound.insert(header::ORIGIN, self.origin.clone());

        debug!(target = %self.target, "Forwarding upload");

        let upstream = self
            .client
            .post(self.target.clone())
            .headers(outbound)
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        let status = upstream.status();
        let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
        let body = upstream.bytes().await.map_err(classify)?;

        let mut response = (status, body).into_response();
        if let Some(content_type) = content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        Ok(response)
    }
}

/// Map a transfer failure to the gateway taxonomy. Deadline expiry wins over
/// connection classification: a connect that times out is a timeout.
fn classify(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::ProxyTimeout(e.to_string())
    } else {
        Error::ProxyConnect(e.to_string())
    }
}
