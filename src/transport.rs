//! Pluggable transport for single HTTP exchanges.
//!
//! The client prepares a fully-addressed [`HttpRequest`] (base URL, auth and
//! user-agent headers already attached) and hands it to a [`Transport`], which
//! performs exactly one round trip. The default implementation is backed by
//! `reqwest`; tests substitute a scripted transport to replay recorded
//! exchanges without a network.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

/// A single physical request, ready to send.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method.
    pub method: Method,
    /// The fully-qualified URL, including the query string.
    pub url: Url,
    /// Request headers, including authorization and user agent.
    pub headers: HeaderMap,
    /// Optional JSON body.
    pub body: Option<Bytes>,
    /// Timeout for this attempt only.
    pub timeout: Option<Duration>,
}

/// The raw result of a single exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body bytes.
    pub body: Bytes,
}

/// Errors raised below the HTTP layer.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The attempt exceeded its timeout.
    #[error("timed out")]
    Timeout,
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;

/// Performs one request/response exchange.
///
/// Implementations must not retry; the client's retry policy owns that.
pub trait Transport: Send + Sync {
    /// Send the request and return the raw response.
    fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// A [`Transport`] backed by [`reqwest`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a default `reqwest::Client`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing `reqwest::Client`, e.g. one configured with a proxy
    /// or custom root certificates.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method, request.url)
                .headers(request.headers);

            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(map_reqwest_error)?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(map_reqwest_error)?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
