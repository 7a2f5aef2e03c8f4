//! Error types and the decoder for provider error responses.
//!
//! Every non-2xx response becomes exactly one [`ApiError`], decoded from the
//! provider's `{"errors": [{"field": ..., "reason": ...}]}` envelope. Local
//! failures (transport, cancellation, serialization) get their own [`Error`]
//! variants. [`Error::kind`] folds both into a single [`ErrorKind`] taxonomy so
//! callers can branch without matching on raw status codes.

use std::fmt;

use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitInfo;
use crate::transport::TransportError;

/// The main error type returned by every client operation.
///
/// # Examples
///
/// ```no_run
/// use linode_rest::{Client, Error, ErrorKind};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder().token("my-token").build()?;
///
/// match client.users().get("does-not-exist").await {
///     Ok(user) => println!("found {}", user.email),
///     Err(e) if e.is_not_found() => println!("no such user"),
///     Err(e) if e.kind() == ErrorKind::Forbidden => println!("not allowed"),
///     Err(e) => return Err(e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The provider answered with a non-2xx status.
    ///
    /// The status code, the decoded `(field, reason)` pairs and the raw body
    /// are all preserved on the inner [`ApiError`].
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A network-level error occurred (connection refused, DNS failure, reset).
    #[error("Network error: {0}")]
    Network(TransportError),

    /// A single physical attempt took longer than the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The whole logical call, retries and backoff included, outlived the
    /// configured deadline.
    #[error("Call deadline of {0:?} exceeded")]
    DeadlineExceeded(std::time::Duration),

    /// The caller's [`CancelToken`](crate::CancelToken) fired before the call
    /// resolved.
    #[error("Request canceled")]
    Canceled,

    /// A 2xx response body could not be decoded into the expected shape.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The request body could not be serialized to JSON.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An operation argument was rejected before any request was sent,
    /// such as an empty identifier.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid client or request configuration.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Error::Timeout,
            other => Error::Network(other),
        }
    }
}

/// Failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Status 404, regardless of body content.
    NotFound,
    /// Status 400 or 422 carrying at least one field-scoped reason.
    Validation,
    /// Status 401.
    Unauthorized,
    /// Status 403.
    Forbidden,
    /// Status 429.
    RateLimited,
    /// Any 5xx status.
    ServerError,
    /// Any other non-2xx status.
    ClientError,
    /// The caller canceled the call.
    Canceled,
    /// Connection failures and per-attempt timeouts.
    Network,
    /// The call-level deadline ran out. Never retried.
    DeadlineExceeded,
    /// Failures raised locally: bad arguments, configuration, (de)serialization.
    Local,
}

impl ErrorKind {
    /// Returns `true` for the transient classes the retry policy re-attempts.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::ServerError | ErrorKind::Network
        )
    }
}

impl Error {
    /// Classifies this error into the [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Api(api) => api.kind(),
            Error::Network(_) | Error::Timeout => ErrorKind::Network,
            Error::Canceled => ErrorKind::Canceled,
            Error::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            Error::DeserializationFailed { .. }
            | Error::SerializationFailed(_)
            | Error::InvalidArgument(_)
            | Error::ConfigurationError(_)
            | Error::InvalidUrl(_) => ErrorKind::Local,
        }
    }

    /// Returns `true` if this error is potentially retryable.
    ///
    /// Network errors, timeouts, 429 and 5xx responses are retryable.
    /// Other 4xx responses and local failures are terminal.
    ///
    /// # Examples
    ///
    /// ```
    /// use linode_rest::{ApiError, Error};
    /// use http::StatusCode;
    ///
    /// let err = Error::Api(ApiError::from_response(
    ///     StatusCode::SERVICE_UNAVAILABLE,
    ///     http::HeaderMap::new(),
    ///     b"",
    /// ));
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::Api(ApiError::from_response(
    ///     StatusCode::BAD_REQUEST,
    ///     http::HeaderMap::new(),
    ///     br#"{"errors":[{"field":"email","reason":"Invalid email"}]}"#,
    /// ));
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Returns `true` if the provider reported the resource as missing (404).
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns the decoded provider error, if this is one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(api) => Some(api),
            _ => None,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Api(api) => Some(api.status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Api(api) => Some(&api.raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns rate limit information if the provider sent any.
    pub fn rate_limit_info(&self) -> Option<&RateLimitInfo> {
        self.api_error()?.rate_limit_info.as_ref()
    }

    /// Returns the recommended delay from rate limit information, capped by
    /// `max_wait`.
    pub fn rate_limit_delay(&self, max_wait: std::time::Duration) -> Option<std::time::Duration> {
        self.rate_limit_info()?.delay(max_wait)
    }
}

/// One `(field, reason)` entry of a provider error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReason {
    /// The input field the reason applies to, when the provider scoped it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Human readable explanation.
    pub reason: String,
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "[{}] {}", field, self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    errors: Vec<ErrorReason>,
}

/// A decoded non-2xx response.
///
/// Always carries at least one [`ErrorReason`]. When the body does not match
/// the provider's envelope, the single reason is the status code's canonical
/// phrase (e.g. `"Service Unavailable"`).
#[derive(Debug, Clone)]
pub struct ApiError {
    /// The HTTP status code returned by the provider.
    pub status: StatusCode,
    /// The decoded reasons, in the order the provider listed them.
    pub errors: Vec<ErrorReason>,
    /// The raw response body.
    pub raw_response: String,
    /// The response headers.
    pub headers: HeaderMap,
    /// Rate limit information parsed from headers, when present.
    pub rate_limit_info: Option<RateLimitInfo>,
}

impl ApiError {
    /// Decodes a non-2xx response into an `ApiError`.
    ///
    /// # Examples
    ///
    /// ```
    /// use linode_rest::{ApiError, ErrorKind};
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let err = ApiError::from_response(
    ///     StatusCode::BAD_REQUEST,
    ///     HeaderMap::new(),
    ///     br#"{"errors":[{"field":"username","reason":"Username taken"}]}"#,
    /// );
    /// assert_eq!(err.kind(), ErrorKind::Validation);
    /// assert_eq!(err.field_error("username"), Some("Username taken"));
    /// ```
    pub fn from_response(status: StatusCode, headers: HeaderMap, body: &[u8]) -> Self {
        let raw_response = String::from_utf8_lossy(body).into_owned();

        let errors = match serde_json::from_slice::<ErrorEnvelope>(body) {
            Ok(envelope) if !envelope.errors.is_empty() => envelope.errors,
            _ => vec![ErrorReason {
                field: None,
                reason: status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
            }],
        };

        let info = RateLimitInfo::from_headers(&headers);
        let rate_limited = info.is_rate_limited() || status == StatusCode::TOO_MANY_REQUESTS;
        let rate_limit_info = rate_limited.then_some(info);

        Self {
            status,
            errors,
            raw_response,
            headers,
            rate_limit_info,
        }
    }

    /// Classifies the status code.
    ///
    /// 404 is always [`ErrorKind::NotFound`], whatever the body says.
    pub fn kind(&self) -> ErrorKind {
        match self.status.as_u16() {
            404 => ErrorKind::NotFound,
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            429 => ErrorKind::RateLimited,
            400 | 422 if self.errors.iter().any(|e| e.field.is_some()) => ErrorKind::Validation,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::ClientError,
        }
    }

    /// Iterates over the field-scoped reasons as `(field, reason)` pairs.
    pub fn field_errors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors
            .iter()
            .filter_map(|e| Some((e.field.as_deref()?, e.reason.as_str())))
    }

    /// Returns the first reason reported for `field`.
    pub fn field_error(&self, field: &str) -> Option<&str> {
        self.field_errors()
            .find(|(name, _)| *name == field)
            .map(|(_, reason)| reason)
    }

    /// All reasons joined into one message.
    pub fn message(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.message())
    }
}

impl std::error::Error for ApiError {}

/// A specialized `Result` type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn decode(status: u16, body: &str) -> ApiError {
        ApiError::from_response(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body.as_bytes(),
        )
    }

    #[test]
    fn test_decodes_field_scoped_reasons() {
        let err = decode(
            400,
            r#"{"errors":[{"field":"email","reason":"Invalid email"},{"reason":"Also bad"}]}"#,
        );

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.errors.len(), 2);
        assert_eq!(err.field_error("email"), Some("Invalid email"));
        assert_eq!(err.field_errors().count(), 1);
        assert_eq!(err.message(), "[email] Invalid email; Also bad");
        assert_eq!(err.to_string(), "[400] [email] Invalid email; Also bad");
    }

    #[test]
    fn test_falls_back_to_status_reason() {
        let err = decode(503, "<html>upstream down</html>");

        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].reason, "Service Unavailable");
        assert_eq!(err.errors[0].field, None);
        assert_eq!(err.raw_response, "<html>upstream down</html>");
        assert_eq!(err.kind(), ErrorKind::ServerError);
    }

    #[test]
    fn test_empty_envelope_uses_fallback() {
        let err = decode(500, r#"{"errors":[]}"#);
        assert_eq!(err.message(), "Internal Server Error");
    }

    #[test]
    fn test_not_found_ignores_body() {
        let err = decode(404, r#"{"errors":[{"field":"username","reason":"weird"}]}"#);
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = decode(404, "");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "Not Found");
    }

    #[test]
    fn test_bad_request_without_fields_is_client_error() {
        let err = decode(400, r#"{"errors":[{"reason":"Malformed"}]}"#);
        assert_eq!(err.kind(), ErrorKind::ClientError);
    }

    #[test]
    fn test_classification_of_status_classes() {
        assert_eq!(decode(401, "").kind(), ErrorKind::Unauthorized);
        assert_eq!(decode(403, "").kind(), ErrorKind::Forbidden);
        assert_eq!(decode(429, "").kind(), ErrorKind::RateLimited);
        assert_eq!(decode(502, "").kind(), ErrorKind::ServerError);
        assert_eq!(decode(409, "").kind(), ErrorKind::ClientError);
    }

    #[test]
    fn test_retryable_flags() {
        assert!(Error::Api(decode(429, "")).is_retryable());
        assert!(Error::Api(decode(500, "")).is_retryable());
        assert!(Error::Timeout.is_retryable());
        assert!(!Error::Api(decode(400, "")).is_retryable());
        assert!(!Error::Api(decode(404, "")).is_retryable());
        assert!(!Error::Canceled.is_retryable());
        assert!(!Error::DeadlineExceeded(std::time::Duration::from_secs(1)).is_retryable());
        assert!(!Error::InvalidArgument("empty".into()).is_retryable());
    }

    #[test]
    fn test_rate_limit_info_attached_on_429() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("5"));
        let err = Error::Api(ApiError::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            b"",
        ));

        assert_eq!(
            err.rate_limit_delay(std::time::Duration::from_secs(60)),
            Some(std::time::Duration::from_secs(5))
        );
    }

    #[test]
    fn test_transport_timeout_maps_to_timeout() {
        let err: Error = TransportError::Timeout.into();
        assert!(matches!(err, Error::Timeout));

        let err: Error = TransportError::Connection("refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[test]
    fn test_deadline_is_distinct_from_attempt_timeout() {
        let err = Error::DeadlineExceeded(std::time::Duration::from_millis(50));

        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
        assert_ne!(err.kind(), Error::Timeout.kind());
        assert_eq!(err.to_string(), "Call deadline of 50ms exceeded");
    }
}
