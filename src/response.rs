//! Successful call results with transport metadata.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A decoded 2xx response plus what it took to get it.
///
/// Returned by the low-level [`Client::call`](crate::Client::call). The typed
/// resource operations unwrap it to the bare value.
///
/// # Examples
///
/// ```no_run
/// use linode_rest::{Client, metadata::RequestMetadata, users::User};
/// use http::Method;
///
/// # async fn example() -> Result<(), linode_rest::Error> {
/// let client = Client::builder().token("my-token").build()?;
///
/// let metadata = RequestMetadata::new(Method::GET, "account/users/{username}")
///     .with_path_param("username", "jane");
/// let response = client.call::<(), User>(metadata, None).await?;
///
/// println!(
///     "{} took {:?} over {} attempt(s)",
///     response.username, response.latency, response.attempts
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The deserialized response data.
    pub data: T,

    /// The raw response body.
    pub raw_body: String,

    /// The HTTP status code of the final attempt.
    pub status: StatusCode,

    /// The response headers of the final attempt.
    pub headers: HeaderMap,

    /// Time from the first attempt until the successful response, including
    /// backoff.
    pub latency: Duration,

    /// Physical attempts made; `1` when no retry was needed.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Returns `true` if the call needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
