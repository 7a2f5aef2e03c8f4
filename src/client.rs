//! The client and the call engine every resource operation funnels through.
//!
//! [`Client::call`] owns one logical call: it renders the request descriptor
//! once, sends it through the configured [`Transport`], feeds each outcome
//! into a fresh [`RetryPolicy`], and either decodes the 2xx body into the
//! requested type or surfaces the decoded [`ApiError`].

use crate::{
    cancel::CancelToken,
    metadata::RequestMetadata,
    pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE},
    rate_limit::RateLimitConfig,
    resource::{Resource, Resources},
    retry::{
        RetryOnRetryable, RetryPolicy, RetryPredicate, RetryState, RetryStrategy, Sleeper,
        TokioSleeper,
    },
    transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError},
    ApiError, Error, Response, Result,
};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// The provider's public API root.
pub const DEFAULT_BASE_URL: &str = "https://api.linode.com/v4/";

const DEFAULT_USER_AGENT: &str = concat!("linode-rest/", env!("CARGO_PKG_VERSION"));

/// A client for the provider's REST API.
///
/// Configuration is fixed at [`build`](ClientBuilder::build) time and shared
/// read-only between clones, so a single client can serve any number of
/// concurrent calls. Each call keeps its own retry and pagination state.
///
/// # Examples
///
/// ```no_run
/// use linode_rest::{Client, RetryStrategy};
/// use linode_rest::users::UserCreateOptions;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), linode_rest::Error> {
/// let client = Client::builder()
///     .token("my-token")
///     .timeout(Duration::from_secs(30))
///     .retry_strategy(RetryStrategy::ExponentialBackoff {
///         initial_delay: Duration::from_millis(250),
///         max_delay: Duration::from_secs(10),
///         max_retries: 3,
///         jitter: true,
///     })
///     .build()?;
///
/// let created = client
///     .users()
///     .create(&UserCreateOptions {
///         username: "t-user".to_string(),
///         email: "t@example.com".to_string(),
///         restricted: true,
///     })
///     .await?;
///
/// for user in client.users().list(None).await? {
///     println!("{} <{}>", user.username, user.email);
/// }
///
/// client.users().delete(&created.username).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
    cancel: Option<CancelToken>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    base_url: Url,
    default_headers: HeaderMap,
    retry_strategy: RetryStrategy,
    retry_predicate: Box<dyn RetryPredicate>,
    timeout: Option<Duration>,
    deadline: Option<Duration>,
    rate_limit_config: RateLimitConfig,
    page_size: u32,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Returns a handle sharing this client's configuration whose calls
    /// abort with [`Error::Canceled`] once `token` is canceled.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use linode_rest::{CancelToken, Client, Error};
    ///
    /// # async fn example() -> Result<(), Error> {
    /// let client = Client::builder().token("my-token").build()?;
    /// let token = CancelToken::new();
    ///
    /// let scoped = client.with_cancel_token(token.clone());
    /// token.cancel();
    ///
    /// assert!(matches!(scoped.users().list(None).await, Err(Error::Canceled)));
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_cancel_token(&self, token: CancelToken) -> Client {
        Client {
            inner: Arc::clone(&self.inner),
            cancel: Some(token),
        }
    }

    /// The page size used by list operations that do not override it.
    pub fn default_page_size(&self) -> u32 {
        self.inner.page_size
    }

    /// The API root every request path is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// CRUD access to resource type `R`.
    pub fn resources<R: Resource>(&self) -> Resources<R> {
        Resources::new(self.clone())
    }

    /// Executes one logical call, retrying transient failures.
    ///
    /// The request is rendered once; every physical attempt sends the same
    /// URL, headers and body. A 2xx body is decoded into `Res` (an empty body
    /// decodes as JSON `null`). A non-2xx response becomes
    /// [`Error::Api`]. When retries run out, the last attempt's error is
    /// returned unchanged.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use linode_rest::{Client, metadata::RequestMetadata};
    /// use http::Method;
    ///
    /// # async fn example() -> Result<(), linode_rest::Error> {
    /// let client = Client::builder().token("my-token").build()?;
    ///
    /// let metadata = RequestMetadata::new(Method::GET, "account");
    /// let account = client.call::<(), serde_json::Value>(metadata, None).await?;
    /// println!("{}", account.data["email"]);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call<Req, Res>(
        &self,
        metadata: RequestMetadata,
        body: Option<&Req>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        match self.inner.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.call_with_retry(metadata, body))
                .await
                .map_err(|_| {
                    tracing::warn!(deadline_ms = deadline.as_millis(), "Call deadline exceeded");
                    Error::DeadlineExceeded(deadline)
                })?,
            None => self.call_with_retry(metadata, body).await,
        }
    }

    async fn call_with_retry<Req, Res>(
        &self,
        metadata: RequestMetadata,
        body: Option<&Req>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = self.build_url(&metadata)?;
        let body = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| Error::SerializationFailed(e.to_string()))?
            .map(Bytes::from);

        let start_time = Instant::now();
        let mut policy = RetryPolicy::new(
            &self.inner.retry_strategy,
            self.inner.retry_predicate.as_ref(),
            &self.inner.rate_limit_config,
            metadata.idempotent,
        );

        loop {
            let attempt = policy.attempt();
            let request = self.prepare_request(&metadata, url.clone(), body.clone());

            let result = match self.until_canceled(self.execute(request, attempt)).await? {
                Ok(response) => self.parse_response(response, start_time.elapsed(), attempt),
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(response) => {
                    policy.record_success();
                    return Ok(response);
                }
                Err(e) => e,
            };

            tracing::warn!(
                error = %error,
                attempt = attempt,
                method = %metadata.method,
                path = %metadata.path,
                "Request failed"
            );

            match policy.record_failure(&error) {
                RetryState::BackingOff { delay, .. } => {
                    tracing::info!(
                        delay_ms = delay.as_millis(),
                        attempt = attempt,
                        rate_limited = error.rate_limit_info().is_some(),
                        "Retrying request after delay"
                    );
                    self.until_canceled(self.inner.sleeper.sleep(delay)).await?;
                    policy.resume();
                }
                RetryState::FailedExhausted { attempts } => {
                    tracing::warn!(
                        attempts = attempts,
                        backoff_ms = policy.elapsed_backoff().as_millis(),
                        "Retries exhausted"
                    );
                    return Err(error);
                }
                _ => return Err(error),
            }
        }
    }

    /// Resolves `fut`, or returns [`Error::Canceled`] if this client's token
    /// fires first. The losing future is dropped.
    async fn until_canceled<F: Future>(&self, fut: F) -> Result<F::Output> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.canceled() => {
                    tracing::debug!("Call canceled");
                    Err(Error::Canceled)
                }
                output = fut => Ok(output),
            },
            None => Ok(fut.await),
        }
    }

    fn build_url(&self, metadata: &RequestMetadata) -> Result<Url> {
        let path = metadata.render_path()?;
        let mut url = self.inner.base_url.join(path.trim_start_matches('/'))?;

        if !metadata.query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(&metadata.query_params);
        }

        Ok(url)
    }

    fn prepare_request(
        &self,
        metadata: &RequestMetadata,
        url: Url,
        body: Option<Bytes>,
    ) -> HttpRequest {
        let mut headers = self.inner.default_headers.clone();
        for (name, value) in &metadata.headers {
            headers.insert(name, value.clone());
        }
        if body.is_some() {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        HttpRequest {
            method: metadata.method.clone(),
            url,
            headers,
            body,
            timeout: self.inner.timeout,
        }
    }

    /// Executes a single physical attempt.
    ///
    /// The per-attempt timeout is enforced here as well as handed to the
    /// transport, so a transport that ignores `HttpRequest::timeout` still
    /// gives up in time.
    async fn execute(&self, request: HttpRequest, attempt: usize) -> Result<HttpResponse> {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            attempt = attempt,
            "Executing HTTP request"
        );

        let send = self.inner.transport.send(request);
        let response = match self.inner.timeout {
            Some(timeout) => tokio::time::timeout(timeout, send)
                .await
                .unwrap_or(Err(TransportError::Timeout)),
            None => send.await,
        };

        Ok(response?)
    }

    fn parse_response<Res>(
        &self,
        response: HttpResponse,
        latency: Duration,
        attempts: usize,
    ) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let HttpResponse {
            status,
            headers,
            body,
        } = response;

        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            attempts = attempts,
            "Received HTTP response"
        );

        if !status.is_success() {
            let error = ApiError::from_response(status, headers, &body);

            if status.as_u16() == 404 {
                tracing::debug!(response = %error.raw_response, "Resource not found");
            } else if status.is_client_error() {
                tracing::error!(
                    status = status.as_u16(),
                    response = %error.raw_response,
                    "Client error (4xx)"
                );
            } else {
                tracing::warn!(
                    status = status.as_u16(),
                    response = %error.raw_response,
                    "Server error (5xx)"
                );
            }

            return Err(error.into());
        }

        let raw_body = String::from_utf8_lossy(&body).into_owned();
        let json = if raw_body.trim().is_empty() {
            "null"
        } else {
            raw_body.as_str()
        };

        match serde_json::from_str::<Res>(json) {
            Ok(data) => Ok(Response::new(data, raw_body, status, headers, latency, attempts)),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    raw_response = %raw_body,
                    "Failed to deserialize response"
                );

                Err(Error::DeserializationFailed {
                    raw_response: raw_body,
                    serde_error: e.to_string(),
                    status,
                })
            }
        }
    }

    /// Makes a GET request to a path relative to the base URL.
    pub async fn get<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::GET, path);
        self.call::<(), Res>(metadata, None).await
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use linode_rest::{ClientBuilder, RetryStrategy};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), linode_rest::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.linode.com/v4beta")?
///     .token("my-token")
///     .user_agent("my-app/1.0")
///     .timeout(Duration::from_secs(30))
///     .deadline(Duration::from_secs(120))
///     .page_size(500)?
///     .retry_strategy(RetryStrategy::Linear {
///         delay: Duration::from_secs(1),
///         max_retries: 5,
///     })
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    token: Option<String>,
    user_agent: String,
    default_headers: HeaderMap,
    retry_strategy: RetryStrategy,
    retry_predicate: Option<Box<dyn RetryPredicate>>,
    timeout: Option<Duration>,
    deadline: Option<Duration>,
    rate_limit_config: RateLimitConfig,
    page_size: u32,
    transport: Option<Arc<dyn Transport>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: HeaderMap::new(),
            retry_strategy: RetryStrategy::default(),
            retry_predicate: None,
            timeout: None,
            deadline: None,
            rate_limit_config: RateLimitConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            transport: None,
            sleeper: None,
        }
    }

    /// Sets the API root. Defaults to [`DEFAULT_BASE_URL`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let mut url = Url::parse(url.as_ref())?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.base_url = Some(url);
        Ok(self)
    }

    /// Sets the personal access token sent as `Authorization: Bearer <token>`.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Overrides the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the retry strategy for transient failures.
    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Sets a custom retry predicate.
    ///
    /// By default, requests are retried based on [`Error::is_retryable`].
    pub fn retry_predicate(mut self, predicate: Box<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Sets the timeout for each physical attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets an overall deadline for a logical call, spanning retries and
    /// backoff.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the rate limit configuration.
    pub fn rate_limit_config(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit_config = config;
        self
    }

    /// Sets the default page size for list operations.
    ///
    /// # Errors
    ///
    /// Returns an error unless `25 <= page_size <= 500`.
    pub fn page_size(mut self, page_size: u32) -> Result<Self> {
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(Error::ConfigurationError(format!(
                "Page size must be between {} and {}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, page_size
            )));
        }
        self.page_size = page_size;
        Ok(self)
    }

    /// Replaces the HTTP transport, e.g. with a recorded-fixture player.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replaces the source of backoff delays.
    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token or user agent are not valid header values.
    pub fn build(self) -> Result<Client> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_BASE_URL)?,
        };

        let mut default_headers = self.default_headers;
        default_headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        default_headers.insert(
            header::USER_AGENT,
            HeaderValue::try_from(self.user_agent.as_str())
                .map_err(|e| Error::ConfigurationError(format!("Invalid user agent: {}", e)))?,
        );
        if let Some(token) = self.token {
            let mut value = HeaderValue::try_from(format!("Bearer {}", token))
                .map_err(|e| Error::ConfigurationError(format!("Invalid token: {}", e)))?;
            value.set_sensitive(true);
            default_headers.insert(header::AUTHORIZATION, value);
        } else {
            tracing::debug!("No token configured; requests will be unauthenticated");
        }

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let sleeper = self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper));
        let retry_predicate = self
            .retry_predicate
            .unwrap_or_else(|| Box::new(RetryOnRetryable));

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                sleeper,
                base_url,
                default_headers,
                retry_strategy: self.retry_strategy,
                retry_predicate,
                timeout: self.timeout,
                deadline: self.deadline,
                rate_limit_config: self.rate_limit_config,
                page_size: self.page_size,
            }),
            cancel: None,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
