//! Request descriptors.

use http::{HeaderMap, HeaderName, HeaderValue, Method};

use crate::Error;

/// Everything needed to issue one logical call.
///
/// `path` is a template relative to the client's base URL; `{name}`
/// placeholders are filled from `path_params` (percent-encoded) when the
/// request is sent.
///
/// # Examples
///
/// ```
/// use linode_rest::metadata::RequestMetadata;
/// use http::Method;
///
/// let metadata = RequestMetadata::new(Method::GET, "account/users/{username}")
///     .with_path_param("username", "jane doe");
/// assert_eq!(metadata.render_path().unwrap(), "account/users/jane%20doe");
/// ```
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The path template (relative to the base URL).
    pub path: String,

    /// Values for the `{name}` placeholders in `path`.
    pub path_params: Vec<(String, String)>,

    /// Additional headers for this request.
    pub headers: HeaderMap,

    /// Query parameters for this request, in insertion order.
    pub query_params: Vec<(String, String)>,

    /// Whether the call may be re-issued after a transient failure.
    ///
    /// Defaults to `true` for every method except POST.
    pub idempotent: bool,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method and path template.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let idempotent = method != Method::POST;
        Self {
            method,
            path: path.into(),
            path_params: Vec::new(),
            headers: HeaderMap::new(),
            query_params: Vec::new(),
            idempotent,
        }
    }

    /// Sets the value of a `{name}` placeholder, replacing any earlier value.
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        self.path_params.retain(|(k, _)| *k != name);
        self.path_params.push((name, value.to_string()));
        self
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets a query parameter, replacing any earlier value for the same key.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.query_params.retain(|(k, _)| *k != key);
        self.query_params.push((key, value.into()));
        self
    }

    /// Overrides whether the call may be retried.
    ///
    /// Only mark a POST idempotent when re-sending it cannot create a
    /// duplicate.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Substitutes path parameters into the template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a placeholder has no value, an
    /// empty one, or one that is exactly `.` or `..` (URL resolution would
    /// treat those as dot segments, even percent-encoded). Returns
    /// [`Error::ConfigurationError`] for an unterminated `{`.
    pub fn render_path(&self) -> Result<String, Error> {
        let mut rendered = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                Error::ConfigurationError(format!(
                    "Unterminated placeholder in path `{}`",
                    self.path
                ))
            })?;
            let name = &after[..close];

            let value = self
                .path_params
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| {
                    Error::InvalidArgument(format!("missing path parameter `{}`", name))
                })?;
            match value {
                "" => {
                    return Err(Error::InvalidArgument(format!(
                        "path parameter `{}` must not be empty",
                        name
                    )))
                }
                "." | ".." => {
                    return Err(Error::InvalidArgument(format!(
                        "path parameter `{}` must not be a dot segment, got `{}`",
                        name, value
                    )))
                }
                _ => {}
            }

            rendered.push_str(&urlencoding::encode(value));
            rest = &after[close + 1..];
        }
        rendered.push_str(rest);

        Ok(rendered)
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}
