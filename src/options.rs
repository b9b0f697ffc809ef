//! Transport configuration and input limits.

use std::collections::HashMap;
use std::time::Duration;

use crate::client::ClientError;

/// Default completion service origin.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Default path of the streaming completion endpoint.
pub const DEFAULT_ENDPOINT: &str = "/api/ai/completions";

/// Largest snippet the editor accepts.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 5000;

/// A secret string type for sensitive data like session tokens.
/// Prevents accidental logging or display of secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Generic transport options containing truly generic transport fields
/// and transport-specific configuration.
///
/// # Example
/// ```rust
/// use jsunpack::options::{HttpTransport, TransportOptions};
/// use std::time::Duration;
///
/// let options = TransportOptions::new(
///     HttpTransport::default().with_base_url("https://jsunpack.example".to_string()),
/// )
/// .with_timeout(Duration::from_secs(120));
///
/// assert_eq!(options.provider.url(), "https://jsunpack.example/api/ai/completions");
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions<T> {
    /// Request timeout; `None` lets a hung stream stay open until cancelled
    pub timeout: Option<Duration>,

    /// Transport-specific options
    pub provider: T,
}

impl<T> TransportOptions<T> {
    /// Create new transport options with transport-specific configuration.
    pub fn new(provider: T) -> Self {
        Self {
            timeout: None,
            provider,
        }
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl TransportOptions<HttpTransport> {
    /// Build options from `JSUNPACK_*` environment variables.
    ///
    /// `JSUNPACK_TIMEOUT_SECS` sets the timeout; see
    /// [`HttpTransport::from_env`] for the rest.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut options = Self::new(HttpTransport::from_env());

        if let Ok(raw) = std::env::var("JSUNPACK_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("JSUNPACK_TIMEOUT_SECS is not a number: {raw}"))
            })?;
            options = options.with_timeout(Duration::from_secs(secs));
        }

        Ok(options)
    }
}

/// HTTP-specific transport options.
/// Used as the provider field in `TransportOptions<HttpTransport>`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Origin of the completion service
    pub base_url: String,

    /// Path of the streaming endpoint
    pub endpoint: String,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` from the environment
    pub system_proxy: bool,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            proxy: None,
            system_proxy: true,
            extra_headers: None,
        }
    }
}

impl HttpTransport {
    /// Read `JSUNPACK_BASE_URL` and `JSUNPACK_PROXY`, falling back to defaults.
    pub fn from_env() -> Self {
        let mut transport = Self::default();
        if let Ok(base_url) = std::env::var("JSUNPACK_BASE_URL") {
            transport.base_url = base_url;
        }
        transport.proxy = std::env::var("JSUNPACK_PROXY").ok();
        transport
    }

    /// Full endpoint URL.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the endpoint path.
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Ignore proxies configured through the environment.
    pub fn without_system_proxy(mut self) -> Self {
        self.system_proxy = false;
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }
}

/// Check a snippet before it is sent.
///
/// Rejects whitespace-only input and input longer than `max` characters.
pub fn validate_input(input: &str, max: usize) -> Result<(), ClientError> {
    if input.trim().is_empty() {
        return Err(ClientError::Config("input is empty".to_string()));
    }

    let len = input.chars().count();
    if len > max {
        return Err(ClientError::InputTooLong { len, max });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_slashes() {
        let transport = HttpTransport::default().with_base_url("http://host:8080/".to_string());
        assert_eq!(transport.url(), "http://host:8080/api/ai/completions");

        let transport = transport.with_endpoint("v2/stream".to_string());
        assert_eq!(transport.url(), "http://host:8080/v2/stream");
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = SecretString::from("fingerprint");
        assert_eq!(format!("{:?}", secret), "SecretString([REDACTED])");
        assert_eq!(secret.expose_secret(), "fingerprint");
    }

    #[test]
    fn test_validate_input() {
        assert!(validate_input("var a = 1;", DEFAULT_MAX_INPUT_CHARS).is_ok());
        assert!(matches!(
            validate_input("  \n\t", DEFAULT_MAX_INPUT_CHARS),
            Err(ClientError::Config(_))
        ));

        // counted in characters, not bytes
        assert!(validate_input("变量", 2).is_ok());
        assert!(matches!(
            validate_input("abc", 2),
            Err(ClientError::InputTooLong { len: 3, max: 2 })
        ));
    }
}
