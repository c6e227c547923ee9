//! Service configuration.
//!
//! The reference deployment talks to a processing service on the loopback
//! interface with one fixed shared secret.  Both are defaults here and can be
//! overridden by the embedding adapter (the CLI exposes flags and env vars).

use std::fmt;
use std::time::Duration;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:5000";
pub const DEFAULT_PASSWORD:    &str = "password123";
/// Per-request deadline.  Matches the forwarding timeout of the reference
/// service so the client gives up no earlier than the service does.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub base_url: String,
    /// Shared secret: envelope key material and the `X-Password` header.
    pub password: String,
    pub timeout:  Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVICE_URL.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            timeout:  DEFAULT_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Absolute URL for an endpoint path such as `/convert`.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/'),
        )
    }
}

// Keep the secret out of logs.
impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("base_url", &self.base_url)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}
