//! Context configuration.
//!
//! ```json
//! {
//!   "connection": {
//!     "url": "https://org.crm4.dynamics.com/",
//!     "api_version": "v9.2",
//!     "timeout": "30s",
//!     "token": "eyJ..."
//!   },
//!   "throw_on_error": true,
//!   "limits": { "max_page_size": 5000 }
//! }
//! ```

use crm_query::QueryLimits;
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_VERSION: &str = "v9.2";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrmConfig {
    pub connection: ConnectionConfig,
    /// Raise [`Error::NotFound`](crate::Error::NotFound) for a remote 404 on
    /// find/update/delete instead of returning `None`/`false`.
    #[serde(default = "default_throw_on_error")]
    pub throw_on_error: bool,
    #[serde(default)]
    pub limits: QueryLimits,
}

impl CrmConfig {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            connection: ConnectionConfig::new(url),
            throw_on_error: default_throw_on_error(),
            limits: QueryLimits::default(),
        }
    }

    #[must_use]
    pub fn with_throw_on_error(mut self, throw_on_error: bool) -> Self {
        self.throw_on_error = throw_on_error;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: QueryLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Where and how to reach the Web API.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Organization root, e.g. `https://org.crm4.dynamics.com/`.
    pub url: Url,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Static bearer token. Token acquisition itself is out of scope; plug a
    /// [`TokenSource`](crate::TokenSource) into the transport for refresh.
    #[serde(default)]
    pub token: Option<SecretString>,
    /// Accept `http://` URLs (mock servers only).
    #[serde(default)]
    pub allow_insecure_http: bool,
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            api_version: default_api_version(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
            token: None,
            allow_insecure_http: false,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the URL can carry a Web API path.
    ///
    /// # Errors
    /// Returns a message for non-HTTP(S) or cannot-be-a-base URLs and for
    /// an empty API version.
    pub fn validate(&self) -> Result<(), String> {
        match self.url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_http => {}
            other => return Err(format!("unsupported URL scheme '{other}'")),
        }
        if self.url.cannot_be_a_base() {
            return Err(format!("'{}' cannot be used as a base URL", self.url));
        }
        if self.api_version.trim().is_empty() {
            return Err("api_version must not be empty".to_owned());
        }
        Ok(())
    }
}

fn default_throw_on_error() -> bool {
    true
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_owned()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Serde adapter for `"30s"`-style durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, de};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(&raw), &"a duration"))
    }
}
