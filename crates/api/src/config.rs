//! Client configuration.
//!
//! [`ClientConfig`] is the explicit replacement for process-wide defaults: it
//! is built by the caller (deserialised, read from the environment, or filled
//! in by hand) and handed to whoever constructs the transport and credentials.
//! Loading configuration files is left to the application.

use std::time::Duration;

use serde::Deserialize;

use crate::{
    ApiError, Authentication, BasicAuthentication, BasicHttpAuthentication, CredentialPlacement,
    TlsVerify,
};

/// Public XML-RPC endpoint.
pub const API_PUBLIC_ENDPOINT: &str = "https://api.softlayer.com/xmlrpc/v3.1/";

/// Public REST endpoint.
pub const API_PUBLIC_ENDPOINT_REST: &str = "https://api.softlayer.com/rest/v3.1/";

/// Public SOAP endpoint.
pub const API_PUBLIC_ENDPOINT_SOAP: &str = "https://api.softlayer.com/soap/v3.1/";

/// Fixed `User-Agent` sent by every transport.
pub const USER_AGENT: &str = concat!("slapi-rs/", env!("CARGO_PKG_VERSION"));

/// Default per-call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 60.0;

/// Default lifetime of a cached SOAP schema.
pub const DEFAULT_SCHEMA_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Wire protocol selected at client construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    XmlRpc,
    Rest,
    Soap,
}

impl std::str::FromStr for Protocol {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xmlrpc" | "xml-rpc" | "xml_rpc" => Ok(Protocol::XmlRpc),
            "rest" => Ok(Protocol::Rest),
            "soap" => Ok(Protocol::Soap),
            other => Err(ApiError::configuration(format!("unknown protocol '{other}'"))),
        }
    }
}

/// Everything needed to construct a transport and its credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub endpoint_url: String,
    pub username: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<f64>,
    pub proxy: Option<String>,
    pub verify: TlsVerify,
    pub user_agent: String,
    /// How long a fetched SOAP schema stays valid.
    pub schema_ttl_seconds: u64,
    /// Explicit protocol. `None` infers it from the endpoint path.
    pub protocol: Option<Protocol>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint_url: API_PUBLIC_ENDPOINT.to_string(),
            username: None,
            api_key: None,
            timeout_seconds: Some(DEFAULT_TIMEOUT_SECONDS),
            proxy: None,
            verify: TlsVerify::Enabled,
            user_agent: USER_AGENT.to_string(),
            schema_ttl_seconds: DEFAULT_SCHEMA_TTL_SECONDS,
            protocol: None,
        }
    }
}

impl ClientConfig {
    /// Reads `SL_USERNAME`, `SL_API_KEY`, `SL_ENDPOINT_URL`, `SL_TIMEOUT` and
    /// `SL_PROXY` (falling back to `https_proxy`) over the defaults.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`ClientConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(endpoint) = get("SL_ENDPOINT_URL") {
            config.endpoint_url = endpoint;
        }
        config.username = get("SL_USERNAME");
        config.api_key = get("SL_API_KEY");
        if let Some(timeout) = get("SL_TIMEOUT") {
            let seconds: f64 = timeout.trim().parse().map_err(|_| {
                ApiError::configuration(format!("SL_TIMEOUT must be a number of seconds, got '{timeout}'"))
            })?;
            config.timeout_seconds = Some(seconds);
        }
        config.proxy = get("SL_PROXY").or_else(|| get("https_proxy"));

        Ok(config)
    }

    /// The configured protocol, or the one implied by the endpoint path.
    pub fn protocol(&self) -> Protocol {
        if let Some(protocol) = self.protocol {
            return protocol;
        }
        if self.endpoint_url.contains("/rest") {
            Protocol::Rest
        } else if self.endpoint_url.contains("/soap") {
            Protocol::Soap
        } else {
            Protocol::XmlRpc
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
    }

    pub fn schema_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_ttl_seconds)
    }

    /// Builds the username/API-key credential matching the transport's
    /// placement. Returns `None` when either part is missing.
    pub fn authentication(
        &self,
        placement: CredentialPlacement,
    ) -> Result<Option<Box<dyn Authentication>>, ApiError> {
        let (Some(username), Some(api_key)) = (&self.username, &self.api_key) else {
            return Ok(None);
        };
        let auth: Box<dyn Authentication> = match placement {
            CredentialPlacement::Headers => Box::new(BasicAuthentication::new(username, api_key)?),
            CredentialPlacement::HttpBasic => {
                Box::new(BasicHttpAuthentication::new(username, api_key)?)
            }
        };
        Ok(Some(auth))
    }
}
