//! Authentication strategies.
//!
//! Each credential variant knows how to decorate a [`Request`] with what the
//! remote side needs to identify the caller. Decoration is pure: no I/O, no
//! state change on the credential, and applying it twice leaves the request in
//! the same state as applying it once.
//!
//! Credentials are constructed once per client session and are `Send + Sync`.
//! Their `Debug` output never includes secrets.

use std::path::PathBuf;

use crate::{ApiError, Map, Request, TlsVerify, Value};

/// Username that routes an API key into HTTP Basic fields instead of the
/// `authenticate` header.
pub const API_KEY_USERNAME: &str = "apikey";

/// Header carrying username/API-key or session-token credentials.
pub const AUTHENTICATE_HEADER: &str = "authenticate";

/// Header carrying employee session credentials.
pub const EMPLOYEE_HEADER: &str = "employeesession";

const REDACTED: &str = "<redacted>";

// ---------------------------------------------------------------------------
// Strategy trait
// ---------------------------------------------------------------------------

/// Where a transport expects credentials to live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialPlacement {
    /// In the RPC header bag (XML-RPC and SOAP).
    #[default]
    Headers,
    /// In HTTP Basic transport fields (REST).
    HttpBasic,
}

/// Decorates a call descriptor with credentials.
pub trait Authentication: Send + Sync + std::fmt::Debug {
    /// Writes credentials into `request`.
    fn decorate(&self, request: &mut Request);
}

fn non_empty(field: &str, value: String) -> Result<String, ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::configuration(format!("{field} must not be empty")))
    } else {
        Ok(value)
    }
}

fn set_transport_basic(request: &mut Request, user: &str, password: &str) {
    request.transport_user = Some(user.to_string());
    request.transport_password = Some(password.to_string());
}

// ---------------------------------------------------------------------------
// Username / API key
// ---------------------------------------------------------------------------

/// Username and API key sent in the `authenticate` header.
///
/// The sentinel username [`API_KEY_USERNAME`] sends the key as HTTP Basic
/// credentials instead.
#[derive(Clone)]
pub struct BasicAuthentication {
    username: String,
    api_key: String,
}

impl BasicAuthentication {
    /// Creates the credential. Fails when either part is empty.
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            username: non_empty("username", username.into())?,
            api_key: non_empty("api key", api_key.into())?,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Authentication for BasicAuthentication {
    fn decorate(&self, request: &mut Request) {
        if self.username == API_KEY_USERNAME {
            set_transport_basic(request, &self.username, &self.api_key);
            return;
        }
        let mut auth = Map::new();
        auth.insert("username".into(), Value::from(self.username.as_str()));
        auth.insert("apiKey".into(), Value::from(self.api_key.as_str()));
        request.headers.insert(AUTHENTICATE_HEADER.into(), Value::Struct(auth));
    }
}

impl std::fmt::Debug for BasicAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthentication")
            .field("username", &self.username)
            .field("api_key", &REDACTED)
            .finish()
    }
}

/// Username and API key sent as HTTP Basic credentials.
#[derive(Clone)]
pub struct BasicHttpAuthentication {
    username: String,
    api_key: String,
}

impl BasicHttpAuthentication {
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            username: non_empty("username", username.into())?,
            api_key: non_empty("api key", api_key.into())?,
        })
    }
}

impl Authentication for BasicHttpAuthentication {
    fn decorate(&self, request: &mut Request) {
        set_transport_basic(request, &self.username, &self.api_key);
    }
}

impl std::fmt::Debug for BasicHttpAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicHttpAuthentication")
            .field("username", &self.username)
            .field("api_key", &REDACTED)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Session token
// ---------------------------------------------------------------------------

/// Portal session token obtained from a password login.
#[derive(Clone)]
pub struct TokenAuthentication {
    user_id: i64,
    auth_token: String,
}

impl TokenAuthentication {
    pub fn new(user_id: i64, auth_token: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            user_id,
            auth_token: non_empty("auth token", auth_token.into())?,
        })
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}

impl Authentication for TokenAuthentication {
    fn decorate(&self, request: &mut Request) {
        let mut auth = Map::new();
        auth.insert("complexType".into(), Value::from("PortalLoginToken"));
        auth.insert("userId".into(), Value::Int(self.user_id));
        auth.insert("authToken".into(), Value::from(self.auth_token.as_str()));
        request.headers.insert(AUTHENTICATE_HEADER.into(), Value::Struct(auth));
    }
}

impl std::fmt::Debug for TokenAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthentication")
            .field("user_id", &self.user_id)
            .field("auth_token", &REDACTED)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Certificate
// ---------------------------------------------------------------------------

/// Mutual-TLS client certificate. Adds no header.
#[derive(Debug, Clone)]
pub struct X509Authentication {
    cert: PathBuf,
    ca_bundle: PathBuf,
}

impl X509Authentication {
    /// `cert` is a PEM file holding the certificate and its key; `ca_bundle`
    /// verifies the server.
    pub fn new(cert: impl Into<PathBuf>, ca_bundle: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            ca_bundle: ca_bundle.into(),
        }
    }
}

impl Authentication for X509Authentication {
    fn decorate(&self, request: &mut Request) {
        request.cert = Some(self.cert.clone());
        request.verify = Some(TlsVerify::CaBundle(self.ca_bundle.clone()));
    }
}

// ---------------------------------------------------------------------------
// Bearer token
// ---------------------------------------------------------------------------

/// IAM bearer token sent as an `Authorization` header.
///
/// The refresh token is kept for callers that renew the session; it is never
/// sent on calls.
#[derive(Clone)]
pub struct BearerAuthentication {
    username: String,
    token: String,
    refresh_token: Option<String>,
}

impl BearerAuthentication {
    pub fn new(
        username: impl Into<String>,
        token: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            username: username.into(),
            token: non_empty("bearer token", token.into())?,
            refresh_token,
        })
    }

    /// Display name used in logs.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }
}

impl Authentication for BearerAuthentication {
    fn decorate(&self, request: &mut Request) {
        request
            .transport_headers
            .insert("Authorization".into(), format!("Bearer {}", self.token));
    }
}

impl std::fmt::Debug for BearerAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthentication")
            .field("username", &self.username)
            .field("token", &REDACTED)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| REDACTED))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Employee impersonation
// ---------------------------------------------------------------------------

/// Employee session. Header-based for transports that carry RPC headers,
/// HTTP Basic otherwise.
#[derive(Clone)]
pub struct EmployeeAuthentication {
    user_id: i64,
    auth_hash: String,
    placement: CredentialPlacement,
}

impl EmployeeAuthentication {
    pub fn new(
        user_id: i64,
        auth_hash: impl Into<String>,
        placement: CredentialPlacement,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            user_id,
            auth_hash: non_empty("auth hash", auth_hash.into())?,
            placement,
        })
    }
}

impl Authentication for EmployeeAuthentication {
    fn decorate(&self, request: &mut Request) {
        match self.placement {
            CredentialPlacement::Headers => {
                let mut session = Map::new();
                session.insert("userId".into(), Value::Int(self.user_id));
                session.insert("authToken".into(), Value::from(self.auth_hash.as_str()));
                request.headers.insert(EMPLOYEE_HEADER.into(), Value::Struct(session));
            }
            CredentialPlacement::HttpBasic => {
                set_transport_basic(request, &self.user_id.to_string(), &self.auth_hash);
            }
        }
    }
}

impl std::fmt::Debug for EmployeeAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmployeeAuthentication")
            .field("user_id", &self.user_id)
            .field("auth_hash", &REDACTED)
            .field("placement", &self.placement)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> Request {
        Request::new("SoftLayer_Account", "getObject")
    }

    #[test]
    fn basic_auth_sets_authenticate_header() {
        let auth = BasicAuthentication::new("USERNAME", "API_KEY").unwrap();
        let mut req = request();
        auth.decorate(&mut req);
        assert_eq!(
            req.headers[AUTHENTICATE_HEADER],
            Value::from(json!({"username": "USERNAME", "apiKey": "API_KEY"}))
        );
        assert!(req.transport_user.is_none());
    }

    #[test]
    fn apikey_sentinel_uses_http_basic() {
        let auth = BasicAuthentication::new("apikey", "0123").unwrap();
        let mut req = request();
        auth.decorate(&mut req);
        assert!(req.headers.is_empty());
        assert_eq!(req.transport_user.as_deref(), Some("apikey"));
        assert_eq!(req.transport_password.as_deref(), Some("0123"));
    }

    #[test]
    fn empty_username_is_a_configuration_error() {
        let err = BasicAuthentication::new(" ", "key").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn token_auth_header_shape() {
        let auth = TokenAuthentication::new(12345, "TOKEN").unwrap();
        let mut req = request();
        auth.decorate(&mut req);
        assert_eq!(
            req.headers[AUTHENTICATE_HEADER],
            Value::from(json!({"complexType": "PortalLoginToken", "userId": 12345, "authToken": "TOKEN"}))
        );
    }

    #[test]
    fn decoration_is_idempotent() {
        let strategies: Vec<Box<dyn Authentication>> = vec![
            Box::new(BasicAuthentication::new("user", "key").unwrap()),
            Box::new(BasicHttpAuthentication::new("user", "key").unwrap()),
            Box::new(TokenAuthentication::new(1, "tok").unwrap()),
            Box::new(X509Authentication::new("/tmp/cert.pem", "/tmp/ca.pem")),
            Box::new(BearerAuthentication::new("user", "tok", None).unwrap()),
            Box::new(EmployeeAuthentication::new(1, "hash", CredentialPlacement::Headers).unwrap()),
        ];
        for auth in strategies {
            let mut once = request();
            auth.decorate(&mut once);
            let mut twice = once.clone();
            auth.decorate(&mut twice);
            assert_eq!(once.headers, twice.headers, "{auth:?}");
            assert_eq!(once.transport_headers, twice.transport_headers);
            assert_eq!(once.transport_user, twice.transport_user);
            assert_eq!(once.verify, twice.verify);
        }
    }

    #[test]
    fn certificate_sets_tls_fields_only() {
        let auth = X509Authentication::new("/tmp/cert.pem", "/tmp/ca.pem");
        let mut req = request();
        auth.decorate(&mut req);
        assert!(req.headers.is_empty());
        assert_eq!(req.cert, Some(PathBuf::from("/tmp/cert.pem")));
        assert_eq!(req.verify, Some(TlsVerify::CaBundle("/tmp/ca.pem".into())));
    }

    #[test]
    fn bearer_sets_authorization_header() {
        let auth = BearerAuthentication::new("user", "abc", Some("refresh".into())).unwrap();
        let mut req = request();
        auth.decorate(&mut req);
        assert_eq!(req.transport_headers["Authorization"], "Bearer abc");
        assert_eq!(auth.refresh_token(), Some("refresh"));
    }

    #[test]
    fn employee_placement_follows_transport() {
        let headers = EmployeeAuthentication::new(7, "hash", CredentialPlacement::Headers).unwrap();
        let mut req = request();
        headers.decorate(&mut req);
        assert_eq!(
            req.headers[EMPLOYEE_HEADER],
            Value::from(json!({"userId": 7, "authToken": "hash"}))
        );

        let basic = EmployeeAuthentication::new(7, "hash", CredentialPlacement::HttpBasic).unwrap();
        let mut req = request();
        basic.decorate(&mut req);
        assert!(req.headers.is_empty());
        assert_eq!(req.transport_user.as_deref(), Some("7"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let shown = format!(
            "{:?} {:?} {:?}",
            BasicAuthentication::new("user", "s3cret-key").unwrap(),
            TokenAuthentication::new(1, "s3cret-token").unwrap(),
            BearerAuthentication::new("user", "s3cret-bearer", None).unwrap(),
        );
        assert!(!shown.contains("s3cret"));
    }
}
