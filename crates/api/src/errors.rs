//! Error taxonomy and retry-policy types for the call layer.
//!
//! [`ApiError`] is the only error type that leaves a transport. Every wire
//! protocol maps its native faults into it, so callers never need to know which
//! protocol carried a call.
//!
//! [`RetryPolicy`] is a cross-cutting concern: the generic retry wrapper in
//! [`crate::retry`] asks each error for its policy unless the caller supplies
//! its own predicate.
//!
//! ## Fault codes
//!
//! Remote faults are classified by the XML-RPC error-code convention:
//!
//! | Code | Variant | Kind |
//! |------|---------|------|
//! | -32700 | [`ApiError::NotWellFormed`] | [`ErrorKind::MalformedRequest`] |
//! | -32701 | [`ApiError::UnsupportedEncoding`] | [`ErrorKind::MalformedRequest`] |
//! | -32702 | [`ApiError::InvalidCharacter`] | [`ErrorKind::MalformedRequest`] |
//! | -32600 | [`ApiError::SpecViolation`] | [`ErrorKind::Server`] |
//! | -32601 | [`ApiError::MethodNotFound`] | [`ErrorKind::Server`] |
//! | -32602 | [`ApiError::InvalidMethodParameters`] | [`ErrorKind::Server`] |
//! | -32603 | [`ApiError::InternalError`] | [`ErrorKind::Server`] |
//! | -32500 | [`ApiError::Application`] | [`ErrorKind::Application`] |
//! | -32400 | [`ApiError::RemoteSystem`] | [`ErrorKind::RemoteSystem`] |
//! | -32300 | [`ApiError::Transport`] | [`ErrorKind::Transport`] |
//!
//! Anything else becomes [`ApiError::Api`], except for the token/session fault
//! names listed in [`AUTHENTICATION_FAULTS`].

use thiserror::Error;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry.
///
/// ## Rules
///
/// - `Retryable`: remote-system failures and transport failures (connection
///   refused, DNS, timeouts, undecodable HTTP error bodies).
/// - `NonRetryable`: everything else. Retrying a malformed request, a rejected
///   business rule or bad credentials cannot succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable,
    /// The operation must not be retried.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Fault codes
// ---------------------------------------------------------------------------

/// Machine-readable fault identifier returned by the remote service.
///
/// XML-RPC servers use integers; the provider's own exceptions use dotted
/// class-like names (e.g. `SoftLayer_Exception_ObjectNotFound`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaultCode {
    /// Numeric fault code (also used for HTTP status codes).
    Number(i64),
    /// Named fault code.
    Name(String),
}

impl FaultCode {
    /// Returns the numeric code, parsing named codes that are really numbers.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            FaultCode::Number(n) => Some(*n),
            FaultCode::Name(name) => name.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for FaultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultCode::Number(n) => write!(f, "{n}"),
            FaultCode::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for FaultCode {
    fn from(n: i64) -> Self {
        FaultCode::Number(n)
    }
}

impl From<&str> for FaultCode {
    fn from(name: &str) -> Self {
        FaultCode::Name(name.to_string())
    }
}

impl From<String> for FaultCode {
    fn from(name: String) -> Self {
        FaultCode::Name(name)
    }
}

/// Fault names that signal missing, invalid or expired credentials.
pub const AUTHENTICATION_FAULTS: &[&str] = &[
    "SoftLayer_Exception_InvalidLegacyToken",
    "SoftLayer_Exception_EncryptedToken_Expired",
    "SoftLayer_Exception_NotLoggedIn",
];

// ---------------------------------------------------------------------------
// Error kinds
// ---------------------------------------------------------------------------

/// Coarse classification of an [`ApiError`].
///
/// Callers that only care about "what sort of failure" match on this instead of
/// the individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Parse/encoding errors and ill-formed requests. Never retried.
    MalformedRequest,
    /// Method not found, invalid parameters, internal failure on the remote side.
    Server,
    /// Business-rule rejection from the remote service.
    Application,
    /// Upstream infrastructure failure reported by the remote service.
    RemoteSystem,
    /// Connection, DNS, proxy or undecodable HTTP failures.
    Transport,
    /// Missing or invalid credentials.
    Authentication,
    /// Remote fault with a code outside the classified table.
    Api,
    /// Invalid client-side configuration.
    Configuration,
    /// No canned response exists for a fixture call.
    NotImplemented,
}

// ---------------------------------------------------------------------------
// The error type
// ---------------------------------------------------------------------------

/// Errors produced by any transport, decorator, or composition layer.
///
/// Immutable once constructed. Remote faults carry the original fault code and
/// fault string verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The request payload could not be parsed by the server (-32700), or a
    /// response could not be parsed by the client.
    #[error("NotWellFormed({code}): {message}")]
    NotWellFormed { code: FaultCode, message: String },

    /// Unsupported character encoding (-32701).
    #[error("UnsupportedEncoding({code}): {message}")]
    UnsupportedEncoding { code: FaultCode, message: String },

    /// Invalid character for encoding (-32702).
    #[error("InvalidCharacter({code}): {message}")]
    InvalidCharacter { code: FaultCode, message: String },

    /// Request does not conform to the protocol (-32600).
    #[error("SpecViolation({code}): {message}")]
    SpecViolation { code: FaultCode, message: String },

    /// Requested method does not exist on the service (-32601).
    #[error("MethodNotFound({code}): {message}")]
    MethodNotFound { code: FaultCode, message: String },

    /// Method parameters were rejected (-32602).
    #[error("InvalidMethodParameters({code}): {message}")]
    InvalidMethodParameters { code: FaultCode, message: String },

    /// Internal server failure (-32603).
    #[error("InternalError({code}): {message}")]
    InternalError { code: FaultCode, message: String },

    /// Business-rule rejection (-32500).
    #[error("ApplicationError({code}): {message}")]
    Application { code: FaultCode, message: String },

    /// Upstream system failure (-32400).
    #[error("RemoteSystemError({code}): {message}")]
    RemoteSystem { code: FaultCode, message: String },

    /// Connection-level failure. `status` is the HTTP status, or `0` when no
    /// HTTP exchange took place at all.
    #[error("TransportError({status}): {message}")]
    Transport { status: i64, message: String },

    /// Credentials missing, invalid or expired.
    #[error("Unauthenticated({code}): {message}")]
    Authentication { code: FaultCode, message: String },

    /// Remote fault with an unclassified code.
    #[error("SoftLayerAPIError({code}): {message}")]
    Api { code: FaultCode, message: String },

    /// A request was rejected client-side before anything was sent.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Client construction or configuration problem.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The fixture registry has no response for this call.
    #[error("{service}::{method} fixture is not implemented")]
    NotImplemented { service: String, method: String },
}

impl ApiError {
    /// Maps a remote fault into the taxonomy.
    ///
    /// Unknown numeric or named codes become [`ApiError::Api`]; the fault string
    /// is preserved verbatim in every case.
    pub fn from_fault(code: impl Into<FaultCode>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();

        if let FaultCode::Name(name) = &code {
            if AUTHENTICATION_FAULTS.contains(&name.as_str()) {
                return ApiError::Authentication { code, message };
            }
        }

        match code.as_number() {
            Some(-32700) => ApiError::NotWellFormed { code, message },
            Some(-32701) => ApiError::UnsupportedEncoding { code, message },
            Some(-32702) => ApiError::InvalidCharacter { code, message },
            Some(-32600) => ApiError::SpecViolation { code, message },
            Some(-32601) => ApiError::MethodNotFound { code, message },
            Some(-32602) => ApiError::InvalidMethodParameters { code, message },
            Some(-32603) => ApiError::InternalError { code, message },
            Some(-32500) => ApiError::Application { code, message },
            Some(-32400) => ApiError::RemoteSystem { code, message },
            Some(-32300) => ApiError::Transport {
                status: -32300,
                message,
            },
            _ => ApiError::Api { code, message },
        }
    }

    /// Shorthand for a transport failure.
    pub fn transport(status: i64, message: impl Into<String>) -> Self {
        ApiError::Transport {
            status,
            message: message.into(),
        }
    }

    /// Shorthand for a client-side malformed request.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ApiError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        ApiError::Configuration {
            message: message.into(),
        }
    }

    /// Returns the coarse classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotWellFormed { .. }
            | ApiError::UnsupportedEncoding { .. }
            | ApiError::InvalidCharacter { .. }
            | ApiError::InvalidRequest { .. } => ErrorKind::MalformedRequest,
            ApiError::SpecViolation { .. }
            | ApiError::MethodNotFound { .. }
            | ApiError::InvalidMethodParameters { .. }
            | ApiError::InternalError { .. } => ErrorKind::Server,
            ApiError::Application { .. } => ErrorKind::Application,
            ApiError::RemoteSystem { .. } => ErrorKind::RemoteSystem,
            ApiError::Transport { .. } => ErrorKind::Transport,
            ApiError::Authentication { .. } => ErrorKind::Authentication,
            ApiError::Api { .. } => ErrorKind::Api,
            ApiError::Configuration { .. } => ErrorKind::Configuration,
            ApiError::NotImplemented { .. } => ErrorKind::NotImplemented,
        }
    }

    /// Returns the machine-readable fault code, when the error carries one.
    ///
    /// Transport errors report their HTTP status as a numeric code.
    pub fn fault_code(&self) -> Option<FaultCode> {
        match self {
            ApiError::NotWellFormed { code, .. }
            | ApiError::UnsupportedEncoding { code, .. }
            | ApiError::InvalidCharacter { code, .. }
            | ApiError::SpecViolation { code, .. }
            | ApiError::MethodNotFound { code, .. }
            | ApiError::InvalidMethodParameters { code, .. }
            | ApiError::InternalError { code, .. }
            | ApiError::Application { code, .. }
            | ApiError::RemoteSystem { code, .. }
            | ApiError::Authentication { code, .. }
            | ApiError::Api { code, .. } => Some(code.clone()),
            ApiError::Transport { status, .. } => Some(FaultCode::Number(*status)),
            ApiError::InvalidRequest { .. }
            | ApiError::Configuration { .. }
            | ApiError::NotImplemented { .. } => None,
        }
    }

    /// Returns the human-readable fault string.
    pub fn fault_string(&self) -> String {
        match self {
            ApiError::NotWellFormed { message, .. }
            | ApiError::UnsupportedEncoding { message, .. }
            | ApiError::InvalidCharacter { message, .. }
            | ApiError::SpecViolation { message, .. }
            | ApiError::MethodNotFound { message, .. }
            | ApiError::InvalidMethodParameters { message, .. }
            | ApiError::InternalError { message, .. }
            | ApiError::Application { message, .. }
            | ApiError::RemoteSystem { message, .. }
            | ApiError::Transport { message, .. }
            | ApiError::Authentication { message, .. }
            | ApiError::Api { message, .. }
            | ApiError::InvalidRequest { message }
            | ApiError::Configuration { message } => message.clone(),
            ApiError::NotImplemented { .. } => self.to_string(),
        }
    }

    /// Whether the generic retry wrapper should retry this error by default.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self.kind() {
            ErrorKind::RemoteSystem | ErrorKind::Transport => RetryPolicy::Retryable,
            _ => RetryPolicy::NonRetryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_found_is_a_server_error_with_verbatim_message() {
        let err = ApiError::from_fault(-32601, "Method 'getObjectzz' does not exist");
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(matches!(err, ApiError::MethodNotFound { .. }));
        assert_eq!(err.fault_string(), "Method 'getObjectzz' does not exist");
        assert_eq!(err.fault_code(), Some(FaultCode::Number(-32601)));
    }

    #[test]
    fn string_encoded_numeric_codes_are_classified() {
        let err = ApiError::from_fault("-32700", "bad xml");
        assert!(matches!(err, ApiError::NotWellFormed { .. }));
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
    }

    #[test]
    fn table_covers_every_kind() {
        let cases = [
            (-32701, ErrorKind::MalformedRequest),
            (-32702, ErrorKind::MalformedRequest),
            (-32600, ErrorKind::Server),
            (-32602, ErrorKind::Server),
            (-32603, ErrorKind::Server),
            (-32500, ErrorKind::Application),
            (-32400, ErrorKind::RemoteSystem),
            (-32300, ErrorKind::Transport),
            (42, ErrorKind::Api),
        ];
        for (code, kind) in cases {
            assert_eq!(ApiError::from_fault(code, "x").kind(), kind, "code {code}");
        }
    }

    #[test]
    fn named_faults_fall_back_to_api_errors() {
        let err = ApiError::from_fault("SoftLayer_Exception_ObjectNotFound", "Unable to find object");
        assert_eq!(err.kind(), ErrorKind::Api);
        assert_eq!(
            err.fault_code(),
            Some(FaultCode::Name("SoftLayer_Exception_ObjectNotFound".into()))
        );
    }

    #[test]
    fn expired_tokens_are_authentication_errors() {
        let err = ApiError::from_fault("SoftLayer_Exception_EncryptedToken_Expired", "expired");
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
    }

    #[test]
    fn only_remote_system_and_transport_are_retryable() {
        assert_eq!(
            ApiError::transport(0, "refused").retry_policy(),
            RetryPolicy::Retryable
        );
        assert_eq!(
            ApiError::from_fault(-32400, "down").retry_policy(),
            RetryPolicy::Retryable
        );
        assert_eq!(
            ApiError::from_fault(-32500, "nope").retry_policy(),
            RetryPolicy::NonRetryable
        );
        assert_eq!(
            ApiError::from_fault(-32601, "nope").retry_policy(),
            RetryPolicy::NonRetryable
        );
    }

    #[test]
    fn transport_errors_report_status_as_fault_code() {
        let err = ApiError::transport(404, "Not Found");
        assert_eq!(err.fault_code(), Some(FaultCode::Number(404)));
        assert_eq!(err.to_string(), "TransportError(404): Not Found");
    }
}
