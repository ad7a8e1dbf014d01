//! The call descriptor.
//!
//! A [`Request`] describes one logical remote call: the target, its arguments,
//! the header bag, the transport knobs, and, once executed, the diagnostics the
//! executing transport wrote back. It is constructed fresh per call and never
//! shared between threads.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::{ApiError, CallId, Map, Response, Timestamp, TlsVerify, Value};

/// Header name used for string (new-style) object masks.
pub const GENERIC_MASK_HEADER: &str = "SoftLayer_ObjectMask";

/// Methods whose positional arguments carry credentials and must never be
/// rendered in logs.
pub const CREDENTIAL_METHODS: &[&str] = &[
    "performExternalAuthentication",
    "refreshEncryptedToken",
    "getPortalLoginToken",
];

/// Envelope tokens a string mask may already start with.
const MASK_ENVELOPES: &[&str] = &["mask", "[", "filteredMask"];

// ---------------------------------------------------------------------------
// Object masks
// ---------------------------------------------------------------------------

/// A projection telling the remote service which nested fields to return.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectMask {
    /// String mask, already normalised to its `mask[...]` envelope.
    Text(String),
    /// Legacy nested-mapping mask.
    Tree(Value),
}

impl ObjectMask {
    /// Builds a string mask: trims it and wraps it as `mask[...]` unless it
    /// already starts with `mask`, `[` or `filteredMask`.
    pub fn text(mask: &str) -> Self {
        let mask = mask.trim();
        if MASK_ENVELOPES.iter().any(|prefix| mask.starts_with(prefix)) {
            ObjectMask::Text(mask.to_string())
        } else {
            ObjectMask::Text(format!("mask[{mask}]"))
        }
    }

    /// Rejects masks a server could only answer with a parse fault.
    pub fn validate(&self) -> Result<(), ApiError> {
        match self {
            ObjectMask::Text(mask) => {
                if mask == "mask[]" || mask.is_empty() {
                    return Err(ApiError::invalid_request("Malformed Mask: mask is empty"));
                }
                let mut depth: i64 = 0;
                for c in mask.chars() {
                    match c {
                        '[' => depth += 1,
                        ']' => depth -= 1,
                        _ => {}
                    }
                    if depth < 0 {
                        break;
                    }
                }
                if depth != 0 {
                    return Err(ApiError::invalid_request(format!(
                        "Malformed Mask: unbalanced brackets in '{mask}'"
                    )));
                }
                Ok(())
            }
            ObjectMask::Tree(Value::Struct(_)) => Ok(()),
            ObjectMask::Tree(other) => Err(ApiError::invalid_request(format!(
                "Malformed Mask: expected a mapping, got {}",
                other.type_name()
            ))),
        }
    }
}

impl From<&str> for ObjectMask {
    fn from(mask: &str) -> Self {
        ObjectMask::text(mask)
    }
}

impl From<String> for ObjectMask {
    fn from(mask: String) -> Self {
        ObjectMask::text(&mask)
    }
}

impl From<Value> for ObjectMask {
    fn from(mask: Value) -> Self {
        match mask {
            Value::String(text) => ObjectMask::text(&text),
            other => ObjectMask::Tree(other),
        }
    }
}

impl std::fmt::Display for ObjectMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectMask::Text(mask) => {
                let cleaned: Vec<&str> = mask.split_whitespace().collect();
                f.write_str(&cleaned.join(" "))
            }
            ObjectMask::Tree(tree) => write!(f, "{tree}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Transport request object: one logical remote call.
#[derive(Clone, Default)]
pub struct Request {
    /// Correlates log events for this call.
    pub call_id: CallId,

    /// API service name, e.g. `SoftLayer_Account`.
    pub service: String,

    /// API method name, e.g. `getObject`.
    pub method: String,

    /// Positional parameters.
    pub args: Vec<Value>,

    /// Header bag: authentication, masks, filters, limits, init parameters.
    pub headers: Map,

    /// HTTP Basic user, set by credential variants that authenticate at the
    /// transport level.
    pub transport_user: Option<String>,

    /// HTTP Basic password paired with [`Request::transport_user`].
    pub transport_password: Option<String>,

    /// Raw HTTP headers.
    pub transport_headers: BTreeMap<String, String>,

    /// TLS verification override. `None` defers to the transport default.
    pub verify: Option<TlsVerify>,

    /// Client certificate (PEM with key) path.
    pub cert: Option<PathBuf>,

    /// Proxy override. `None` defers to the transport default.
    pub proxy: Option<String>,

    /// Timeout override. `None` defers to the transport default.
    pub timeout: Option<Duration>,

    /// Selects a specific remote object instance.
    pub identifier: Option<i64>,

    /// Predicate constraining list results. Must be a mapping.
    pub filter: Option<Value>,

    mask: Option<ObjectMask>,
    limit: Option<u32>,
    offset: Option<u32>,

    // Diagnostics, written once by the executing transport.
    /// Fully constructed URL.
    pub url: Option<String>,
    /// Serialised request body.
    pub payload: Option<String>,
    /// Decoded result on success.
    pub result: Option<Response>,
    /// Error raised by the call.
    pub error: Option<ApiError>,
    /// When the transport started the call.
    pub start_time: Option<Timestamp>,
    /// When the transport finished the call.
    pub end_time: Option<Timestamp>,
}

impl Request {
    /// Creates a request for `service::method` with no arguments.
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            ..Self::default()
        }
    }

    /// Returns the object mask, if any.
    pub fn mask(&self) -> Option<&ObjectMask> {
        self.mask.as_ref()
    }

    /// Sets the object mask. String masks are normalised on the way in.
    pub fn set_mask(&mut self, mask: impl Into<ObjectMask>) {
        self.mask = Some(mask.into());
    }

    /// Removes the object mask.
    pub fn clear_mask(&mut self) {
        self.mask = None;
    }

    /// Returns the result limit, if any.
    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    /// Sets the result limit. An unset offset becomes `0`.
    pub fn set_limit(&mut self, limit: u32) {
        self.limit = Some(limit);
        self.offset.get_or_insert(0);
    }

    /// Returns the result offset, if any.
    pub fn offset(&self) -> Option<u32> {
        self.offset
    }

    /// Sets the result offset.
    pub fn set_offset(&mut self, offset: u32) {
        self.offset = Some(offset);
    }

    /// Elapsed seconds between start and end, once both are recorded.
    pub fn elapsed_seconds(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end.seconds_since(start)),
            _ => None,
        }
    }

    /// Builds the RPC-style header bag: the caller's headers plus derived
    /// init-parameter, mask, filter and result-limit entries.
    ///
    /// Shared by the protocols that carry headers in the message itself.
    pub fn rpc_headers(&self) -> Result<Map, ApiError> {
        let mut headers = self.headers.clone();

        if let Some(id) = self.identifier {
            let mut init = Map::new();
            init.insert("id".into(), Value::Int(id));
            headers.insert(format!("{}InitParameters", self.service), Value::Struct(init));
        }

        if let Some(mask) = &self.mask {
            mask.validate()?;
            let (name, value) = match mask {
                ObjectMask::Tree(tree) => (format!("{}ObjectMask", self.service), tree.clone()),
                ObjectMask::Text(text) => (GENERIC_MASK_HEADER.to_string(), Value::from(text.as_str())),
            };
            let mut body = Map::new();
            body.insert("mask".into(), value);
            headers.insert(name, Value::Struct(body));
        }

        if let Some(filter) = &self.filter {
            if !matches!(filter, Value::Struct(_)) {
                return Err(ApiError::invalid_request(format!(
                    "Object filter must be a mapping, got {}",
                    filter.type_name()
                )));
            }
            headers.insert(format!("{}ObjectFilter", self.service), filter.clone());
        }

        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            let mut result_limit = Map::new();
            result_limit.insert("limit".into(), Value::from(limit));
            result_limit.insert("offset".into(), Value::from(self.offset.unwrap_or(0)));
            headers.insert("resultLimit".into(), Value::Struct(result_limit));
        }

        Ok(headers)
    }

    /// Records a successful outcome.
    pub fn record_result(&mut self, result: &Response) {
        self.result = Some(result.clone());
        self.end_time = Some(Timestamp::now());
    }

    /// Records a failed outcome.
    pub fn record_error(&mut self, error: &ApiError) {
        self.error = Some(error.clone());
        self.end_time = Some(Timestamp::now());
    }
}

fn or_dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// `Service::method(id=…, mask='…', filter='…', args=…, limit=…, offset=…)`.
///
/// Arguments of credential-bearing methods are censored.
impl std::fmt::Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args = if CREDENTIAL_METHODS.contains(&self.method.as_str()) {
            "*************".to_string()
        } else {
            Value::Array(self.args.clone()).to_string()
        };
        write!(
            f,
            "{}::{}(id={}, mask='{}', filter='{}', args={}, limit={}, offset={})",
            self.service,
            self.method,
            or_dash(self.identifier),
            or_dash(self.mask.as_ref()),
            or_dash(self.filter.as_ref()),
            args,
            or_dash(self.limit),
            or_dash(self.offset),
        )
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("call_id", &self.call_id)
            .field("call", &self.to_string())
            .field("transport_user", &self.transport_user)
            .field("transport_password", &self.transport_password.as_ref().map(|_| "<redacted>"))
            .field("transport_headers", &self.transport_headers.keys().collect::<Vec<_>>())
            .field("verify", &self.verify)
            .field("cert", &self.cert)
            .field("proxy", &self.proxy)
            .field("timeout", &self.timeout)
            .field("url", &self.url)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_masks_are_wrapped() {
        assert_eq!(ObjectMask::text(" id,hostname "), ObjectMask::Text("mask[id,hostname]".into()));
        assert_eq!(ObjectMask::text("something.nested"), ObjectMask::Text("mask[something.nested]".into()));
    }

    #[test]
    fn enveloped_masks_are_kept() {
        for mask in ["mask[id]", "mask.something.nested", "[id]", "filteredMask[a[b]]"] {
            assert_eq!(ObjectMask::text(mask), ObjectMask::Text(mask.into()));
        }
    }

    #[test]
    fn unbalanced_masks_are_rejected() {
        let err = ObjectMask::text("id,children[id").validate().unwrap_err();
        assert!(err.fault_string().contains("unbalanced"));
        assert!(ObjectMask::text("").validate().is_err());
    }

    #[test]
    fn limit_implies_zero_offset() {
        let mut request = Request::new("SoftLayer_Account", "getVirtualGuests");
        request.set_limit(10);
        assert_eq!(request.offset(), Some(0));

        let mut request = Request::new("SoftLayer_Account", "getVirtualGuests");
        request.set_offset(5);
        request.set_limit(10);
        assert_eq!(request.offset(), Some(5));
    }

    #[test]
    fn header_bag_contains_derived_entries() {
        let mut request = Request::new("SoftLayer_Service", "getObject");
        request.identifier = Some(1234);
        request.set_mask("id");
        request.filter = Some(Value::from(json!({"TYPE": {"attribute": {"operation": "^= prefix"}}})));
        request.set_limit(10);

        let headers = request.rpc_headers().unwrap();
        assert_eq!(
            headers["SoftLayer_ServiceInitParameters"],
            Value::from(json!({"id": 1234}))
        );
        assert_eq!(headers[GENERIC_MASK_HEADER], Value::from(json!({"mask": "mask[id]"})));
        assert!(headers.contains_key("SoftLayer_ServiceObjectFilter"));
        assert_eq!(
            headers["resultLimit"],
            Value::from(json!({"limit": 10, "offset": 0}))
        );
    }

    #[test]
    fn mapping_masks_use_service_header() {
        let mut request = Request::new("SoftLayer_Service", "getObject");
        request.set_mask(Value::from(json!({"something": "nested"})));
        let headers = request.rpc_headers().unwrap();
        assert_eq!(
            headers["SoftLayer_ServiceObjectMask"],
            Value::from(json!({"mask": {"something": "nested"}}))
        );
    }

    #[test]
    fn non_mapping_filters_are_rejected() {
        let mut request = Request::new("SoftLayer_Service", "getObject");
        request.filter = Some(Value::from("id > 5"));
        let err = request.rpc_headers().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedRequest);
    }

    #[test]
    fn display_censors_credentials() {
        let mut request = Request::new("SoftLayer_User_Customer", "getPortalLoginToken");
        request.args = vec!["user".into(), "hunter2".into()];
        let shown = request.to_string();
        assert!(!shown.contains("hunter2"));
        assert!(shown.starts_with("SoftLayer_User_Customer::getPortalLoginToken("));
    }

    #[test]
    fn debug_redacts_transport_password() {
        let mut request = Request::new("SoftLayer_Account", "getObject");
        request.transport_user = Some("apikey".into());
        request.transport_password = Some("secret-key".into());
        assert!(!format!("{request:?}").contains("secret-key"));
    }
}
