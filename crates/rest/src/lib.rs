//! REST transport for the slapi call layer.
//!
//! Implements [`api::Transport`] over the JSON REST endpoint:
//!
//! ```text
//! GET|POST|PUT <endpoint>/<service>[/<id>]/<method>.json
//!     ?objectMask=mask[...]&objectFilter={...}&resultLimit=<offset>,<limit>
//! ```
//!
//! `createObject(s)` are sent as `POST` and `editObject(s)` as `PUT`, with or
//! without arguments. Any other method is a `GET`, or a `POST` when it has
//! positional arguments. Arguments travel as a `{"parameters": [...]}` body;
//! byte strings are base64-encoded by the value serialiser.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Credentials travel as HTTP Basic, so this transport
//! reports [`CredentialPlacement::HttpBasic`].

use std::sync::Arc;
use std::time::Duration;

use api::{
    ApiError, CredentialPlacement, FaultCode, ObjectMask, Request, Response, Timestamp, TlsVerify,
    Transport, Value,
};
use http_session::{HttpMethod, HttpResponse, HttpSession, ReqwestSession, TransportSettings};
use serde::Serialize;
use tracing::{debug, warn};

/// Response header carrying the server-side total of a list result.
pub const TOTAL_ITEMS_HEADER: &str = "softlayer-total-items";

/// Methods whose HTTP verb is not `GET`.
pub const REST_SPECIAL_METHODS: &[(&str, HttpMethod)] = &[
    ("createObject", HttpMethod::Post),
    ("createObjects", HttpMethod::Post),
    ("editObject", HttpMethod::Put),
    ("editObjects", HttpMethod::Put),
];

const EMPTY_RESPONSE: &str = "Empty response.";

#[derive(Serialize)]
struct Body<'a> {
    parameters: &'a [Value],
}

/// The HTTP verb for a call. Special methods keep their verb regardless of
/// arguments; any other method is `POST` with arguments and `GET` without.
pub fn http_method(method: &str, has_args: bool) -> HttpMethod {
    match REST_SPECIAL_METHODS.iter().find(|(name, _)| *name == method) {
        Some((_, verb)) => *verb,
        None if has_args => HttpMethod::Post,
        None => HttpMethod::Get,
    }
}

/// REST transport.
pub struct RestTransport {
    endpoint: String,
    settings: TransportSettings,
    session: Arc<dyn HttpSession>,
}

impl RestTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            settings: TransportSettings::default(),
            session: Arc::new(ReqwestSession::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.settings.proxy = proxy;
        self
    }

    pub fn with_verify(mut self, verify: TlsVerify) -> Self {
        self.settings.verify = verify;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.settings.user_agent = user_agent.into();
        self
    }

    pub fn with_session(mut self, session: Arc<dyn HttpSession>) -> Self {
        self.session = session;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Query parameters: header-bag entries, then mask, limit and filter.
    fn query(request: &Request) -> Result<Vec<(String, String)>, ApiError> {
        let mut query: Vec<(String, String)> = request
            .headers
            .iter()
            .map(|(name, value)| {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), text)
            })
            .collect();

        if let Some(mask) = request.mask() {
            mask.validate()?;
            match mask {
                ObjectMask::Text(text) => query.push(("objectMask".into(), text.clone())),
                ObjectMask::Tree(_) => {
                    return Err(ApiError::invalid_request(
                        "Malformed Mask: the REST endpoint only accepts string masks",
                    ))
                }
            }
        }

        if request.limit().is_some() || request.offset().is_some() {
            let limit = request.limit().unwrap_or(0);
            let offset = request.offset().unwrap_or(0);
            query.push(("resultLimit".into(), format!("{offset},{limit}")));
        }

        if let Some(filter) = &request.filter {
            if !matches!(filter, Value::Struct(_)) {
                return Err(ApiError::invalid_request(format!(
                    "Object filter must be a mapping, got {}",
                    filter.type_name()
                )));
            }
            query.push(("objectFilter".into(), filter.to_string()));
        }

        Ok(query)
    }

    fn url(&self, request: &Request) -> String {
        let mut url = format!("{}/{}", self.endpoint, request.service);
        if let Some(id) = request.identifier {
            url.push_str(&format!("/{id}"));
        }
        format!("{url}/{}.json", request.method)
    }

    fn execute(&self, request: &mut Request) -> Result<Response, ApiError> {
        let query = Self::query(request)?;
        let verb = http_method(&request.method, !request.args.is_empty());

        if !request.args.is_empty() {
            let body = serde_json::to_string(&Body {
                parameters: &request.args,
            })
            .map_err(|e| ApiError::invalid_request(format!("cannot encode parameters: {e}")))?;
            request.payload = Some(body);
        }

        let mut http = self.settings.prepare(verb, self.url(request), request)?;
        http.query = query;
        http.body = request.payload.clone();
        if http.body.is_some() {
            http.headers
                .entry("Content-Type".into())
                .or_insert_with(|| "application/json".into());
        }
        request.url = Some(http.full_url()?.to_string());

        debug!(method = %verb, url = %http.url, "REST call");
        let response = self.session.send(&http)?;
        if !response.url.is_empty() {
            request.url = Some(response.url.clone());
        }

        if !response.is_success() {
            return Err(error_from_response(&response));
        }

        if response.body.is_empty() {
            return Err(ApiError::Api {
                code: FaultCode::Number(i64::from(response.status)),
                message: EMPTY_RESPONSE.into(),
            });
        }

        let parsed: serde_json::Value = serde_json::from_str(&response.body).map_err(|e| {
            warn!(error = %e, "REST response is not JSON");
            ApiError::Api {
                code: FaultCode::Number(i64::from(response.status)),
                message: response.body.clone(),
            }
        })?;

        Ok(Response::from_decoded(
            Value::from(parsed),
            response.total_count(TOTAL_ITEMS_HEADER),
        ))
    }
}

/// Maps a non-2xx response to a typed error.
///
/// `{"error": ..., "code": ...}` bodies keep their fault string and code; other
/// bodies become a generic API error with the raw status and text. HTTP 401 is
/// always an authentication error.
fn error_from_response(response: &HttpResponse) -> ApiError {
    let status = i64::from(response.status);
    if response.body.is_empty() {
        return ApiError::Api {
            code: FaultCode::Number(status),
            message: EMPTY_RESPONSE.into(),
        };
    }

    let parsed = serde_json::from_str::<serde_json::Value>(&response.body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .and_then(serde_json::Value::as_str);

    let Some(message) = message else {
        warn!(status, "REST error body is not a JSON error document");
        return ApiError::Api {
            code: FaultCode::Number(status),
            message: response.body.clone(),
        };
    };

    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(serde_json::Value::as_str)
        .map_or(FaultCode::Number(status), FaultCode::from);

    match ApiError::from_fault(code, message) {
        err @ ApiError::Authentication { .. } => err,
        err if response.status == 401 => ApiError::Authentication {
            code: err.fault_code().unwrap_or(FaultCode::Number(status)),
            message: err.fault_string(),
        },
        err => err,
    }
}

impl Transport for RestTransport {
    fn call(&self, request: &mut Request) -> Result<Response, ApiError> {
        request.start_time = Some(Timestamp::now());
        let outcome = self.execute(request);
        match &outcome {
            Ok(response) => request.record_result(response),
            Err(err) => request.record_error(err),
        }
        outcome
    }

    /// A `curl` command replaying the call, with credentials left as shell
    /// variables.
    fn print_reproducible(&self, request: &Request) -> String {
        let verb = http_method(&request.method, !request.args.is_empty());
        let headers: Vec<String> = request
            .transport_headers
            .iter()
            .map(|(name, value)| format!("\"{name}: {value}\""))
            .collect();
        let data = request
            .payload
            .as_ref()
            .map(|p| format!("-d '{p}'"))
            .unwrap_or_default();
        let uri = request.url.clone().unwrap_or_else(|| self.url(request));
        format!(
            "curl -u $SL_USER:$SL_APIKEY -X {verb} -H {} {data} '{uri}'",
            headers.join(" -H ")
        )
    }

    fn credential_placement(&self) -> CredentialPlacement {
        CredentialPlacement::HttpBasic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_session::StubSession;

    fn transport(stub: &Arc<StubSession>) -> RestTransport {
        RestTransport::new("https://api.example.com/rest/v3.1/").with_session(stub.clone())
    }

    fn ok(stub: &Arc<StubSession>, body: &str) {
        stub.push_response(HttpResponse::new(200, body));
    }

    #[test]
    fn method_selection() {
        assert_eq!(http_method("createObject", false), HttpMethod::Post);
        assert_eq!(http_method("createObjects", false), HttpMethod::Post);
        assert_eq!(http_method("editObject", false), HttpMethod::Put);
        assert_eq!(http_method("editObjects", false), HttpMethod::Put);
        assert_eq!(http_method("getObject", false), HttpMethod::Get);
        assert_eq!(http_method("deleteObject", false), HttpMethod::Get);
        assert_eq!(http_method("getObject", true), HttpMethod::Post);
        assert_eq!(http_method("deleteObject", true), HttpMethod::Post);
        assert_eq!(http_method("editObject", true), HttpMethod::Put);
        assert_eq!(http_method("editObjects", true), HttpMethod::Put);
        assert_eq!(http_method("createObject", true), HttpMethod::Post);
    }

    #[test]
    fn builds_url_and_query() {
        let stub = Arc::new(StubSession::new());
        ok(&stub, r#"{"id": 1234}"#);

        let mut request = Request::new("SoftLayer_Service", "getObject");
        request.identifier = Some(1234);
        request.set_mask("id");
        request.set_offset(5);
        request.set_limit(10);
        request.filter = Some(Value::from(serde_json::json!({"TYPE": {"attribute": 1}})));
        transport(&stub).call(&mut request).unwrap();

        let sent = stub.last_request().unwrap();
        assert_eq!(sent.method, HttpMethod::Get);
        assert_eq!(sent.url, "https://api.example.com/rest/v3.1/SoftLayer_Service/1234/getObject.json");
        assert!(sent.query.contains(&("objectMask".into(), "mask[id]".into())));
        assert!(sent.query.contains(&("resultLimit".into(), "5,10".into())));
        assert!(sent.query.contains(&("objectFilter".into(), r#"{"TYPE":{"attribute":1}}"#.into())));
        assert!(sent.body.is_none());
        assert_eq!(request.url, Some(sent.full_url().unwrap().to_string()));
        assert!(request
            .url
            .as_deref()
            .unwrap()
            .starts_with("https://api.example.com/rest/v3.1/SoftLayer_Service/1234/getObject.json?objectMask=mask%5Bid%5D&"));
    }

    #[test]
    fn args_force_post_with_base64_bytes() {
        let stub = Arc::new(StubSession::new());
        ok(&stub, "true");

        let mut request = Request::new("SoftLayer_Service", "getObject");
        request.args = vec![Value::from("test"), Value::Bytes(b"asdf".to_vec())];
        transport(&stub).call(&mut request).unwrap();

        let sent = stub.last_request().unwrap();
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.body.as_deref(), Some(r#"{"parameters":["test","YXNkZg=="]}"#));
    }

    #[test]
    fn edit_with_args_is_sent_as_put() {
        let stub = Arc::new(StubSession::new());
        ok(&stub, "true");

        let mut request = Request::new("SoftLayer_Virtual_Guest", "editObject");
        request.identifier = Some(1234);
        request.args = vec![Value::from(serde_json::json!({"hostname": "x"}))];
        transport(&stub).call(&mut request).unwrap();

        let sent = stub.last_request().unwrap();
        assert_eq!(sent.method, HttpMethod::Put);
        assert_eq!(sent.body.as_deref(), Some(r#"{"parameters":[{"hostname":"x"}]}"#));
    }

    #[test]
    fn basic_auth_only_with_transport_user() {
        let stub = Arc::new(StubSession::new());
        ok(&stub, "{}");
        ok(&stub, "{}");
        let transport = transport(&stub);

        let mut anonymous = Request::new("SoftLayer_Account", "getObject");
        transport.call(&mut anonymous).unwrap();
        assert!(stub.last_request().unwrap().basic_auth.is_none());

        let mut authed = Request::new("SoftLayer_Account", "getObject");
        authed.transport_user = Some("apikey".into());
        authed.transport_password = Some("key".into());
        transport.call(&mut authed).unwrap();
        assert_eq!(
            stub.last_request().unwrap().basic_auth,
            Some(("apikey".into(), "key".into()))
        );
    }

    #[test]
    fn list_results_read_total_header() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(200, "[1, 2]").with_header("SoftLayer-Total-Items", "7"));
        let mut request = Request::new("SoftLayer_Account", "getVirtualGuests");
        let list = transport(&stub).call(&mut request).unwrap();
        assert_eq!(list.as_list().unwrap().total_count(), 7);
    }

    #[test]
    fn empty_success_body_is_an_error() {
        let stub = Arc::new(StubSession::new());
        ok(&stub, "");
        let mut request = Request::new("SoftLayer_Account", "getObject");
        let err = transport(&stub).call(&mut request).unwrap_err();
        assert_eq!(err.fault_string(), "Empty response.");
        assert_eq!(err.fault_code(), Some(FaultCode::Number(200)));
    }

    #[test]
    fn non_json_body_is_an_api_error() {
        let stub = Arc::new(StubSession::new());
        ok(&stub, "<html>");
        let mut request = Request::new("SoftLayer_Account", "getObject");
        let err = transport(&stub).call(&mut request).unwrap_err();
        assert_eq!(err.kind(), api::ErrorKind::Api);
        assert_eq!(err.fault_string(), "<html>");
    }

    #[test]
    fn error_documents_keep_their_message() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(
            404,
            r#"{"error": "Unable to find object", "code": "SoftLayer_Exception_ObjectNotFound"}"#,
        ));
        let mut request = Request::new("SoftLayer_Account", "getObject");
        let err = transport(&stub).call(&mut request).unwrap_err();
        assert_eq!(err.fault_string(), "Unable to find object");
        assert_eq!(
            err.fault_code(),
            Some(FaultCode::from("SoftLayer_Exception_ObjectNotFound"))
        );
    }

    #[test]
    fn unauthorized_is_an_authentication_error() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(401, r#"{"error": "Access Denied."}"#));
        let mut request = Request::new("SoftLayer_Account", "getObject");
        let err = transport(&stub).call(&mut request).unwrap_err();
        assert_eq!(err.kind(), api::ErrorKind::Authentication);
        assert_eq!(err.fault_string(), "Access Denied.");
    }

    #[test]
    fn unparseable_error_body_keeps_raw_text() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(500, "Internal Server Error"));
        let mut request = Request::new("SoftLayer_Account", "getObject");
        let err = transport(&stub).call(&mut request).unwrap_err();
        assert_eq!(err.fault_code(), Some(FaultCode::Number(500)));
        assert_eq!(err.fault_string(), "Internal Server Error");
    }

    #[test]
    fn proxy_without_scheme_fails_before_sending() {
        let stub = Arc::new(StubSession::new());
        let transport = transport(&stub).with_proxy(Some("localhost:3128".into()));
        let mut request = Request::new("SoftLayer_Account", "getObject");
        let err = transport.call(&mut request).unwrap_err();
        assert!(matches!(err, ApiError::Transport { status: 0, .. }));
        assert!(stub.requests().is_empty());
    }

    #[test]
    fn reproducible_curl_command() {
        let stub = Arc::new(StubSession::new());
        ok(&stub, "{}");
        let transport = transport(&stub);
        let mut request = Request::new("SoftLayer_Service", "createObject");
        request.args = vec![Value::from("x")];
        request.transport_headers.insert("accept-encoding".into(), "identity".into());
        transport.call(&mut request).unwrap();

        let curl = transport.print_reproducible(&request);
        assert_eq!(
            curl,
            "curl -u $SL_USER:$SL_APIKEY -X POST -H \"accept-encoding: identity\" \
-d '{\"parameters\":[\"x\"]}' 'https://api.example.com/rest/v3.1/SoftLayer_Service/createObject.json'"
        );
    }
}
