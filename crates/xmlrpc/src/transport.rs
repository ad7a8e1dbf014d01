//! [`XmlRpcTransport`]: one XML-RPC `methodCall` per call descriptor.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use api::{ApiError, Map, Request, Response, Timestamp, TlsVerify, Transport, Value};
use http_session::{HttpMethod, HttpSession, ReqwestSession, TransportSettings};
use regex::Regex;
use tracing::{debug, warn};

use crate::codec::{self, MethodResponse};

/// Response header carrying the server-side total of a list result.
pub const TOTAL_ITEMS_HEADER: &str = "softlayer-total-items";

static API_KEY_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<string>[a-z0-9]{64}</string>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// XML-RPC transport.
///
/// Posts to `<endpoint>/<service>` with the header bag as the first positional
/// parameter.
pub struct XmlRpcTransport {
    endpoint: String,
    settings: TransportSettings,
    session: Arc<dyn HttpSession>,
}

impl XmlRpcTransport {
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

    fn execute(&self, request: &mut Request) -> Result<Response, ApiError> {
        let mut first = Map::new();
        first.insert("headers".into(), Value::Struct(request.rpc_headers()?));
        let mut params = Vec::with_capacity(request.args.len() + 1);
        params.push(Value::Struct(first));
        params.extend(request.args.iter().cloned());

        let url = format!("{}/{}", self.endpoint, request.service);
        let payload = codec::encode_call(&request.method, &params);
        request.url = Some(url.clone());
        request.payload = Some(payload.clone());

        let mut http = self.settings.prepare(HttpMethod::Post, url, request)?;
        http.headers
            .entry("Content-Type".into())
            .or_insert_with(|| "application/xml".into());
        http.body = Some(payload);
        request.transport_headers = http.headers.clone();

        debug!(url = %http.url, method = %request.method, "XML-RPC call");
        let response = self.session.send(&http)?;

        if !response.is_success() {
            // Some servers return faults with an error status.
            if let Ok(MethodResponse::Fault { code, message }) = codec::decode_response(&response.body) {
                return Err(ApiError::from_fault(code, message));
            }
            warn!(status = response.status, "XML-RPC call failed at the HTTP level");
            return Err(ApiError::transport(
                i64::from(response.status),
                format!("{} Error for url: {}", response.status, http.url),
            ));
        }

        let value = codec::decode_response(&response.body)?.into_result()?;
        Ok(Response::from_decoded(value, response.total_count(TOTAL_ITEMS_HEADER)))
    }
}

impl Transport for XmlRpcTransport {
    fn call(&self, request: &mut Request) -> Result<Response, ApiError> {
        request.start_time = Some(Timestamp::now());
        let outcome = self.execute(request);
        match &outcome {
            Ok(response) => request.record_result(response),
            Err(err) => request.record_error(err),
        }
        outcome
    }

    /// A `curl` command replaying the call. 64-character API keys in the
    /// payload are replaced with a placeholder.
    fn print_reproducible(&self, request: &Request) -> String {
        let payload = request.payload.as_deref().unwrap_or_default();
        let payload = API_KEY_STRING.replace_all(payload, "<string>API_KEY_GOES_HERE</string>");
        let payload = WHITESPACE.replace_all(&payload, " ");

        let mut headers = request.transport_headers.clone();
        headers
            .entry("Content-Type".into())
            .or_insert_with(|| "application/xml".into());
        headers
            .entry("User-Agent".into())
            .or_insert_with(|| self.settings.user_agent.clone());
        let headers: Vec<String> = headers
            .iter()
            .map(|(name, value)| format!("-H '{name}: {value}'"))
            .collect();

        let url = request
            .url
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.endpoint, request.service));
        format!(
            "curl -X POST {} --data '{}' '{}'",
            headers.join(" "),
            payload.trim().replace('\'', "'\\''"),
            url
        )
    }
}
