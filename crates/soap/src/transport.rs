//! [`SoapTransport`]: one SOAP envelope per call descriptor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use api::{
    ApiError, CredentialPlacement, Request, Response, Timestamp, TlsVerify, Transport,
    DEFAULT_SCHEMA_TTL_SECONDS,
};
use http_session::{HttpMethod, HttpSession, ReqwestSession, TransportSettings};
use tracing::{debug, warn};

use crate::envelope::{self, SoapResponse};
use crate::schema::{Schema, SchemaCache};

/// HTTP header carrying the server-side total of a list result.
pub const TOTAL_ITEMS_HEADER: &str = "softlayer-total-items";

/// SOAP transport.
///
/// Each service's WSDL is fetched from `<endpoint>/<service>?wsdl` on first use
/// and cached for the schema TTL. Credentials travel in the `authenticate`
/// header element built from the call's transport user and password.
pub struct SoapTransport {
    endpoint: String,
    settings: TransportSettings,
    session: Arc<dyn HttpSession>,
    schemas: SchemaCache,
    last_sent: Mutex<Option<String>>,
}

impl SoapTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            settings: TransportSettings::default(),
            session: Arc::new(ReqwestSession::new()),
            schemas: SchemaCache::new(Duration::from_secs(DEFAULT_SCHEMA_TTL_SECONDS)),
            last_sent: Mutex::new(None),
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

    pub fn with_schema_ttl(mut self, ttl: Duration) -> Self {
        self.schemas = SchemaCache::new(ttl);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    /// The most recently sent envelope.
    pub fn last_sent(&self) -> Option<String> {
        self.last_sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn wsdl_url(&self, service: &str) -> String {
        format!("{}/{service}?wsdl", self.endpoint)
    }

    fn fetch_schema(&self, request: &Request) -> Result<Schema, ApiError> {
        let url = self.wsdl_url(&request.service);
        let mut http = self.settings.prepare(HttpMethod::Get, url.as_str(), request)?;
        http.basic_auth = None;
        let response = self.session.send(&http)?;
        if !response.is_success() {
            return Err(ApiError::transport(
                i64::from(response.status),
                format!("{} Error for url: {url}", response.status),
            ));
        }
        Schema::from_wsdl(&request.service, &response.body)
    }

    fn execute(&self, request: &mut Request) -> Result<Response, ApiError> {
        let schema = self
            .schemas
            .get_or_fetch(&request.service, || self.fetch_schema(request))?;

        let Some(operation) = schema.operation(&request.method) else {
            return Err(ApiError::transport(
                404,
                format!(
                    "{}::{}() does not exist in {}",
                    request.service,
                    request.method,
                    self.wsdl_url(&request.service)
                ),
            ));
        };

        let payload = envelope::build_envelope(&schema.namespace, operation, request)?;
        let url = format!("{}/{}", self.endpoint, request.service);
        request.url = Some(url.clone());
        request.payload = Some(payload.clone());

        let mut http = self.settings.prepare(HttpMethod::Post, url, request)?;
        // Credentials are in the envelope.
        http.basic_auth = None;
        http.headers
            .entry("Content-Type".into())
            .or_insert_with(|| "text/xml; charset=utf-8".into());
        let action = operation.soap_action.clone().unwrap_or_default();
        http.headers.insert("SOAPAction".into(), format!("\"{action}\""));
        http.body = Some(payload.clone());
        request.transport_headers = http.headers.clone();
        *self.last_sent.lock().unwrap_or_else(|p| p.into_inner()) = Some(payload);

        debug!(url = %http.url, method = %request.method, "SOAP call");
        let response = self.session.send(&http)?;

        // Faults arrive with HTTP 500.
        match (
            envelope::decode_response(&request.method, &response.body),
            response.is_success(),
        ) {
            (Ok(SoapResponse::Fault { code, message }), _) => Err(ApiError::from_fault(code, message)),
            (Ok(SoapResponse::Success { value, total_items }), true) => {
                let total = response
                    .header(TOTAL_ITEMS_HEADER)
                    .and_then(|v| v.trim().parse().ok())
                    .or(total_items)
                    .unwrap_or(0);
                Ok(Response::from_decoded(value, total))
            }
            (Err(err), true) => Err(err),
            (_, false) => {
                warn!(status = response.status, "SOAP call failed at the HTTP level");
                Err(ApiError::transport(
                    i64::from(response.status),
                    format!("{} Error for url: {}", response.status, http.url),
                ))
            }
        }
    }
}

impl Transport for SoapTransport {
    fn call(&self, request: &mut Request) -> Result<Response, ApiError> {
        request.start_time = Some(Timestamp::now());
        let outcome = self.execute(request);
        match &outcome {
            Ok(response) => request.record_result(response),
            Err(err) => request.record_error(err),
        }
        outcome
    }

    /// The last envelope this transport sent, or the call's own payload when
    /// nothing has been sent yet.
    fn print_reproducible(&self, request: &Request) -> String {
        debug!("{}::{}()", request.service, request.method);
        self.last_sent()
            .or_else(|| request.payload.clone())
            .unwrap_or_default()
    }

    fn credential_placement(&self) -> CredentialPlacement {
        CredentialPlacement::HttpBasic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ENCODING_NS, ENVELOPE_NS, XSD_NS, XSI_NS};
    use crate::schema::tests::ACCOUNT_WSDL;
    use api::{ErrorKind, Value};
    use http_session::{HttpResponse, StubSession};

    fn transport(stub: &Arc<StubSession>) -> SoapTransport {
        SoapTransport::new("https://api.example.com/soap/v3.1/").with_session(stub.clone())
    }

    fn envelope(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?><SOAP-ENV:Envelope xmlns:SOAP-ENV=\"{ENVELOPE_NS}\" \
xmlns:xsi=\"{XSI_NS}\" xmlns:xsd=\"{XSD_NS}\" xmlns:SOAP-ENC=\"{ENCODING_NS}\" \
xmlns:ns1=\"http://api.service.softlayer.com/soap/v3.1/\"><SOAP-ENV:Body>{body}</SOAP-ENV:Body></SOAP-ENV:Envelope>"
        )
    }

    fn account_request(method: &str) -> Request {
        let mut request = Request::new("SoftLayer_Account", method);
        request.transport_user = Some("testUser".into());
        request.transport_password = Some("testPassword".into());
        request
    }

    const ACCOUNT_OBJECT: &str = "<ns1:getObjectResponse><getObjectReturn xsi:type=\"ns1:SoftLayer_Account\">\
<id xsi:type=\"xsd:int\">307608</id>\
<companyName xsi:type=\"xsd:string\">SoftLayer Internal - Development Community</companyName>\
</getObjectReturn></ns1:getObjectResponse>";

    #[test]
    fn fetches_schema_then_posts_envelope() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(200, ACCOUNT_WSDL));
        stub.push_response(HttpResponse::new(200, envelope(ACCOUNT_OBJECT)));

        let mut request = account_request("getObject");
        request.set_mask("mask[id,companyName]");
        let value = transport(&stub).call(&mut request).unwrap().into_value();
        assert_eq!(value.get("id"), Some(&Value::Int(307_608)));

        let sent = stub.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].method, HttpMethod::Get);
        assert_eq!(sent[0].url, "https://api.example.com/soap/v3.1/SoftLayer_Account?wsdl");
        assert_eq!(sent[1].method, HttpMethod::Post);
        assert_eq!(sent[1].url, "https://api.example.com/soap/v3.1/SoftLayer_Account");
        assert_eq!(
            sent[1].headers["SOAPAction"],
            "\"http://api.service.softlayer.com/soap/v3.1/SoftLayer_AccountAction\""
        );
        assert!(sent[1].basic_auth.is_none());
        let body = sent[1].body.as_deref().unwrap();
        assert!(body.contains("<username xsi:type=\"xsd:string\">testUser</username>"));
        assert!(body.contains("<mask xsi:type=\"xsd:string\">mask[id,companyName]</mask>"));
    }

    #[test]
    fn schema_is_fetched_once_per_service() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(200, ACCOUNT_WSDL));
        stub.push_response(HttpResponse::new(200, envelope(ACCOUNT_OBJECT)));
        stub.push_response(HttpResponse::new(200, envelope(ACCOUNT_OBJECT)));

        let transport = transport(&stub);
        transport.call(&mut account_request("getObject")).unwrap();
        transport.call(&mut account_request("getObject")).unwrap();

        let wsdl_fetches = stub
            .requests()
            .iter()
            .filter(|r| r.url.ends_with("?wsdl"))
            .count();
        assert_eq!(wsdl_fetches, 1);
        assert_eq!(transport.schemas().len(), 1);
    }

    #[test]
    fn unknown_operation_is_a_404_transport_error() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(200, ACCOUNT_WSDL));
        let mut request = account_request("getObjectzz");
        let err = transport(&stub).call(&mut request).unwrap_err();
        assert!(matches!(err, ApiError::Transport { status: 404, .. }));
        assert_eq!(
            err.fault_string(),
            "SoftLayer_Account::getObjectzz() does not exist in https://api.example.com/soap/v3.1/SoftLayer_Account?wsdl"
        );
        assert_eq!(stub.requests().len(), 1);
    }

    #[test]
    fn faults_are_typed() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(200, ACCOUNT_WSDL));
        stub.push_response(HttpResponse::new(
            500,
            envelope(
                "<SOAP-ENV:Fault><faultcode>SOAP-ENV:SoftLayer_Exception_NotLoggedIn</faultcode>\
<faultstring>Invalid API token.</faultstring></SOAP-ENV:Fault>",
            ),
        ));
        let err = transport(&stub).call(&mut account_request("getObject")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.fault_string(), "Invalid API token.");
    }

    #[test]
    fn http_errors_without_faults_are_transport_errors() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(200, ACCOUNT_WSDL));
        stub.push_response(HttpResponse::new(502, "<html>bad gateway</html>"));
        let err = transport(&stub).call(&mut account_request("getObject")).unwrap_err();
        assert!(matches!(err, ApiError::Transport { status: 502, .. }));
    }

    #[test]
    fn missing_wsdl_is_a_transport_error() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(404, "not found"));
        let transport = transport(&stub);
        let err = transport.call(&mut account_request("getObject")).unwrap_err();
        assert!(matches!(err, ApiError::Transport { status: 404, .. }));
        assert!(transport.schemas().is_empty());
    }

    #[test]
    fn list_totals_prefer_the_http_header() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(200, ACCOUNT_WSDL));
        stub.push_response(
            HttpResponse::new(
                200,
                envelope(
                    "<ns1:getVirtualGuestsResponse><getVirtualGuestsReturn xsi:type=\"SOAP-ENC:Array\">\
<item><id xsi:type=\"xsd:int\">5</id></item></getVirtualGuestsReturn></ns1:getVirtualGuestsResponse>",
                ),
            )
            .with_header("SoftLayer-Total-Items", "40"),
        );
        let mut request = account_request("getVirtualGuests");
        request.set_limit(1);
        let response = transport(&stub).call(&mut request).unwrap();
        assert_eq!(response.as_list().unwrap().total_count(), 40);
    }

    #[test]
    fn proxy_without_scheme_fails_before_sending() {
        let stub = Arc::new(StubSession::new());
        let transport = transport(&stub).with_proxy(Some("localhost:3128".into()));
        let mut request = account_request("getObject");
        let err = transport.call(&mut request).unwrap_err();
        assert!(matches!(err, ApiError::Transport { status: 0, .. }));
        assert!(stub.requests().is_empty());
        assert!(transport.schemas().is_empty());
    }

    #[test]
    fn call_proxy_is_checked_even_with_a_cached_schema() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(200, ACCOUNT_WSDL));
        stub.push_response(HttpResponse::new(200, envelope(ACCOUNT_OBJECT)));
        let transport = transport(&stub);
        transport.call(&mut account_request("getObject")).unwrap();

        let mut request = account_request("getObject");
        request.proxy = Some("proxy.example.com:3128".into());
        let err = transport.call(&mut request).unwrap_err();
        assert!(matches!(err, ApiError::Transport { status: 0, .. }));
        assert_eq!(stub.requests().len(), 2);
    }

    #[test]
    fn reproducible_output_is_the_last_envelope() {
        let stub = Arc::new(StubSession::new());
        stub.push_response(HttpResponse::new(200, ACCOUNT_WSDL));
        stub.push_response(HttpResponse::new(200, envelope(ACCOUNT_OBJECT)));
        let transport = transport(&stub);
        let mut request = account_request("getObject");
        transport.call(&mut request).unwrap();

        let printed = transport.print_reproducible(&request);
        assert!(printed.starts_with("<?xml"));
        assert_eq!(Some(printed), request.payload);
    }
}
