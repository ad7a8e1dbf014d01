//! [`HttpSession`] over `reqwest`'s blocking client.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use api::{ApiError, TlsVerify};
use reqwest::blocking::Client;
use tracing::debug;

use crate::{HttpMethod, HttpRequest, HttpResponse, HttpSession};

type ClientKey = (TlsVerify, Option<PathBuf>, Option<String>);

/// Pooled HTTP session.
///
/// TLS material and proxies are fixed per `reqwest` client, so one pooled
/// client is kept per distinct `(verify, client certificate, proxy)`
/// combination and reused across calls.
#[derive(Default)]
pub struct ReqwestSession {
    clients: Mutex<HashMap<ClientKey, Client>>,
}

impl ReqwestSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(&self, request: &HttpRequest) -> Result<Client, ApiError> {
        let key = (
            request.verify.clone(),
            request.client_cert.clone(),
            request.proxy.clone(),
        );
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let client = build_client(&key)?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

impl std::fmt::Debug for ReqwestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestSession").finish_non_exhaustive()
    }
}

fn read_pem(path: &PathBuf, what: &str) -> Result<Vec<u8>, ApiError> {
    std::fs::read(path).map_err(|e| {
        ApiError::configuration(format!("cannot read {what} '{}': {e}", path.display()))
    })
}

fn build_client((verify, cert, proxy): &ClientKey) -> Result<Client, ApiError> {
    let mut builder = Client::builder();

    match verify {
        TlsVerify::Enabled => {}
        TlsVerify::Disabled => builder = builder.danger_accept_invalid_certs(true),
        TlsVerify::CaBundle(path) => {
            let pem = read_pem(path, "CA bundle")?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| ApiError::configuration(format!("invalid CA bundle: {e}")))?;
            builder = builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(certificate);
        }
    }

    if let Some(path) = cert {
        let pem = read_pem(path, "client certificate")?;
        let identity = reqwest::Identity::from_pem(&pem)
            .map_err(|e| ApiError::configuration(format!("invalid client certificate: {e}")))?;
        builder = builder.identity(identity);
    }

    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy.as_str())
            .map_err(|e| ApiError::transport(0, format!("Invalid proxy: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ApiError::transport(0, format!("cannot build HTTP client: {e}")))
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

impl HttpSession for ReqwestSession {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let client = self.client_for(request)?;

        let url = request.full_url()?;
        let mut builder = client.request(method(request.method), url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!(method = %request.method, %url, "Sending HTTP request");
        let response = builder.send().map_err(|e| {
            let reason = if e.is_timeout() { "timed out" } else { "failed" };
            ApiError::transport(0, format!("HTTP request {reason}: {e}"))
        })?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().map_err(|e| {
            ApiError::transport(i64::from(status), format!("cannot read response body: {e}"))
        })?;
        debug!(status, url = %url, bytes = body.len(), "Received HTTP response");

        Ok(HttpResponse {
            status,
            url,
            headers,
            body,
        })
    }
}
