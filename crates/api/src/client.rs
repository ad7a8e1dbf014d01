//! The generic call entry point.
//!
//! [`Client`] owns one [`Transport`] and, optionally, one credential. Every call
//! goes through [`Client::call`]: the service name is qualified, a fresh
//! [`Request`] is built from the [`CallOptions`], the credential decorates it and
//! the transport executes it inside an `api_call` tracing span.
//!
//! [`Client::service`] is a thin named wrapper for repeated calls against one
//! service.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info_span};

use crate::pagination::Pages;
use crate::{
    ApiError, Authentication, EmployeeAuthentication, Map, ObjectMask, Request, Response,
    ServiceName, TlsVerify, TokenAuthentication, Transport, Value,
};

/// `accept-encoding` value when compression is requested.
pub const COMPRESSED_ENCODINGS: &str = "gzip, deflate, compress";

// ---------------------------------------------------------------------------
// Call options
// ---------------------------------------------------------------------------

/// Optional per-call settings.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    id: Option<i64>,
    mask: Option<ObjectMask>,
    filter: Option<Value>,
    headers: Map,
    raw_headers: BTreeMap<String, String>,
    limit: Option<u32>,
    offset: Option<u32>,
    compress: Option<bool>,
    verify: Option<TlsVerify>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets a specific object instance.
    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn mask(mut self, mask: impl Into<ObjectMask>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<Value>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Adds an entry to the RPC header bag.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a raw HTTP header. Raw headers win over derived ones.
    pub fn raw_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw_headers.insert(name.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Asks for a compressed (`true`) or identity (`false`) response.
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = Some(compress);
        self
    }

    /// Overrides the transport's TLS verification for this call.
    pub fn verify(mut self, verify: impl Into<TlsVerify>) -> Self {
        self.verify = Some(verify.into());
        self
    }

    fn apply(&self, request: &mut Request) {
        request.identifier = self.id;
        if let Some(mask) = &self.mask {
            request.set_mask(mask.clone());
        }
        request.filter = self.filter.clone();
        request.headers.extend(self.headers.clone());
        if let Some(offset) = self.offset {
            request.set_offset(offset);
        }
        if let Some(limit) = self.limit {
            request.set_limit(limit);
        }
        if let Some(compress) = self.compress {
            let encoding = if compress { COMPRESSED_ENCODINGS } else { "identity" };
            request
                .transport_headers
                .insert("accept-encoding".into(), encoding.into());
        }
        request.transport_headers.extend(self.raw_headers.clone());
        request.verify = self.verify.clone();
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Calls remote methods over one transport with one optional credential.
pub struct Client {
    transport: Box<dyn Transport>,
    auth: Option<Arc<dyn Authentication>>,
}

impl Client {
    /// Creates an unauthenticated client.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            auth: None,
        }
    }

    pub fn with_auth(mut self, auth: impl Authentication + 'static) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// Replaces the credential used for subsequent calls.
    pub fn set_auth(&mut self, auth: Option<Arc<dyn Authentication>>) {
        self.auth = auth;
    }

    pub fn auth(&self) -> Option<&dyn Authentication> {
        self.auth.as_deref()
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Builds the call descriptor for `service::method` without executing it.
    pub fn build_request(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        options: &CallOptions,
    ) -> Result<Request, ApiError> {
        let service = ServiceName::qualify(service).ok_or_else(|| {
            ApiError::invalid_request(format!("invalid service name '{service}'"))
        })?;
        if method.trim().is_empty() {
            return Err(ApiError::invalid_request("method name must not be empty"));
        }

        let mut request = Request::new(service.as_str(), method);
        request.args = args;
        options.apply(&mut request);
        Ok(request)
    }

    /// Decorates `request` with the client's credential and executes it.
    ///
    /// The request keeps the diagnostics the transport wrote.
    pub fn execute(&self, request: &mut Request) -> Result<Response, ApiError> {
        let span = info_span!(
            "api_call",
            call_id = %request.call_id,
            service = %request.service,
            method = %request.method,
        );
        let _guard = span.enter();

        if let Some(auth) = &self.auth {
            auth.decorate(request);
        }

        let outcome = self.transport.call(request);
        match &outcome {
            Ok(Response::List(list)) => {
                debug!(items = list.len(), total = list.total_count(), "List result")
            }
            Ok(Response::Value(value)) => debug!(kind = value.type_name(), "Value result"),
            Err(err) => debug!(error = %err, kind = ?err.kind(), "Call failed"),
        }
        outcome
    }

    /// Calls `service::method` with positional `args`.
    ///
    /// `service` may be given without the provider prefix.
    pub fn call(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        options: &CallOptions,
    ) -> Result<Response, ApiError> {
        let mut request = self.build_request(service, method, args, options)?;
        self.execute(&mut request)
    }

    /// Lazily iterates a paged list method, `chunk` items per request.
    ///
    /// The options' limit and offset bound the whole iteration rather than a
    /// single page.
    pub fn iter_call<'a>(
        &'a self,
        service: &str,
        method: &str,
        args: Vec<Value>,
        options: &CallOptions,
        chunk: u32,
    ) -> Result<Pages<impl FnMut(u32, u32) -> Result<Response, ApiError> + 'a>, ApiError> {
        let total_limit = options.limit;
        let start = options.offset.unwrap_or(0);
        let service = service.to_string();
        let method = method.to_string();
        let base = CallOptions {
            limit: None,
            offset: None,
            ..options.clone()
        };

        Pages::new(chunk, total_limit, start, move |limit, offset| {
            let page = base.clone().limit(limit).offset(offset);
            self.call(&service, &method, args.clone(), &page)
        })
    }

    /// Returns a wrapper bound to one service.
    pub fn service(&self, name: impl Into<String>) -> Service<'_> {
        Service {
            client: self,
            name: name.into(),
        }
    }

    /// Logs in with a username and password and switches this client to the
    /// resulting session token. Returns `(user_id, token)`.
    pub fn authenticate_with_password(
        &mut self,
        username: &str,
        password: &str,
        security_question_id: Option<i64>,
        security_question_answer: Option<&str>,
    ) -> Result<(i64, String), ApiError> {
        let args = vec![
            Value::from(username),
            Value::from(password),
            Value::from(security_question_id),
            Value::from(security_question_answer),
        ];
        let response = self
            .call("User_Customer", "getPortalLoginToken", args, &CallOptions::new())?
            .into_value();

        let user_id = response.get("userId").and_then(Value::as_i64);
        let hash = response.get("hash").and_then(Value::as_str);
        let (Some(user_id), Some(hash)) = (user_id, hash) else {
            return Err(ApiError::from_fault(
                -32700,
                "getPortalLoginToken response is missing userId or hash",
            ));
        };

        let hash = hash.to_string();
        self.auth = Some(Arc::new(TokenAuthentication::new(user_id, hash.clone())?));
        Ok((user_id, hash))
    }

    /// Switches this client to an employee session.
    pub fn authenticate_with_hash(&mut self, user_id: i64, hash: &str) -> Result<(), ApiError> {
        let placement = self.transport.credential_placement();
        self.auth = Some(Arc::new(EmployeeAuthentication::new(user_id, hash, placement)?));
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// A [`Client`] bound to one service name.
#[derive(Debug)]
pub struct Service<'a> {
    client: &'a Client,
    name: String,
}

impl<'a> Service<'a> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, method: &str, args: Vec<Value>, options: &CallOptions) -> Result<Response, ApiError> {
        self.client.call(&self.name, method, args, options)
    }

    pub fn iter_call(
        &self,
        method: &str,
        args: Vec<Value>,
        options: &CallOptions,
        chunk: u32,
    ) -> Result<Pages<impl FnMut(u32, u32) -> Result<Response, ApiError> + 'a>, ApiError> {
        self.client.iter_call(&self.name, method, args, options, chunk)
    }
}
