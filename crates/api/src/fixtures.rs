//! Canned responses for tests.
//!
//! [`FixtureRegistry`] maps `(service, method)` to a stored [`Value`];
//! [`FixtureTransport`] serves calls from it without any network access.

use std::collections::HashMap;

use crate::{ApiError, Request, Response, Timestamp, Transport, Value};

/// Canned responses keyed by service, then method.
#[derive(Debug, Clone, Default)]
pub struct FixtureRegistry {
    services: HashMap<String, HashMap<String, Value>>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the response for `service::method`, replacing any previous one.
    pub fn insert(&mut self, service: impl Into<String>, method: impl Into<String>, response: impl Into<Value>) {
        self.services
            .entry(service.into())
            .or_default()
            .insert(method.into(), response.into());
    }

    /// Builder form of [`FixtureRegistry::insert`].
    pub fn with(mut self, service: impl Into<String>, method: impl Into<String>, response: impl Into<Value>) -> Self {
        self.insert(service, method, response);
        self
    }

    /// Loads every method of `service` from a JSON object of the form
    /// `{"getObject": {...}, "getVirtualGuests": [...]}`.
    pub fn load_json(&mut self, service: &str, document: &str) -> Result<(), ApiError> {
        let parsed: serde_json::Value = serde_json::from_str(document).map_err(|e| {
            ApiError::configuration(format!("fixture for {service} is not valid JSON: {e}"))
        })?;
        let serde_json::Value::Object(methods) = parsed else {
            return Err(ApiError::configuration(format!(
                "fixture for {service} must be a JSON object of methods"
            )));
        };
        for (method, response) in methods {
            self.insert(service, method, Value::from(response));
        }
        Ok(())
    }

    /// Returns the stored response for `service::method`.
    pub fn get(&self, service: &str, method: &str) -> Option<&Value> {
        self.services.get(service)?.get(method)
    }
}

/// Serves calls from a [`FixtureRegistry`].
#[derive(Debug, Clone, Default)]
pub struct FixtureTransport {
    registry: FixtureRegistry,
}

impl FixtureTransport {
    pub fn new(registry: FixtureRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FixtureRegistry {
        &self.registry
    }
}

impl Transport for FixtureTransport {
    fn call(&self, request: &mut Request) -> Result<Response, ApiError> {
        request.start_time = Some(Timestamp::now());
        match self.registry.get(&request.service, &request.method) {
            Some(Value::Array(items)) => {
                let total = items.len() as u64;
                let response = Response::from_decoded(Value::Array(items.clone()), total);
                request.record_result(&response);
                Ok(response)
            }
            Some(other) => {
                let response = Response::Value(other.clone());
                request.record_result(&response);
                Ok(response)
            }
            None => {
                let err = ApiError::NotImplemented {
                    service: request.service.clone(),
                    method: request.method.clone(),
                };
                request.record_error(&err);
                Err(err)
            }
        }
    }

    fn print_reproducible(&self, request: &Request) -> String {
        request.service.clone()
    }
}
