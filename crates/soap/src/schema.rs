//! Service schemas read from WSDL documents, and their in-memory cache.
//!
//! Only what the envelope builder needs is kept: the target namespace and, per
//! operation, its `SOAPAction` and the ordered names of its input parts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use api::ApiError;
use tracing::debug;
use xmlrpc::tree::{self, Element};

/// Namespace used when a WSDL document does not declare one.
pub const DEFAULT_NAMESPACE: &str = "http://api.service.softlayer.com/soap/v3.1/";

/// One invocable operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub soap_action: Option<String>,
    /// Input part names, in positional-argument order.
    pub parameters: Vec<String>,
}

/// The parts of a service's WSDL used to build envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub service: String,
    pub namespace: String,
    operations: HashMap<String, Operation>,
}

impl Schema {
    pub fn new(service: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            namespace: namespace.into(),
            operations: HashMap::new(),
        }
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.insert(operation.name.clone(), operation);
        self
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Reads a WSDL 1.1 document.
    ///
    /// Operations are taken from the port type; the binding contributes each
    /// operation's `SOAPAction`.
    pub fn from_wsdl(service: &str, wsdl: &str) -> Result<Self, ApiError> {
        let root = tree::parse(wsdl)?;
        if root.name != "definitions" {
            return Err(ApiError::from_fault(
                -32700,
                format!("expected WSDL <definitions>, found <{}>", root.name),
            ));
        }

        let namespace = root
            .attr("targetNamespace")
            .unwrap_or(DEFAULT_NAMESPACE)
            .to_string();
        let mut schema = Schema::new(service, namespace);

        let messages: HashMap<&str, Vec<String>> = root
            .children_named("message")
            .filter_map(|message| {
                let name = message.attr("name")?;
                let parts = message
                    .children_named("part")
                    .filter_map(|part| part.attr("name").map(str::to_string))
                    .collect();
                Some((name, parts))
            })
            .collect();

        let actions = binding_actions(&root);

        for port_type in root.children_named("portType") {
            for op in port_type.children_named("operation") {
                let Some(name) = op.attr("name") else {
                    continue;
                };
                let parameters = op
                    .child("input")
                    .and_then(|input| input.attr("message"))
                    .map(local_name)
                    .and_then(|message| messages.get(message))
                    .cloned()
                    .unwrap_or_default();
                schema.operations.insert(
                    name.to_string(),
                    Operation {
                        name: name.to_string(),
                        soap_action: actions.get(name).cloned(),
                        parameters,
                    },
                );
            }
        }

        Ok(schema)
    }
}

fn binding_actions(root: &Element) -> HashMap<String, String> {
    let mut actions = HashMap::new();
    for binding in root.children_named("binding") {
        for op in binding.children_named("operation") {
            let action = op
                .child("operation")
                .and_then(|soap_op| soap_op.attr("soapAction"));
            if let (Some(name), Some(action)) = (op.attr("name"), action) {
                actions.insert(name.to_string(), action.to_string());
            }
        }
    }
    actions
}

/// Strips a `prefix:` qualifier.
pub(crate) fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Per-service schema cache with a fixed time-to-live.
///
/// Expired entries are refetched on the next lookup. Concurrent first lookups
/// for the same service may both fetch; the later insert wins.
#[derive(Debug)]
pub struct SchemaCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Arc<Schema>)>>,
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached schema for `service`, calling `fetch` when there is
    /// none or it has expired.
    pub fn get_or_fetch<F>(&self, service: &str, fetch: F) -> Result<Arc<Schema>, ApiError>
    where
        F: FnOnce() -> Result<Schema, ApiError>,
    {
        {
            let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
            if let Some((fetched_at, schema)) = entries.get(service) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(schema));
                }
            }
        }

        debug!(service, "fetching service schema");
        let schema = Arc::new(fetch()?);
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(service.to_string(), (Instant::now(), Arc::clone(&schema)));
        Ok(schema)
    }

    pub fn invalidate(&self, service: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(service);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;

    pub(crate) const ACCOUNT_WSDL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions xmlns="http://schemas.xmlsoap.org/wsdl/"
             xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
             xmlns:tns="http://api.service.softlayer.com/soap/v3.1/"
             targetNamespace="http://api.service.softlayer.com/soap/v3.1/">
  <message name="getObjectRequest"/>
  <message name="getObjectResponse"><part name="getObjectReturn" type="tns:SoftLayer_Account"/></message>
  <message name="setAbuseEmailsRequest"><part name="emails" type="tns:stringArray"/></message>
  <message name="getVirtualGuestsRequest"/>
  <portType name="SoftLayer_AccountPortType">
    <operation name="getObject"><input message="tns:getObjectRequest"/><output message="tns:getObjectResponse"/></operation>
    <operation name="setAbuseEmails"><input message="tns:setAbuseEmailsRequest"/></operation>
    <operation name="getVirtualGuests"><input message="tns:getVirtualGuestsRequest"/></operation>
  </portType>
  <binding name="SoftLayer_AccountBinding" type="tns:SoftLayer_AccountPortType">
    <operation name="getObject"><soap:operation soapAction="http://api.service.softlayer.com/soap/v3.1/SoftLayer_AccountAction"/></operation>
    <operation name="setAbuseEmails"><soap:operation soapAction="http://api.service.softlayer.com/soap/v3.1/SoftLayer_AccountAction"/></operation>
  </binding>
</definitions>"#;

    #[test]
    fn reads_operations_parts_and_actions() {
        let schema = Schema::from_wsdl("SoftLayer_Account", ACCOUNT_WSDL).unwrap();
        assert_eq!(schema.namespace, DEFAULT_NAMESPACE);
        assert_eq!(schema.operation_count(), 3);

        let op = schema.operation("setAbuseEmails").unwrap();
        assert_eq!(op.parameters, vec!["emails".to_string()]);
        assert_eq!(
            op.soap_action.as_deref(),
            Some("http://api.service.softlayer.com/soap/v3.1/SoftLayer_AccountAction")
        );
        assert!(schema.operation("getVirtualGuests").unwrap().soap_action.is_none());
        assert!(schema.operation("getObjectzz").is_none());
    }

    #[test]
    fn rejects_documents_that_are_not_wsdl() {
        let err = Schema::from_wsdl("SoftLayer_Account", "<html/>").unwrap_err();
        assert_eq!(err.kind(), api::ErrorKind::MalformedRequest);
    }

    #[test]
    fn cache_reuses_fresh_entries() {
        let cache = SchemaCache::new(Duration::from_secs(60));
        let fetches = Cell::new(0);
        for _ in 0..3 {
            cache
                .get_or_fetch("SoftLayer_Account", || {
                    fetches.set(fetches.get() + 1);
                    Ok(Schema::new("SoftLayer_Account", DEFAULT_NAMESPACE))
                })
                .unwrap();
        }
        assert_eq!(fetches.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_refetches_expired_entries() {
        let cache = SchemaCache::new(Duration::ZERO);
        let fetches = Cell::new(0);
        for _ in 0..2 {
            cache
                .get_or_fetch("SoftLayer_Account", || {
                    fetches.set(fetches.get() + 1);
                    Ok(Schema::new("SoftLayer_Account", DEFAULT_NAMESPACE))
                })
                .unwrap();
        }
        assert_eq!(fetches.get(), 2);
    }

    #[test]
    fn failed_fetches_are_not_cached() {
        let cache = SchemaCache::new(Duration::from_secs(60));
        let err = cache
            .get_or_fetch("SoftLayer_Account", || Err(ApiError::transport(404, "missing")))
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport { status: 404, .. }));
        assert!(cache.is_empty());
    }
}
