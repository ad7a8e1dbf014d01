//! SOAP 1.1 envelope encoding and response decoding.
//!
//! Values are written with `xsi:type` hints (rpc/encoded style). Decoding is
//! driven by the same hints: typed leaves become scalars, `item` children or an
//! array type become sequences, anything else with children becomes a mapping.

use std::fmt::Write as _;

use api::{ApiError, FaultCode, Map, ObjectMask, Request, Value, GENERIC_MASK_HEADER};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use xmlrpc::tree::{self, escape_attr, escape_text, Element};

use crate::schema::{local_name, Operation};

pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Header carrying the server-side total of a list result.
pub const TOTAL_ITEMS_ELEMENT: &str = "totalItems";

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Builds the request envelope for `request` against `operation`.
///
/// Header elements, in order: caller headers, `authenticate` from the
/// transport credentials, `resultLimit`, the object mask, the object filter
/// and the init parameters. Positional arguments are bound to the operation's
/// input part names.
pub fn build_envelope(
    namespace: &str,
    operation: &Operation,
    request: &Request,
) -> Result<String, ApiError> {
    let mut headers: Vec<(String, Value)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    if let Some(user) = &request.transport_user {
        if !request.headers.contains_key("authenticate") {
            let mut auth = Map::new();
            auth.insert("username".into(), Value::from(user.as_str()));
            auth.insert(
                "apiKey".into(),
                Value::from(request.transport_password.clone().unwrap_or_default()),
            );
            headers.push(("authenticate".into(), Value::Struct(auth)));
        }
    }

    if let Some(limit) = request.limit().filter(|l| *l > 0) {
        let mut result_limit = Map::new();
        result_limit.insert("limit".into(), Value::from(limit));
        result_limit.insert("offset".into(), Value::from(request.offset().unwrap_or(0)));
        headers.push(("resultLimit".into(), Value::Struct(result_limit)));
    }

    if let Some(mask) = request.mask() {
        mask.validate()?;
        let ObjectMask::Text(text) = mask else {
            return Err(ApiError::invalid_request(
                "Malformed Mask: the SOAP endpoint only accepts string masks",
            ));
        };
        let mut header = Map::new();
        header.insert("mask".into(), Value::from(text.as_str()));
        headers.push((GENERIC_MASK_HEADER.into(), Value::Struct(header)));
    }

    if let Some(filter) = &request.filter {
        if !matches!(filter, Value::Struct(_)) {
            return Err(ApiError::invalid_request(format!(
                "Object filter must be a mapping, got {}",
                filter.type_name()
            )));
        }
        headers.push((format!("{}ObjectFilter", request.service), filter.clone()));
    }

    if let Some(id) = request.identifier {
        let mut init = Map::new();
        init.insert("id".into(), Value::Int(id));
        headers.push((format!("{}InitParameters", request.service), Value::Struct(init)));
    }

    if request.args.len() > operation.parameters.len() {
        return Err(ApiError::invalid_request(format!(
            "{}::{}() takes {} parameter(s), {} given",
            request.service,
            operation.name,
            operation.parameters.len(),
            request.args.len()
        )));
    }

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<SOAP-ENV:Envelope xmlns:SOAP-ENV=\"{ENVELOPE_NS}\" xmlns:SOAP-ENC=\"{ENCODING_NS}\" \
xmlns:xsd=\"{XSD_NS}\" xmlns:xsi=\"{XSI_NS}\" xmlns:ns1=\"{}\">",
        escape_attr(namespace)
    );

    out.push_str("<SOAP-ENV:Header>\n");
    for (name, value) in &headers {
        write_element(&mut out, &format!("ns1:{name}"), value);
    }
    out.push_str("</SOAP-ENV:Header>\n");

    let _ = writeln!(out, "<SOAP-ENV:Body>\n<ns1:{}>", operation.name);
    for (name, arg) in operation.parameters.iter().zip(&request.args) {
        write_element(&mut out, name, arg);
    }
    let _ = writeln!(out, "</ns1:{}>\n</SOAP-ENV:Body>", operation.name);
    out.push_str("</SOAP-ENV:Envelope>\n");
    Ok(out)
}

fn write_element(out: &mut String, name: &str, value: &Value) {
    match value {
        Value::Nil => {
            let _ = writeln!(out, "<{name} xsi:nil=\"true\"/>");
        }
        Value::Bool(b) => {
            let _ = writeln!(out, "<{name} xsi:type=\"xsd:boolean\">{b}</{name}>");
        }
        Value::Int(i) => {
            let _ = writeln!(out, "<{name} xsi:type=\"xsd:int\">{i}</{name}>");
        }
        Value::Double(d) => {
            let _ = writeln!(out, "<{name} xsi:type=\"xsd:double\">{d:?}</{name}>");
        }
        Value::String(s) => {
            let _ = writeln!(out, "<{name} xsi:type=\"xsd:string\">{}</{name}>", escape_text(s));
        }
        Value::Bytes(bytes) => {
            let _ = writeln!(
                out,
                "<{name} xsi:type=\"xsd:base64Binary\">{}</{name}>",
                STANDARD.encode(bytes)
            );
        }
        Value::DateTime(dt) => {
            let _ = writeln!(out, "<{name} xsi:type=\"xsd:dateTime\">{}</{name}>", escape_text(dt));
        }
        Value::Array(items) => {
            let _ = writeln!(
                out,
                "<{name} xsi:type=\"SOAP-ENC:Array\" SOAP-ENC:arrayType=\"xsd:anyType[{}]\">",
                items.len()
            );
            for item in items {
                write_element(out, "item", item);
            }
            let _ = writeln!(out, "</{name}>");
        }
        Value::Struct(members) => {
            let _ = writeln!(out, "<{name}>");
            for (member, value) in members {
                write_element(out, member, value);
            }
            let _ = writeln!(out, "</{name}>");
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A decoded response envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum SoapResponse {
    Success { value: Value, total_items: Option<u64> },
    Fault { code: FaultCode, message: String },
}

/// Parses a response envelope for `method`.
///
/// The result is read from `<method>Return`; an empty response element
/// decodes to nil.
pub fn decode_response(method: &str, text: &str) -> Result<SoapResponse, ApiError> {
    let root = tree::parse(text)?;
    let body = root
        .child("Body")
        .filter(|_| root.name == "Envelope")
        .ok_or_else(|| ApiError::from_fault(-32700, "expected a SOAP Envelope with a Body"))?;

    if let Some(fault) = body.child("Fault") {
        let code = fault
            .child("faultcode")
            .map(|c| local_name(c.text.trim()).to_string())
            .unwrap_or_default();
        let message = fault
            .child("faultstring")
            .map(|s| s.text.trim().to_string())
            .unwrap_or_default();
        return Ok(SoapResponse::Fault {
            code: FaultCode::from(code),
            message,
        });
    }

    let total_items = root
        .child("Header")
        .and_then(|h| h.child(TOTAL_ITEMS_ELEMENT))
        .and_then(|t| t.child("amount"))
        .and_then(|a| a.text.trim().parse().ok());

    let return_name = format!("{method}Return");
    let value = match body.find(&return_name) {
        Some(ret) => decode_value(ret)?,
        None if body.children.first().is_some_and(|r| r.children.is_empty()) => Value::Nil,
        None => {
            return Err(ApiError::transport(
                500,
                format!("Error serializing response: no <{return_name}> in the response body"),
            ))
        }
    };
    Ok(SoapResponse::Success { value, total_items })
}

fn xsi_type(element: &Element) -> Option<&str> {
    element.attr("type").map(local_name)
}

/// Decodes one element into a [`Value`].
pub fn decode_value(element: &Element) -> Result<Value, ApiError> {
    if matches!(element.attr("nil"), Some("true" | "1")) {
        return Ok(Value::Nil);
    }

    let type_name = xsi_type(element);
    let is_array = type_name.is_some_and(|t| t == "Array" || t.ends_with("Array"))
        || element.attr("arrayType").is_some();

    if is_array || (!element.children.is_empty() && element.children.iter().all(|c| c.name == "item"))
    {
        return element
            .children
            .iter()
            .map(decode_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }

    if !element.children.is_empty() {
        let mut members = Map::new();
        for child in &element.children {
            members.insert(child.name.clone(), decode_value(child)?);
        }
        return Ok(Value::Struct(members));
    }

    let text = element.text.trim();
    let malformed = |kind: &str| ApiError::from_fault(-32700, format!("invalid {kind} '{text}'"));
    match type_name {
        Some("int" | "long" | "short" | "byte" | "integer" | "unsignedInt" | "unsignedLong"
            | "unsignedShort" | "unsignedByte" | "nonNegativeInteger" | "positiveInteger") => {
            match text.parse::<i64>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => text
                    .parse::<f64>()
                    .map(Value::Double)
                    .map_err(|_| malformed("integer")),
            }
        }
        Some("boolean") => match text {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(malformed("boolean")),
        },
        Some("double" | "float" | "decimal") => {
            text.parse().map(Value::Double).map_err(|_| malformed("double"))
        }
        Some("base64Binary") => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map(Value::Bytes)
                .map_err(|_| malformed("base64"))
        }
        Some("dateTime") => Ok(Value::DateTime(text.to_string())),
        _ => Ok(Value::String(element.text.clone())),
    }
}
