//! XML-RPC value encoding and method-response decoding.
//!
//! Requests are written directly as text; responses are parsed into an
//! [`Element`] tree first and then decoded.
//!
//! Integers are written as `<int>` when they fit in 32 bits and as `<i8>`
//! otherwise. They decode into `i64`, whichever of `int`, `i4` or `i8` the
//! server used.

use std::fmt::Write as _;

use api::{ApiError, FaultCode, Map, Value};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::tree::{self, escape_text, Element};

/// A decoded `<methodResponse>`.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault { code: FaultCode, message: String },
}

impl MethodResponse {
    /// Turns a fault into its typed error.
    pub fn into_result(self) -> Result<Value, ApiError> {
        match self {
            MethodResponse::Success(value) => Ok(value),
            MethodResponse::Fault { code, message } => Err(ApiError::from_fault(code, message)),
        }
    }
}

fn not_well_formed(message: impl Into<String>) -> ApiError {
    ApiError::from_fault(-32700, message)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialises a `<methodCall>` with positional `params`.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version='1.0' encoding='utf-8'?>\n<methodCall>\n");
    let _ = writeln!(out, "<methodName>{}</methodName>", escape_text(method));
    out.push_str("<params>\n");
    for param in params {
        out.push_str("<param>\n");
        encode_value(param, &mut out);
        out.push_str("</param>\n");
    }
    out.push_str("</params>\n</methodCall>\n");
    out
}

/// Serialises a `<methodResponse>` carrying `value`.
pub fn encode_response(value: &Value) -> String {
    let mut out = String::from("<?xml version='1.0'?>\n<methodResponse>\n<params>\n<param>\n");
    encode_value(value, &mut out);
    out.push_str("</param>\n</params>\n</methodResponse>\n");
    out
}

/// Serialises a `<methodResponse>` carrying a fault.
pub fn encode_fault(code: &FaultCode, message: &str) -> String {
    let mut fault = Map::new();
    let code = match code {
        FaultCode::Number(n) => Value::Int(*n),
        FaultCode::Name(name) => Value::from(name.as_str()),
    };
    fault.insert("faultCode".into(), code);
    fault.insert("faultString".into(), Value::from(message));

    let mut out = String::from("<?xml version='1.0'?>\n<methodResponse>\n<fault>\n");
    encode_value(&Value::Struct(fault), &mut out);
    out.push_str("</fault>\n</methodResponse>\n");
    out
}

/// Appends one `<value>` element.
pub fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Nil => out.push_str("<value><nil/></value>"),
        Value::Bool(b) => {
            let _ = writeln!(out, "<value><boolean>{}</boolean></value>", u8::from(*b));
        }
        Value::Int(i) if i32::try_from(*i).is_ok() => {
            let _ = writeln!(out, "<value><int>{i}</int></value>");
        }
        Value::Int(i) => {
            let _ = writeln!(out, "<value><i8>{i}</i8></value>");
        }
        Value::Double(d) => {
            let _ = writeln!(out, "<value><double>{d:?}</double></value>");
        }
        Value::String(s) => {
            let _ = writeln!(out, "<value><string>{}</string></value>", escape_text(s));
        }
        Value::Bytes(bytes) => {
            let _ = writeln!(out, "<value><base64>\n{}\n</base64></value>", STANDARD.encode(bytes));
        }
        Value::DateTime(dt) => {
            let _ = writeln!(
                out,
                "<value><dateTime.iso8601>{}</dateTime.iso8601></value>",
                escape_text(dt)
            );
        }
        Value::Array(items) => {
            out.push_str("<value><array><data>\n");
            for item in items {
                encode_value(item, out);
            }
            out.push_str("</data></array></value>\n");
        }
        Value::Struct(members) => {
            out.push_str("<value><struct>\n");
            for (name, member) in members {
                let _ = writeln!(out, "<member>\n<name>{}</name>", escape_text(name));
                encode_value(member, out);
                out.push_str("</member>\n");
            }
            out.push_str("</struct></value>\n");
        }
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Parses a `<methodResponse>` document.
pub fn decode_response(text: &str) -> Result<MethodResponse, ApiError> {
    let root = tree::parse(text)?;
    if root.name != "methodResponse" {
        return Err(not_well_formed(format!(
            "expected <methodResponse>, found <{}>",
            root.name
        )));
    }

    if let Some(fault) = root.child("fault") {
        let value = fault
            .child("value")
            .ok_or_else(|| not_well_formed("<fault> without <value>"))?;
        let fault = decode_value(value)?;
        let code = match fault.get("faultCode") {
            Some(Value::Int(n)) => FaultCode::Number(*n),
            Some(Value::String(s)) => FaultCode::Name(s.clone()),
            _ => return Err(not_well_formed("fault without faultCode")),
        };
        let message = fault
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(MethodResponse::Fault { code, message });
    }

    let value = root
        .child("params")
        .and_then(|p| p.child("param"))
        .and_then(|p| p.child("value"))
        .ok_or_else(|| not_well_formed("<methodResponse> without a result value"))?;
    Ok(MethodResponse::Success(decode_value(value)?))
}

/// Decodes one `<value>` element.
pub fn decode_value(value: &Element) -> Result<Value, ApiError> {
    let Some(typed) = value.children.first() else {
        // Untyped values are strings.
        return Ok(Value::String(value.text.clone()));
    };
    let text = typed.text.as_str();

    match typed.name.as_str() {
        "int" | "i4" | "i8" | "i2" | "i1" | "biginteger" => parse_int(text),
        "boolean" => match text.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            other => Err(not_well_formed(format!("invalid boolean '{other}'"))),
        },
        "double" | "float" | "bigdecimal" => text
            .trim()
            .parse()
            .map(Value::Double)
            .map_err(|_| not_well_formed(format!("invalid double '{text}'"))),
        "string" => Ok(Value::String(text.to_string())),
        "nil" => Ok(Value::Nil),
        "base64" => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact)
                .map(Value::Bytes)
                .map_err(|e| not_well_formed(format!("invalid base64: {e}")))
        }
        "dateTime.iso8601" => Ok(Value::DateTime(text.trim().to_string())),
        "array" => {
            let data = typed
                .child("data")
                .ok_or_else(|| not_well_formed("<array> without <data>"))?;
            data.children_named("value")
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "struct" => {
            let mut members = Map::new();
            for member in typed.children_named("member") {
                let name = member
                    .child("name")
                    .ok_or_else(|| not_well_formed("<member> without <name>"))?;
                let value = member
                    .child("value")
                    .ok_or_else(|| not_well_formed("<member> without <value>"))?;
                members.insert(name.text.clone(), decode_value(value)?);
            }
            Ok(Value::Struct(members))
        }
        other => Err(not_well_formed(format!("unknown value type <{other}>"))),
    }
}

/// Decodes an integer exactly; values beyond `i64` fall back to a double.
fn parse_int(text: &str) -> Result<Value, ApiError> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    if text.parse::<u64>().is_ok() {
        if let Ok(d) = text.parse::<f64>() {
            return Ok(Value::Double(d));
        }
    }
    Err(not_well_formed(format!("invalid integer '{text}'")))
}
