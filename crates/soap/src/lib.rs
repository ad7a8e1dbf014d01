//! SOAP transport for the slapi call layer.
//!
//! Implements [`api::Transport`] over SOAP 1.1. Header elements (credentials,
//! object mask, object filter, result limit, init parameters) are built from
//! the call descriptor; the operation and its argument names come from the
//! service's WSDL, which is fetched on first use and cached in memory.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`schema`] | `Schema` read from WSDL, `SchemaCache` with TTL |
//! | [`envelope`] | Envelope builder, response and fault decoding |
//! | [`transport`] | `SoapTransport` |

pub mod envelope;
pub mod schema;
pub mod transport;

pub use envelope::{build_envelope, decode_response, SoapResponse};
pub use schema::{Operation, Schema, SchemaCache, DEFAULT_NAMESPACE};
pub use transport::SoapTransport;
