//! XML-RPC transport for the slapi call layer.
//!
//! Implements [`api::Transport`] over XML-RPC: the call descriptor's header bag
//! travels as the first positional parameter, positional arguments follow, and
//! the response is either a value, a list with its `SoftLayer-Total-Items`
//! total, or a fault mapped through the fault-code table.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** XML encoding and decoding live here. The [`tree`]
//! module is also used by the `soap` crate so there is one XML reader in the
//! workspace.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`tree`] | Owned element tree over `xml-rs` events, text escaping |
//! | [`codec`] | `methodCall` encoding, `methodResponse` decoding |
//! | [`transport`] | `XmlRpcTransport` |

pub mod codec;
pub mod transport;
pub mod tree;

pub use codec::{decode_response, encode_call, MethodResponse};
pub use transport::{XmlRpcTransport, TOTAL_ITEMS_HEADER};
pub use tree::Element;
