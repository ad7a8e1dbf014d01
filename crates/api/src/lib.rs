//! Protocol-neutral call layer for the slapi client.
//!
//! This crate contains every concept a caller touches: call values, the call
//! descriptor, authentication strategies, the error taxonomy, the transport
//! port, transport decorators, pagination and retry. Wire protocols live in
//! their own crates (`xmlrpc`, `rest`, `soap`) and implement [`Transport`].
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* a call is; transport crates define *how* it travels.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`value`] | `Value`, the protocol-neutral argument/result type |
//! | [`identifiers`] | `CallId`, `ServiceName` and service-name qualification |
//! | [`types`] | `Response`, `ListResult`, `TlsVerify`, `Timestamp` |
//! | [`errors`] | `ApiError`, `ErrorKind`, `FaultCode`, `RetryPolicy` |
//! | [`request`] | `Request` (call descriptor) and `ObjectMask` |
//! | [`auth`] | Credential strategies |
//! | [`transport`] | The `Transport` trait |
//! | [`decorators`] | `TimingTransport`, `DebugTransport` |
//! | [`fixtures`] | `FixtureRegistry`, `FixtureTransport` |
//! | [`pagination`] | `Pages`, the lazy page iterator |
//! | [`retry`] | `Retry`, exponential backoff around any operation |
//! | [`client`] | `Client`, `CallOptions`, `Service` |
//! | [`config`] | `ClientConfig`, endpoint and user-agent constants |
//!
//! ## Control Flow
//!
//! ```text
//! Client::call ──► Request ──► Authentication::decorate ──► Transport::call
//!                                                             │
//!                                   Response | ApiError ◄─────┘
//! ```
//!
//! [`Pages`] and [`Retry`] sit above the transport and never swallow errors.

pub mod auth;
pub mod client;
pub mod config;
pub mod decorators;
pub mod errors;
pub mod fixtures;
pub mod identifiers;
pub mod pagination;
pub mod request;
pub mod retry;
pub mod transport;
pub mod types;
pub mod value;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use auth::{
    Authentication, BasicAuthentication, BasicHttpAuthentication, BearerAuthentication,
    CredentialPlacement, EmployeeAuthentication, TokenAuthentication, X509Authentication,
};
pub use client::{CallOptions, Client, Service};
pub use config::{
    ClientConfig, Protocol, API_PUBLIC_ENDPOINT, API_PUBLIC_ENDPOINT_REST,
    API_PUBLIC_ENDPOINT_SOAP, DEFAULT_SCHEMA_TTL_SECONDS, DEFAULT_TIMEOUT_SECONDS, USER_AGENT,
};
pub use decorators::{DebugTransport, TimedCall, TimingTransport};
pub use errors::{ApiError, ErrorKind, FaultCode, RetryPolicy};
pub use fixtures::{FixtureRegistry, FixtureTransport};
pub use identifiers::{CallId, ServiceName};
pub use pagination::{Pages, DEFAULT_CHUNK_SIZE};
pub use request::{ObjectMask, Request, GENERIC_MASK_HEADER};
pub use retry::{Retry, Sleeper, ThreadSleeper};
pub use transport::Transport;
pub use types::{ListResult, Response, Timestamp, TlsVerify};
pub use value::{Map, Value};
