//! The transport port.
//!
//! A [`Transport`] turns a decorated [`Request`] into either a decoded
//! [`Response`] or an [`ApiError`]. It never returns half-decoded data.
//!
//! ## Architectural Layer
//!
//! This trait is the boundary between the protocol-neutral call layer and the
//! protocol adapters (`xmlrpc`, `rest`, `soap`). Decorators in
//! [`crate::decorators`] and [`crate::fixtures`] implement it too, so they
//! compose in any order and depth.

use std::sync::Arc;

use crate::{ApiError, CredentialPlacement, Request, Response};

/// Executes call descriptors over one wire protocol.
///
/// Implementations are constructed once and reused; they must be safe to share
/// across threads.
pub trait Transport: Send + Sync {
    /// Executes `request`, writing diagnostics (URL, payload, timing, outcome)
    /// back into it.
    fn call(&self, request: &mut Request) -> Result<Response, ApiError>;

    /// Renders `request` as something a human can replay by hand.
    fn print_reproducible(&self, request: &Request) -> String;

    /// Where this transport expects credentials.
    fn credential_placement(&self) -> CredentialPlacement {
        CredentialPlacement::Headers
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn call(&self, request: &mut Request) -> Result<Response, ApiError> {
        (**self).call(request)
    }

    fn print_reproducible(&self, request: &Request) -> String {
        (**self).print_reproducible(request)
    }

    fn credential_placement(&self) -> CredentialPlacement {
        (**self).credential_placement()
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn call(&self, request: &mut Request) -> Result<Response, ApiError> {
        (**self).call(request)
    }

    fn print_reproducible(&self, request: &Request) -> String {
        (**self).print_reproducible(request)
    }

    fn credential_placement(&self) -> CredentialPlacement {
        (**self).credential_placement()
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn call(&self, request: &mut Request) -> Result<Response, ApiError> {
        (**self).call(request)
    }

    fn print_reproducible(&self, request: &Request) -> String {
        (**self).print_reproducible(request)
    }

    fn credential_placement(&self) -> CredentialPlacement {
        (**self).credential_placement()
    }
}
