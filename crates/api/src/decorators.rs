//! Transport decorators: timing and debug recording.
//!
//! Both wrap any [`Transport`] and implement it themselves, so they compose in
//! any order and depth. Recording buffers are guarded by a mutex; the wrapped
//! transport is called outside the lock.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use tracing::{debug, warn};

use crate::{ApiError, CredentialPlacement, Request, Response, Timestamp, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// One timed call: the request, when it started and how long it took.
#[derive(Debug, Clone)]
pub struct TimedCall {
    pub request: Request,
    pub start: Timestamp,
    pub elapsed_seconds: f64,
}

/// Records `(request, start, elapsed)` for every call, successful or not.
///
/// `start` is wall-clock time; `elapsed_seconds` comes from a monotonic clock.
pub struct TimingTransport<T> {
    inner: T,
    calls: Mutex<Vec<TimedCall>>,
}

impl<T: Transport> TimingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the recorded calls, oldest first.
    pub fn get_last_calls(&self) -> Vec<TimedCall> {
        lock(&self.calls).clone()
    }

    /// Forgets every recorded call.
    pub fn clear(&self) {
        lock(&self.calls).clear();
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for TimingTransport<T> {
    fn call(&self, request: &mut Request) -> Result<Response, ApiError> {
        let start = Timestamp::now();
        let clock = Instant::now();
        let outcome = self.inner.call(request);
        let elapsed_seconds = clock.elapsed().as_secs_f64();
        lock(&self.calls).push(TimedCall {
            request: request.clone(),
            start,
            elapsed_seconds,
        });
        outcome
    }

    fn print_reproducible(&self, request: &Request) -> String {
        self.inner.print_reproducible(request)
    }

    fn credential_placement(&self) -> CredentialPlacement {
        self.inner.credential_placement()
    }
}

// ---------------------------------------------------------------------------
// Debug
// ---------------------------------------------------------------------------

/// Logs every call before and after it runs and keeps a copy of each request
/// with its result or error attached. Errors are re-raised unchanged.
pub struct DebugTransport<T> {
    inner: T,
    requests: Mutex<Vec<Request>>,
}

impl<T: Transport> DebugTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the recorded requests, oldest first.
    pub fn get_last_calls(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    pub fn clear(&self) {
        lock(&self.requests).clear();
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for DebugTransport<T> {
    fn call(&self, request: &mut Request) -> Result<Response, ApiError> {
        debug!(call_id = %request.call_id, call = %request, "Calling");
        let outcome = self.inner.call(request);

        match &outcome {
            Ok(response) => {
                request.result = Some(response.clone());
                debug!(
                    call_id = %request.call_id,
                    elapsed = ?request.elapsed_seconds(),
                    "Call succeeded"
                );
            }
            Err(err) => {
                request.error = Some(err.clone());
                warn!(call_id = %request.call_id, error = %err, "Call failed");
            }
        }

        lock(&self.requests).push(request.clone());
        outcome
    }

    fn print_reproducible(&self, request: &Request) -> String {
        self.inner.print_reproducible(request)
    }

    fn credential_placement(&self) -> CredentialPlacement {
        self.inner.credential_placement()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FixtureRegistry, FixtureTransport, Value};

    fn fixtures() -> FixtureTransport {
        FixtureTransport::new(FixtureRegistry::new().with("SoftLayer_Account", "getObject", Value::from("ok")))
    }

    #[test]
    fn timing_records_every_call_and_clears() {
        let transport = TimingTransport::new(fixtures());
        let mut ok = Request::new("SoftLayer_Account", "getObject");
        let mut missing = Request::new("SoftLayer_Account", "getMissing");
        transport.call(&mut ok).unwrap();
        transport.call(&mut missing).unwrap_err();

        let calls = transport.get_last_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].request.method, "getObject");
        assert!(calls[1].elapsed_seconds >= 0.0);

        transport.clear();
        assert!(transport.get_last_calls().is_empty());
    }

    struct Slow(std::time::Duration);

    impl Transport for Slow {
        fn call(&self, _request: &mut Request) -> Result<Response, ApiError> {
            std::thread::sleep(self.0);
            Ok(Response::Value(Value::Nil))
        }

        fn print_reproducible(&self, _request: &Request) -> String {
            String::new()
        }
    }

    #[test]
    fn timing_measures_the_wrapped_call() {
        let transport = TimingTransport::new(Slow(std::time::Duration::from_millis(20)));
        transport.call(&mut Request::new("SoftLayer_Account", "getObject")).unwrap();

        let calls = transport.get_last_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].elapsed_seconds >= 0.02);
        assert!(calls[0].start <= Timestamp::now());
    }

    #[test]
    fn debug_records_outcomes_and_reraises() {
        let transport = DebugTransport::new(fixtures());
        let mut missing = Request::new("SoftLayer_Account", "getMissing");
        let err = transport.call(&mut missing).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotImplemented);

        let recorded = transport.get_last_calls();
        assert_eq!(recorded[0].error, Some(err));
    }

    #[test]
    fn decorators_nest_and_delegate_reproducible_output() {
        let transport = DebugTransport::new(TimingTransport::new(fixtures()));
        let mut req = Request::new("SoftLayer_Account", "getObject");
        assert_eq!(transport.call(&mut req).unwrap().into_value(), Value::from("ok"));
        assert_eq!(transport.inner().get_last_calls().len(), 1);
        assert_eq!(transport.print_reproducible(&req), "SoftLayer_Account");
    }
}
