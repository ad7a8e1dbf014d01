//! In-memory [`HttpSession`] for transport tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use api::ApiError;

use crate::{HttpRequest, HttpResponse, HttpSession};

/// Records every request and answers from a queue of canned outcomes.
///
/// An empty queue answers with a status-0 transport error.
#[derive(Debug, Default)]
pub struct StubSession {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
}

impl StubSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: HttpResponse) -> &Self {
        self.lock_responses().push_back(Ok(response));
        self
    }

    /// Queues a failure.
    pub fn push_error(&self, error: ApiError) -> &Self {
        self.lock_responses().push_back(Err(error));
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests().pop()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<HttpResponse, ApiError>>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HttpSession for StubSession {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        self.lock_responses().pop_front().unwrap_or_else(|| {
            Err(ApiError::transport(0, "no stubbed response queued"))
        })
    }
}
