//! Lazy iteration over chunked list results.
//!
//! [`Pages`] requests one page at a time, in strictly increasing offset order,
//! and yields items as they arrive. It is finite and not restartable. Dropping
//! it abandons the remaining pages.
//!
//! Termination:
//! - with a caller limit, once the cumulative count reaches it (the last page
//!   request shrinks so nothing past the limit is fetched);
//! - without one, at the first page shorter than the chunk size (so a total that
//!   is an exact multiple costs one extra, empty request);
//! - at a non-list result, which is yielded once, except that a nil result
//!   counts as an empty page and yields nothing;
//! - at the first error, which is yielded and ends the sequence.

use std::collections::VecDeque;

use crate::{ApiError, Response, Value};

/// Page size used when the caller does not choose one.
pub const DEFAULT_CHUNK_SIZE: u32 = 100;

/// Iterator over the items of a paged remote list.
///
/// `fetch(limit, offset)` performs one page request.
pub struct Pages<F> {
    fetch: F,
    chunk: u32,
    limit: Option<u32>,
    offset: u32,
    yielded: u32,
    buffer: VecDeque<Value>,
    done: bool,
}

impl<F> Pages<F>
where
    F: FnMut(u32, u32) -> Result<Response, ApiError>,
{
    /// Creates the iterator. Fails immediately, without any request, when
    /// `chunk` is zero or `limit` is `Some(0)`.
    pub fn new(chunk: u32, limit: Option<u32>, offset: u32, fetch: F) -> Result<Self, ApiError> {
        if chunk == 0 {
            return Err(ApiError::invalid_request("Chunk size should be greater than zero."));
        }
        if limit == Some(0) {
            return Err(ApiError::invalid_request("Limit should be greater than zero."));
        }
        let chunk = limit.map_or(chunk, |limit| chunk.min(limit));
        Ok(Self {
            fetch,
            chunk,
            limit,
            offset,
            yielded: 0,
            buffer: VecDeque::new(),
            done: false,
        })
    }

    fn fetch_page(&mut self) -> Option<Result<Value, ApiError>> {
        if let Some(limit) = self.limit {
            if self.yielded >= limit {
                self.done = true;
                return None;
            }
            self.chunk = self.chunk.min(limit - self.yielded);
        }

        let page = match (self.fetch)(self.chunk, self.offset) {
            Ok(page) => page,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        match page {
            Response::List(list) => {
                let received = list.len() as u32;
                if received < self.chunk {
                    self.done = true;
                }
                self.offset += received;
                self.buffer.extend(list);
            }
            // Nil means no data, not a value to hand back.
            Response::Value(Value::Nil) => self.done = true,
            Response::Value(other) => {
                self.done = true;
                self.buffer.push_back(other);
            }
        }

        if self.buffer.is_empty() {
            self.done = true;
        }
        None
    }
}

impl<F> Iterator for Pages<F>
where
    F: FnMut(u32, u32) -> Result<Response, ApiError>,
{
    type Item = Result<Value, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.limit.is_some_and(|limit| self.yielded >= limit) {
                return None;
            }
            if let Some(item) = self.buffer.pop_front() {
                self.yielded += 1;
                return Some(Ok(item));
            }
            if self.done {
                return None;
            }
            if let Some(err) = self.fetch_page() {
                return Some(err);
            }
        }
    }
}
