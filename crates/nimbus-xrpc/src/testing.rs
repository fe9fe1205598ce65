//! In-process HTTP executor for tests.
//!
//! `MockExecutor` hands back queued responses and records every request it
//! sees, so request construction and error mapping can be exercised without
//! a network.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use nimbus_common::{Error, Result};

use crate::executor::{HttpExecutor, HttpRequest, HttpResponse};

/// An executor that replays queued responses in FIFO order.
#[derive(Debug, Default)]
pub struct MockExecutor {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    captured: Mutex<Vec<HttpRequest>>,
}

impl MockExecutor {
    /// Creates an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response with a JSON body and no extra headers.
    pub fn enqueue_json(&self, status: u16, body: &str) {
        self.enqueue(HttpResponse::new(status, body.as_bytes().to_vec()));
    }

    /// Queues a full response.
    pub fn enqueue(&self, response: HttpResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queues a response with additional headers (names lowercased).
    pub fn enqueue_with_headers(&self, status: u16, body: &str, headers: &[(&str, &str)]) {
        let mut response = HttpResponse::new(status, body.as_bytes().to_vec());
        for (name, value) in headers {
            response
                .headers
                .insert((*name).to_ascii_lowercase(), (*value).to_string());
        }
        self.enqueue(response);
    }

    /// Queues a transport-level failure.
    pub fn enqueue_error(&self, error: Error) {
        self.responses.lock().push_back(Err(error));
    }

    /// Returns copies of all captured requests, oldest first.
    #[must_use]
    pub fn captured(&self) -> Vec<HttpRequest> {
        self.captured.lock().clone()
    }

    /// Returns how many responses are still queued.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl HttpExecutor for MockExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.captured.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Network("mock executor queue empty".to_string())))
    }
}
