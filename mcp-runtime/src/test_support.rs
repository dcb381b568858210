use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::transport::{RemoteRequest, RemoteResponse, RemoteTransport, TransportError};

/// Scripted transport: answers from a queue and records every request.
/// An exhausted queue answers as an unreachable host.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<VecDeque<Result<RemoteResponse, TransportError>>>,
    requests: Mutex<Vec<RemoteRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, status: u16, body: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(RemoteResponse { status, body }));
        self
    }

    pub fn fail(self, err: TransportError) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|request| request.path).collect()
    }
}

#[async_trait]
impl RemoteTransport for FakeTransport {
    async fn submit(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        let path = request.path.clone();
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Unreachable {
                path,
                message: "no scripted response".to_string(),
            }))
    }
}

/// Never answers; for cancellation tests.
pub struct PendingTransport;

#[async_trait]
impl RemoteTransport for PendingTransport {
    async fn submit(&self, _request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        std::future::pending().await
    }
}
