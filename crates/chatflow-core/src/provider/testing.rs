//! Recording stub transport for provider tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::transport::{HttpReply, HttpRequest, Transport};

/// Replays scripted replies in order and records every request it receives.
#[derive(Default)]
pub(crate) struct StubTransport {
    replies: Mutex<VecDeque<Result<HttpReply, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl StubTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_json(&self, body: Value) {
        self.push_reply(200, &body.to_string());
    }

    pub(crate) fn push_reply(&self, status: u16, body: &str) {
        self.replies.lock().unwrap().push_back(Ok(HttpReply {
            status,
            body: body.into(),
        }));
    }

    pub(crate) fn push_failure(&self, message: &str) {
        self.replies.lock().unwrap().push_back(Err(message.into()));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Body of the most recent request.
    pub(crate) fn last_body(&self) -> Value {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|r| r.body.clone())
            .expect("no request recorded")
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn post_json(&self, request: HttpRequest) -> Result<HttpReply> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("stub transport has no scripted reply")),
        }
    }
}
