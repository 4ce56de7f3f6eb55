//! Scripted [`HttpTransport`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Response(HttpResponse),
    NetworkError(String),
    /// Answer with the inner reply after a simulated round-trip delay.
    Delayed(Duration, Box<Reply>),
}

pub(crate) fn delayed(after: Duration, reply: Reply) -> Reply {
    Reply::Delayed(after, Box::new(reply))
}

pub(crate) fn json(status: u16, value: serde_json::Value) -> Reply {
    Reply::Response(HttpResponse {
        status,
        content_type: Some("application/json".into()),
        body: value.to_string().into_bytes(),
    })
}

pub(crate) fn status(code: u16) -> Reply {
    Reply::Response(HttpResponse {
        status: code,
        content_type: None,
        body: Vec::new(),
    })
}

pub(crate) fn bytes(content_type: &str, body: &[u8]) -> Reply {
    Reply::Response(HttpResponse {
        status: 200,
        content_type: Some(content_type.into()),
        body: body.to_vec(),
    })
}

pub(crate) fn job(id: &str, status: &str) -> Reply {
    json(200, serde_json::json!({ "jobId": id, "status": status }))
}

pub(crate) fn job_with_variations(id: &str, variations: &[&str]) -> Reply {
    json(
        200,
        serde_json::json!({ "jobId": id, "status": "completed", "variations": variations }),
    )
}

pub(crate) fn job_result(id: &str) -> Reply {
    json(
        200,
        serde_json::json!({
            "jobId": id,
            "previewImageUrl": format!("https://cdn/{id}/preview.png"),
            "highResImageUrl": format!("https://cdn/{id}/full.png"),
            "prompt": "red brick wall",
            "createdAt": "2024-05-01T12:00:00Z",
            "tags": ["brick"],
            "isPublic": false,
            "resolution": "2K"
        }),
    )
}

/// Replies are queued per `METHOD path`. The last reply of a queue is
/// sticky so a polled endpoint can keep answering the same status.
/// Unscripted routes answer 404.
#[derive(Default)]
pub(crate) struct StubTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn route_key(method: Method, path: &str) -> String {
    format!("{} {path}", method.as_str())
}

impl StubTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn on(&self, method: Method, path: &str, replies: impl IntoIterator<Item = Reply>) {
        self.routes
            .lock()
            .unwrap()
            .entry(route_key(method, path))
            .or_default()
            .extend(replies);
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        // Suspend like a real round-trip so concurrent callers interleave.
        tokio::task::yield_now().await;
        let key = route_key(request.method, &request.path);
        self.requests.lock().unwrap().push(request);

        let mut reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        while let Some(Reply::Delayed(after, inner)) = reply {
            tokio::time::sleep(after).await;
            reply = Some(*inner);
        }

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::NetworkError(message)) => Err(ClientError::Network(message)),
            Some(Reply::Delayed(..)) => unreachable!("delays are unwrapped above"),
            None => Ok(HttpResponse {
                status: 404,
                content_type: Some("application/json".into()),
                body: br#"{"message": "no such route"}"#.to_vec(),
            }),
        }
    }
}
