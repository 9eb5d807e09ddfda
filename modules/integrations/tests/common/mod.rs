#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use integration_http::{HttpError, HttpService, ResponseBody};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tower::Service;
use tower::util::BoxCloneSyncService;

/// How the stub answers one request.
#[derive(Clone, Debug)]
pub enum Reply {
    Status(u16),
    Json(u16, Value),
    /// `429` with `Retry-After: <secs>`
    RetryAfter(u64),
    ConnectionRefused,
    /// Never answers
    Hang,
}

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub at: Instant,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

/// Scripted transport; once the script runs out it answers `200 {"ok": true}`.
#[derive(Clone, Default)]
pub struct StubTransport {
    script: Arc<Mutex<VecDeque<Reply>>>,
    calls: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<Recorded>>>,
}

impl StubTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(replies.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Every request gets the same reply.
    pub fn always(reply: Reply, times: usize) -> Self {
        Self::new(std::iter::repeat_n(reply, times))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn service(&self) -> HttpService {
        BoxCloneSyncService::new(self.clone())
    }
}

fn body(bytes: Bytes) -> ResponseBody {
    Full::new(bytes)
        .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
        .boxed()
}

fn respond(status: u16, headers: &[(&str, String)], payload: Bytes) -> Response<ResponseBody> {
    let mut builder = Response::builder().status(StatusCode::from_u16(status).unwrap());
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder.body(body(payload)).unwrap()
}

impl Service<Request<Full<Bytes>>> for StubTransport {
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Json(200, serde_json::json!({"ok": true})));
        let recorded = self.recorded.clone();

        Box::pin(async move {
            let (parts, payload) = req.into_parts();
            let payload = payload.collect().await.unwrap().to_bytes();
            recorded.lock().unwrap().push(Recorded {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body: payload,
                at: Instant::now(),
            });

            match reply {
                Reply::Status(status) => Ok(respond(status, &[], Bytes::new())),
                Reply::Json(status, value) => Ok(respond(
                    status,
                    &[("content-type", "application/json".to_owned())],
                    Bytes::from(serde_json::to_vec(&value).unwrap()),
                )),
                Reply::RetryAfter(secs) => Ok(respond(429, &[("retry-after", secs.to_string())], Bytes::new())),
                Reply::ConnectionRefused => Err(HttpError::Transport(Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )))),
                Reply::Hang => std::future::pending().await,
            }
        })
    }
}

pub fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("params must be an object, got {other}"),
    }
}
