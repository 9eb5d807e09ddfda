//! Scripted transport used by the unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use tokio::time::Instant;
use tower::Service;

use crate::error::HttpError;
use crate::response::ResponseBody;

pub(crate) fn body(data: &'static str) -> ResponseBody {
    Full::new(Bytes::from_static(data.as_bytes()))
        .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
        .boxed()
}

/// What the stub does for one call.
#[derive(Clone, Debug)]
pub(crate) enum Step {
    Respond {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: &'static str,
    },
    TransportError,
    /// Never answers; pairs with the attempt timeout.
    Hang,
}

impl Step {
    pub(crate) fn status(status: u16) -> Self {
        Self::Respond {
            status,
            headers: Vec::new(),
            body: "",
        }
    }

    pub(crate) fn json(status: u16, body: &'static str) -> Self {
        Self::Respond {
            status,
            headers: vec![("content-type", "application/json".to_owned())],
            body,
        }
    }

    pub(crate) fn retry_after(seconds: u64) -> Self {
        Self::Respond {
            status: 429,
            headers: vec![("retry-after", seconds.to_string())],
            body: "",
        }
    }
}

/// A request as the stub saw it.
#[derive(Clone, Debug)]
pub(crate) struct Seen {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub at: Instant,
}

/// Replays a script of steps; once the script runs out every call gets `200`.
#[derive(Clone, Default)]
pub(crate) struct ScriptedService {
    script: Arc<Mutex<VecDeque<Step>>>,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl ScriptedService {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            seen: Arc::default(),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub(crate) fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl Service<Request<Full<Bytes>>> for ScriptedService {
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::status(200));
        let seen = self.seen.clone();
        Box::pin(async move {
            let (parts, payload) = req.into_parts();
            let payload = payload.collect().await.unwrap().to_bytes();
            seen.lock().unwrap().push(Seen {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body: payload,
                at: Instant::now(),
            });
            match step {
                Step::Respond {
                    status,
                    headers,
                    body: text,
                } => {
                    let mut builder = Response::builder().status(StatusCode::from_u16(status).unwrap());
                    for (name, value) in headers {
                        builder = builder.header(name, value);
                    }
                    Ok(builder.body(body(text)).unwrap())
                }
                Step::TransportError => Err(HttpError::Transport("connection reset by peer".into())),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(86_400 * 365)).await;
                    Err(HttpError::Transport("unreachable".into()))
                }
            }
        })
    }
}
