//! Shared test doubles: a scripted transport that replays canned exchanges
//! and a sleeper that records backoff instead of waiting.

#![allow(dead_code)]

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use linode_rest::retry::{SleepFuture, Sleeper};
use linode_rest::transport::{
    HttpRequest, HttpResponse, Transport, TransportError, TransportFuture,
};
use linode_rest::{CancelToken, Client, RetryStrategy};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One canned reply.
pub enum Reply {
    /// A JSON body with the given status.
    Json(u16, Value),
    /// A raw body with the given status.
    Raw(u16, &'static str),
    /// A JSON body with the given status, delivered after the token fires.
    JsonThenCancel(u16, Value, CancelToken),
    /// The attempt times out.
    Timeout,
    /// The attempt never completes.
    Hang,
}

#[derive(Default)]
struct ScriptState {
    replies: VecDeque<Reply>,
    requests: Vec<HttpRequest>,
}

/// Replays `Reply`s in order and records every request it receives.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                replies: replies.into_iter().collect(),
                requests: Vec::new(),
            })),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().iter().map(|r| r.url.to_string()).collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request);
            state.replies.pop_front()
        };

        Box::pin(async move {
            match reply {
                Some(Reply::Json(status, body)) => Ok(response(status, body.to_string())),
                Some(Reply::Raw(status, body)) => Ok(response(status, body.to_string())),
                Some(Reply::JsonThenCancel(status, body, token)) => {
                    token.cancel();
                    Ok(response(status, body.to_string()))
                }
                Some(Reply::Timeout) => Err(TransportError::Timeout),
                Some(Reply::Hang) => std::future::pending().await,
                None => panic!("no scripted reply left"),
            }
        })
    }
}

fn response(status: u16, body: String) -> HttpResponse {
    HttpResponse {
        status: StatusCode::from_u16(status).unwrap(),
        headers: HeaderMap::new(),
        body: Bytes::from(body),
    }
}

/// Records requested delays and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        self.delays.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

/// A client over `transport` with three jitter-free exponential retries.
pub fn scripted_client(transport: &ScriptedTransport, sleeper: &RecordingSleeper) -> Client {
    Client::builder()
        .base_url("https://api.test/v4")
        .unwrap()
        .token("test-token")
        .retry_strategy(RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_retries: 3,
            jitter: false,
        })
        .transport(transport.clone())
        .sleeper(sleeper.clone())
        .build()
        .unwrap()
}

pub fn user_json(username: &str, email: &str, restricted: bool) -> Value {
    json!({
        "username": username,
        "email": email,
        "restricted": restricted,
        "ssh_keys": [],
        "tfa_enabled": false,
        "verified_phone_number": null,
        "password_created": "2024-05-01T12:00:00",
        "user_type": "default"
    })
}

pub fn page_json(data: Vec<Value>, page: u32, pages: u32, results: u64) -> Value {
    json!({ "data": data, "page": page, "pages": pages, "results": results })
}

pub fn not_found() -> Reply {
    Reply::Json(404, json!({"errors": [{"reason": "Not found"}]}))
}

/// Installs a test subscriber once so `RUST_LOG` works in tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
