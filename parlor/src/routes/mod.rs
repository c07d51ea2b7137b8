//! HTTP routes for Parlor
//!
//! Handlers take a fully read [`ApiRequest`] rather than a hyper
//! `Request<Incoming>`, so the whole router can be driven from tests
//! without a socket.

pub mod auth_routes;
pub mod chat;
pub mod health;
pub mod history;
pub mod report;

pub use auth_routes::{handle_login, handle_me, handle_register};
pub use chat::{handle_chat, handle_chat_stream};
pub use health::{health_check, version_info};
pub use history::{handle_delete_conversation, handle_get_conversation, handle_list_conversations, handle_migrate};
pub use report::handle_generate_report;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CACHE_CONTROL, CONNECTION, CONTENT_TYPE,
};
use hyper::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::services::TurnEvent;
use crate::types::{ParlorError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const ALLOWED_METHODS: &str = "GET, POST, DELETE, OPTIONS";

/// A request whose body has already been collected
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiRequest {
    /// Build from a method and a path that may carry a query string
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (path_and_query.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    pub fn with_json(self, value: &serde_json::Value) -> Self {
        self.with_body(value.to_string())
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            self.headers.insert(AUTHORIZATION, value);
        }
        self
    }

    /// Raw `Authorization` header, if present and ASCII
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Deserialize the JSON body. Rejections are `Validation` errors.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(ParlorError::Validation("Request body is required".into()));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| ParlorError::Validation(format!("Invalid JSON: {}", e)))
    }
}

// =============================================================================
// Response Helpers
// =============================================================================

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn empty_body() -> BoxBody {
    full_body(Bytes::new())
}

fn with_cors(mut response: Response<BoxBody>) -> Response<BoxBody> {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    with_cors(response)
}

pub fn error_response(err: &ParlorError) -> Response<BoxBody> {
    json_response(err.status_code(), &err.to_body())
}

pub fn empty_response(status: StatusCode) -> Response<BoxBody> {
    let mut response = Response::new(empty_body());
    *response.status_mut() = status;
    with_cors(response)
}

/// CORS preflight response
pub fn preflight_response() -> Response<BoxBody> {
    let mut response = empty_response(StatusCode::OK);
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    response
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });
    json_response(StatusCode::NOT_FOUND, &body)
}

pub fn method_not_allowed_response() -> Response<BoxBody> {
    let body = serde_json::json!({ "error": "Method not allowed" });
    json_response(StatusCode::METHOD_NOT_ALLOWED, &body)
}

/// One server-sent event
pub fn encode_event(event: &TurnEvent) -> Bytes {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {}\n\n", json))
}

/// Stream turn events as `text/event-stream`. The body ends when the
/// sender side of `events` is dropped.
pub fn sse_response(events: ReceiverStream<TurnEvent>) -> Response<BoxBody> {
    let frames = events.map(|event| Ok::<_, hyper::Error>(Frame::data(encode_event(&event))));
    let body = BoxBody::new(StreamBody::new(frames));

    let mut response = with_cors(Response::new(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
