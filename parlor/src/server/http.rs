//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling, one task per
//! connection. Bodies are read up front so routing works on an
//! [`ApiRequest`].

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use parlor_agent::LlmBackend;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{IdentityResolver, JwtValidator};
use crate::config::Args;
use crate::db::{ConversationStore, MemoryStore, UserStore};
use crate::routes::{self, ApiRequest, BoxBody};
use crate::services::{
    Credentials, FailureReporter, Migrator, ReportOrchestrator, TracingReporter, TurnOrchestrator,
    Tutor,
};
use crate::types::{ParlorError, Result};

/// Largest request body accepted
const MAX_BODY_BYTES: usize = 256 * 1024;

const CONVERSATIONS_PREFIX: &str = "/api/conversations/";

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub tokens: JwtValidator,
    pub credentials: Credentials,
    pub identity: IdentityResolver,
    pub store: Arc<dyn ConversationStore>,
    pub turns: TurnOrchestrator,
    pub reports: ReportOrchestrator,
    pub migrator: Migrator,
    pub started_at: Instant,
}

impl AppState {
    /// Wire services over the given stores and LLM backend. Persistence
    /// failures are logged.
    pub fn new(
        args: Args,
        users: Arc<dyn UserStore>,
        conversations: Arc<dyn ConversationStore>,
        backend: Arc<dyn LlmBackend>,
    ) -> Result<Self> {
        Self::with_reporter(args, users, conversations, backend, Arc::new(TracingReporter))
    }

    pub fn with_reporter(
        args: Args,
        users: Arc<dyn UserStore>,
        conversations: Arc<dyn ConversationStore>,
        backend: Arc<dyn LlmBackend>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Result<Self> {
        let tokens = match args.jwt_secret.clone() {
            Some(secret) => JwtValidator::new(secret, args.jwt_expiry_seconds)?,
            None if args.dev_mode => {
                warn!("Using development JWT secret - do not use in production");
                JwtValidator::new_dev()
            }
            None => {
                return Err(ParlorError::Config(
                    "JWT_SECRET is required in production mode".into(),
                ))
            }
        };

        let credentials = Credentials::new(users);
        let identity = IdentityResolver::new(tokens.clone(), credentials.clone());
        let tutor = Tutor::new(backend, args.llm_temperature);

        Ok(Self {
            turns: TurnOrchestrator::new(tutor.clone(), conversations.clone(), reporter.clone()),
            reports: ReportOrchestrator::new(tutor, conversations.clone(), reporter.clone()),
            migrator: Migrator::new(conversations.clone(), reporter),
            store: conversations,
            args,
            tokens,
            credentials,
            identity,
            started_at: Instant::now(),
        })
    }

    /// Everything in one process-local [`MemoryStore`]
    pub fn in_memory(args: Args, backend: Arc<dyn LlmBackend>) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        Self::new(args, store.clone(), store, backend)
    }
}

/// Run the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Parlor listening on {} (store: {})",
        state.args.listen,
        state.store.backend()
    );

    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Read the body and hand the request to the router
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let (parts, body) = req.into_parts();
    info!("[{}] {} {}", addr, parts.method, parts.uri.path());

    let body = match read_body(body).await {
        Ok(body) => body,
        Err(e) => {
            warn!("[{}] {}", addr, e);
            return Ok(routes::error_response(&e));
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut request = ApiRequest::new(parts.method, path_and_query);
    request.headers = parts.headers;
    request.body = body;

    Ok(dispatch(state, request).await)
}

/// Collect a request body, refusing anything over `MAX_BODY_BYTES`
async fn read_body<B>(body: B) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(
            ParlorError::PayloadTooLarge(format!("Body exceeds {} bytes", MAX_BODY_BYTES)),
        ),
        Err(e) => Err(ParlorError::Validation(format!(
            "Failed to read body: {}",
            e
        ))),
    }
}

/// Route a request. Handler errors become JSON error responses here.
pub async fn dispatch(state: Arc<AppState>, req: ApiRequest) -> Response<BoxBody> {
    let path = req.path.clone();

    let result = match (&req.method, path.as_str()) {
        (&Method::OPTIONS, _) => Ok(routes::preflight_response()),

        (&Method::GET, "/health") | (&Method::GET, "/api/health") => {
            Ok(routes::health_check(&state))
        }
        (&Method::GET, "/version") => Ok(routes::version_info()),

        // Authentication
        (&Method::POST, "/api/auth/register") => routes::handle_register(&state, &req).await,
        (&Method::POST, "/api/auth/login") => routes::handle_login(&state, &req).await,
        (&Method::GET, "/api/auth/me") => routes::handle_me(&state, &req).await,

        // Turns and reports
        (&Method::POST, "/api/chat") => routes::handle_chat(&state, &req).await,
        (&Method::POST, "/api/chat/stream") => routes::handle_chat_stream(&state, &req).await,
        (&Method::POST, "/api/report/generate") => {
            routes::handle_generate_report(&state, &req).await
        }

        // History
        (&Method::POST, "/api/migrate") => routes::handle_migrate(&state, &req).await,
        (&Method::GET, "/api/conversations") => {
            routes::handle_list_conversations(&state, &req).await
        }
        (method, p) if p.starts_with(CONVERSATIONS_PREFIX) => {
            let id = &p[CONVERSATIONS_PREFIX.len()..];
            match *method {
                Method::GET => routes::handle_get_conversation(&state, &req, id).await,
                Method::DELETE => routes::handle_delete_conversation(&state, &req, id).await,
                _ => Ok(routes::method_not_allowed_response()),
            }
        }

        (_, "/api/auth/register")
        | (_, "/api/auth/login")
        | (_, "/api/auth/me")
        | (_, "/api/chat")
        | (_, "/api/chat/stream")
        | (_, "/api/report/generate")
        | (_, "/api/migrate")
        | (_, "/api/conversations") => Ok(routes::method_not_allowed_response()),

        _ => Ok(routes::not_found_response(&path)),
    };

    result.unwrap_or_else(|e| {
        if e.status_code().is_server_error() {
            error!("{} {} failed: {}", req.method, path, e);
        } else {
            debug!("{} {} rejected: {}", req.method, path, e);
        }
        routes::error_response(&e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use hyper::StatusCode;

    #[tokio::test]
    async fn test_body_within_limit() {
        let body = read_body(Full::new(Bytes::from_static(b"{\"message\":\"hi\"}")))
            .await
            .unwrap();
        assert_eq!(&body[..], b"{\"message\":\"hi\"}");
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let oversized = Bytes::from(vec![b'a'; MAX_BODY_BYTES + 1]);

        let err = read_body(Full::new(oversized)).await.unwrap_err();
        assert!(matches!(err, ParlorError::PayloadTooLarge(_)));

        let response = routes::error_response(&err);
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
