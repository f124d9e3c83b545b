//! HTTP server implementation
//!
//! hyper http1 with TokioIo; one task per connection, upgrades enabled for
//! the gateway endpoint. All core components are constructed once here and
//! injected by reference into request handlers.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::{IdentityVerifier, JwtIdentityVerifier, JwtValidator};
use crate::config::Args;
use crate::db::{MemoryRecordStore, MongoClient, MongoRecordStore, RecordStore};
use crate::gateway::{self, EventGateway, RoomRegistry};
use crate::membership::MembershipService;
use crate::routes;
use crate::types::AtriumError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: Option<MongoClient>,
    pub store: Arc<dyn RecordStore>,
    pub membership: Arc<MembershipService>,
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Live connection and room registry
    pub registry: Arc<RoomRegistry>,
    /// Broadcast surface handed to mutation handlers
    pub gateway: Arc<EventGateway>,
    pub started_at: Instant,
}

impl AppState {
    /// Construct all core components.
    ///
    /// Without a MongoDB client the record store falls back to the in-memory
    /// implementation (dev mode only; `main` enforces that).
    pub async fn new(args: Args, mongo: Option<MongoClient>) -> Result<Self, AtriumError> {
        let store: Arc<dyn RecordStore> = match &mongo {
            Some(client) => Arc::new(MongoRecordStore::new(client).await?),
            None => Arc::new(MemoryRecordStore::new()),
        };

        let membership = Arc::new(MembershipService::new(Arc::clone(&store)));

        let jwt = match &args.jwt_secret {
            Some(secret) => JwtValidator::new(secret.clone(), args.jwt_expiry_seconds)?,
            None if args.dev_mode => JwtValidator::new_dev(),
            None => {
                return Err(AtriumError::Config(
                    "JWT_SECRET is required in production mode".to_string(),
                ))
            }
        };
        let verifier: Arc<dyn IdentityVerifier> = Arc::new(JwtIdentityVerifier::new(jwt));

        let registry = Arc::new(RoomRegistry::new(args.max_clients));
        let gateway = Arc::new(EventGateway::new());
        gateway.attach(Arc::clone(&registry));

        Ok(Self {
            args,
            mongo,
            store,
            membership,
            verifier,
            registry,
            gateway,
            started_at: Instant::now(),
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), AtriumError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Atrium listening on {} as node {}",
        state.args.listen, state.args.node_id
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
                        .serve_connection(io, service)
                        .with_upgrades()
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

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    // Gateway endpoint: WebSocket upgrade into the realtime layer
    if path == "/ws" {
        if hyper_tungstenite::is_upgrade_request(&req) {
            return Ok(gateway::handle_gateway_upgrade(state, req).await);
        }
        return Ok(routes::error_response(
            StatusCode::UPGRADE_REQUIRED,
            "BAD_REQUEST",
            "gateway endpoint requires a WebSocket upgrade",
        ));
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let response = match (method, segments.as_slice()) {
        // Probes
        (Method::GET, ["health"]) | (Method::GET, ["healthz"]) => routes::health_check(&state),
        (Method::GET, ["ready"]) | (Method::GET, ["readyz"]) => routes::readiness_check(&state),
        (Method::GET, ["version"]) => routes::version_info(),

        // Sessions
        (Method::POST, ["auth", "sessions"]) => {
            routes::sessions::record_session(state, req).await
        }

        // Groups and membership
        (Method::POST, ["groups"]) => routes::groups::create_group(state, req).await,
        (Method::GET, ["users", user_id, "groups"]) => {
            routes::groups::list_user_groups(state, req, user_id).await
        }
        (Method::GET, ["groups", group_id, "members", user_id]) => {
            routes::groups::membership_check(state, req, group_id, user_id).await
        }
        (Method::POST, ["groups", group_id, "members"]) => {
            routes::groups::assign_member(state, req, group_id).await
        }
        (Method::DELETE, ["groups", group_id, "members", user_id]) => {
            routes::groups::remove_member(state, req, group_id, user_id).await
        }
        (Method::POST, ["groups", group_id, "messages"]) => {
            routes::messages::post_message(state, req, group_id).await
        }

        // Progression
        (Method::GET, ["users", user_id, "progress"]) => {
            routes::progress::get_progress(state, req, user_id).await
        }
        (Method::PUT, ["users", user_id, "progress"]) => {
            routes::progress::put_progress(state, req, user_id).await
        }
        (Method::POST, ["users", user_id, "progress", "lessons"]) => {
            routes::progress::complete_lesson(state, req, user_id).await
        }
        (Method::POST, ["users", user_id, "progress", "quizzes"]) => {
            routes::progress::complete_quiz(state, req, user_id).await
        }
        (Method::POST, ["users", user_id, "progress", "final-quiz"]) => {
            routes::progress::complete_final_quiz(state, req, user_id).await
        }

        // Announcements
        (Method::POST, ["broadcast", "news"]) => routes::broadcast::news(state, req).await,
        (Method::POST, ["broadcast", "exam"]) => routes::broadcast::exam(state, req).await,

        _ => routes::not_found_response(&path),
    };

    Ok(response)
}
