use crate::session::{
    self,
    middleware::SessionManager,
    store::{spawn_prune_worker, MemorySessionStore, PgSessionStore},
    SessionStore,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{FromRef, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    middleware::{from_fn_with_state, map_response},
    routing::get,
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;

pub mod body;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod headers;
pub mod openapi;
pub mod origin;

use self::{
    collaborators::{SessionAuth, Unmounted},
    config::GatewayConfig,
    dispatch::{Collaborator, DispatchTable},
    handlers::{health, root},
};

pub const AUTH_PREFIX: &str = "/auth";
pub const POSTS_PREFIX: &str = "/api/posts";
pub const API_PREFIX: &str = "/api";

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Shared, read-only state handed to every stage.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<dyn SessionStore>,
    pub dispatch: Arc<DispatchTable>,
}

impl FromRef<AppState> for Arc<GatewayConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

/// The assembled gateway: configuration, session store and mounted collaborators.
#[derive(Clone)]
pub struct Gateway {
    state: AppState,
}

pub struct GatewayBuilder {
    config: GatewayConfig,
    store: Arc<dyn SessionStore>,
    dispatch: DispatchTable,
}

impl GatewayBuilder {
    #[must_use]
    pub fn mount(mut self, prefix: &str, collaborator: Arc<dyn Collaborator>) -> Self {
        self.dispatch = self.dispatch.mount(prefix, collaborator);
        self
    }

    /// Session auth on `/auth`; posts and comments answer 503 until mounted.
    #[must_use]
    pub fn with_default_mounts(self) -> Self {
        self.mount(AUTH_PREFIX, Arc::new(SessionAuth))
            .mount(POSTS_PREFIX, Arc::new(Unmounted::new("posts")))
            .mount(API_PREFIX, Arc::new(Unmounted::new("comments")))
    }

    #[must_use]
    pub fn build(self) -> Gateway {
        Gateway {
            state: AppState {
                config: Arc::new(self.config),
                store: self.store,
                dispatch: Arc::new(self.dispatch),
            },
        }
    }
}

impl Gateway {
    #[must_use]
    pub fn builder(config: GatewayConfig, store: Arc<dyn SessionStore>) -> GatewayBuilder {
        GatewayBuilder {
            config,
            store,
            dispatch: DispatchTable::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.state.config
    }

    /// Build the router with the full pipeline.
    ///
    /// Layers listed first wrap the ones after them, so a request meets:
    /// request id, tracing, security headers, error terminal, panic capture,
    /// origin policy, CORS/preflight, JSON body parsing, and (for routed paths
    /// only) the session stage. `/health` and the documentation never see a session.
    #[must_use]
    pub fn router(&self) -> Router {
        let config = self.state.config.clone();
        let sessions = SessionManager::new(self.state.store.clone(), config.clone());

        let routed = Router::new()
            .route("/", get(root::root))
            .fallback(dispatch::dispatch)
            .layer(from_fn_with_state(sessions, session::middleware::attach));

        Router::new()
            .route("/health", get(health::health))
            .route(openapi::OPENAPI_PATH, get(openapi::openapi_json))
            .merge(openapi::swagger_ui())
            .merge(routed)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestHeaderLayer::if_not_present(
                        REQUEST_ID,
                        |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                    ))
                    .layer(PropagateRequestIdLayer::new(REQUEST_ID))
                    .layer(TraceLayer::new_for_http().make_span_with(make_span))
                    .layer(map_response(headers::apply))
                    .layer(from_fn_with_state(config.clone(), error::render_errors))
                    .layer(CatchPanicLayer::custom(error::panic_response))
                    .layer(from_fn_with_state(config.clone(), origin::enforce))
                    .layer(origin::cors_layer(config.allow_set()))
                    .layer(from_fn_with_state(config, body::parse_json)),
            )
            .with_state(self.state.clone())
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

/// Open the session store: `PostgreSQL` when a DSN is configured, memory otherwise.
///
/// # Errors
/// Returns an error if the database is unreachable or the session table cannot
/// be provisioned; both are fatal at startup.
pub async fn session_store(dsn: Option<&str>) -> Result<Arc<dyn SessionStore>> {
    let Some(dsn) = dsn else {
        warn!("No database configured, sessions are kept in memory and lost on restart");
        return Ok(Arc::new(MemorySessionStore::new()));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    let store = PgSessionStore::new(pool)
        .await
        .context("Failed to provision session table")?;

    Ok(Arc::new(store))
}

/// Start the server
/// # Errors
/// Return error if the session store cannot be opened or the listener fails
pub async fn new(port: u16, dsn: Option<String>, config: GatewayConfig) -> Result<()> {
    if config.trust_proxy_forced() {
        warn!("Secure cookies are enabled, trusting one reverse-proxy hop for the request scheme");
    }

    let store = session_store(dsn.as_deref()).await?;
    spawn_prune_worker(store.clone(), config.prune_interval());

    info!(
        mode = %config.mode(),
        origins = config.allow_set().len(),
        secure_cookie = config.cookie_policy().secure,
        "Gateway configured"
    );

    let gateway = Gateway::builder(config, store).with_default_mounts().build();
    let app = gateway.router();

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!("Failed to listen for SIGTERM: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}
