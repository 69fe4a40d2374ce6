//! # battlectl: Battle Request Scheduling Service
//!
//! `battlectl` is the backend for a public scheduling form paired with an
//! admin-approval workflow: viewers book timed "battle" sessions with a
//! streamer, the streamer accepts or declines each request from links in a
//! notification email, and requesters are told the outcome by email.
//!
//! ## Overview
//!
//! Battles run in ten fixed hour-long slots per day (2 PM through 11 PM). A
//! submission claims a `(date, slot)` pair and starts out `pending`. Pending
//! and confirmed requests occupy their slot; a rejected request frees it. Each
//! request carries a high-entropy token generated at creation; possession of
//! that token is the only credential needed to approve or decline the request,
//! so the admin can act straight from the email links without logging in.
//!
//! ### Request Flow
//!
//! A client first queries slot availability for a date, then submits the form.
//! The availability check is advisory: the store enforces the real invariant
//! with a partial unique index over actively-booked `(date, time)` pairs, so
//! of two racing submissions for one slot exactly one wins and the other
//! receives a conflict response. On creation the admin is emailed a pair of
//! accept/reject links embedding the token; following one transitions the
//! request to its terminal status and emails the requester the outcome.
//! Status transitions are idempotent: re-applying a terminal status re-writes
//! the same value and re-sends the same email.
//!
//! Email delivery is fire-and-forget through an in-process outbox channel:
//! a booking or status change never fails because a notification could not be
//! sent.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and uses PostgreSQL for persistence. The **API layer**
//! ([`api`]) exposes the public booking endpoints, the tokenized status
//! update, and a key-guarded admin listing. The **store** ([`store`]) is a
//! single interface over the backing medium with a PostgreSQL implementation
//! (repository pattern, [`db`]) and an in-memory test double. The
//! **notification dispatcher** ([`notifications`]) drains the outbox onto the
//! configured email transport ([`email`]). A small [`twitch`] client backs
//! the channel live-status endpoint.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use battlectl::{Application, Config, telemetry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = battlectl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     }).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
mod crypto;
pub mod db;
pub mod email;
pub mod errors;
pub mod notifications;
mod openapi;
pub mod scheduling;
pub mod store;
pub mod telemetry;
pub mod twitch;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
use config::CorsOrigin;
use email::EmailService;
use notifications::NotificationOutbox;
use openapi::ApiDoc;
use store::{PgRequestStore, RequestStore};
use twitch::TwitchClient;

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    /// Request store, polymorphic over backing medium
    pub store: Arc<dyn RequestStore>,
    /// Application configuration loaded from file/environment
    pub config: Config,
    /// Producer half of the notification outbox
    pub outbox: NotificationOutbox,
    /// Twitch client, present when the integration is enabled
    pub twitch: Option<Arc<TwitchClient>>,
}

/// Get the battlectl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect to PostgreSQL using the configured pool settings and run migrations.
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let settings = &config.database.pool;

    let mut options = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs));
    if settings.idle_timeout_secs > 0 {
        options = options.idle_timeout(Duration::from_secs(settings.idle_timeout_secs));
    }
    if settings.max_lifetime_secs > 0 {
        options = options.max_lifetime(Duration::from_secs(settings.max_lifetime_secs));
    }

    let pool = options.connect(&config.database.url).await?;
    migrator().run(&pool).await?;

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    // A wildcard origin cannot be passed to AllowOrigin::list; config
    // validation already forbids combining it with credentials.
    let has_wildcard = config.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));

    let allow_origin = if has_wildcard {
        tower_http::cors::AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &config.cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        tower_http::cors::AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(config.cors.allow_credentials)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// This function constructs the complete Axum router with:
/// - Public booking endpoints and the tokenized status update
/// - Admin listing guarded by the configured key
/// - Twitch live-status endpoint
/// - OpenAPI docs at `/docs`
/// - Optional Prometheus metrics
/// - CORS and tracing middleware
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route(
            "/battle-requests",
            get(api::handlers::battle_requests::list_battle_requests).post(api::handlers::battle_requests::create_battle_request),
        )
        .route("/battle-requests/availability", get(api::handlers::battle_requests::get_availability))
        .route("/battle-requests/update-status", post(api::handlers::battle_requests::update_status))
        .route("/twitch/status", get(api::handlers::twitch::stream_status))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    // Create CORS layer from config
    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    // Add Prometheus metrics if enabled
    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(move || async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    // Add tracing layer
    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Container for background services and their lifecycle management.
///
/// The only background task is the notification dispatcher draining the
/// outbox channel. When dropped, the `drop_guard` cancels the shutdown token,
/// signaling the task to stop.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: tokio_util::sync::CancellationToken,
    // Pub so that we can disarm it if we want to
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        // Signal all background tasks to shutdown
        self.shutdown_token.cancel();

        // Wait for all background tasks to complete
        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Spawn the notification dispatcher feeding the configured email transport.
fn setup_background_services(config: &Config) -> anyhow::Result<(NotificationOutbox, BackgroundServices)> {
    let shutdown_token = tokio_util::sync::CancellationToken::new();
    let drop_guard = shutdown_token.clone().drop_guard();

    let email_service = EmailService::new(config).map_err(|e| anyhow::anyhow!("Failed to create email service: {e}"))?;
    let (outbox, dispatcher_handle) = notifications::spawn_dispatcher(
        email_service,
        config.admin_email.clone(),
        config.notifications.channel_capacity,
        shutdown_token.clone(),
    );

    Ok((
        outbox,
        BackgroundServices {
            background_tasks: vec![dispatcher_handle],
            shutdown_token,
            drop_guard: Some(drop_guard),
        },
    ))
}

/// Main application struct that owns all resources and lifecycle.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects to the database, runs
///    migrations, and starts the notification dispatcher
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts
///    handling requests
/// 3. **Shutdown**: When the shutdown signal is received, gracefully stops
///    background services and closes the pool
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create an application over an existing pool (used by tests; migrations
    /// are assumed to have run already).
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting battlectl with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => pool,
            None => setup_database(&config).await?,
        };

        let (outbox, bg_services) = setup_background_services(&config)?;

        let twitch = if config.twitch.enabled {
            Some(Arc::new(TwitchClient::new(&config.twitch).map_err(|e| anyhow::anyhow!("Failed to create Twitch client: {e}"))?))
        } else {
            None
        };

        let state = AppState::builder()
            .store(Arc::new(PgRequestStore::new(pool.clone())) as Arc<dyn RequestStore>)
            .config(config.clone())
            .outbox(outbox)
            .maybe_twitch(twitch)
            .build();

        let router = build_router(&state)?;

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "battlectl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        // Run the server with graceful shutdown
        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        // Shutdown background services and wait for tasks to complete
        self.bg_services.shutdown().await;

        // Close database connections
        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
