//! ssogate HTTP server

use axum::{
    routing::{get, post},
    Router,
};
use ssogate_auth::{normalize_url, LdapAuthenticator};
use ssogate_core::{config::SsoConfig, Result};
use ssogate_session::SessionStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{error, info};

use crate::routes;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<LdapAuthenticator>,
    pub sessions: Arc<SessionStore>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(authenticator: LdapAuthenticator, sessions: SessionStore) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            sessions: Arc::new(sessions),
            start_time: Instant::now(),
        }
    }
}

pub struct SsoServer {
    config: SsoConfig,
}

impl SsoServer {
    pub fn new(config: SsoConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        // Fail at startup rather than on the first login
        let directory = normalize_url(&self.config.ldap.url)?;
        info!(directory = %directory, base_dn = %self.config.ldap.base_dn, "Directory configured");

        let sessions = SessionStore::new(&self.config.session)?;
        let authenticator = LdapAuthenticator::new(self.config.ldap.clone());

        let app = create_router(AppState::new(authenticator, sessions));
        let addr = format!("{}:{}", self.config.server.bind_address, self.config.server.port);

        let listener = TcpListener::bind(&addr).await?;
        info!("ssogate listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server shutdown complete");
        Ok(())
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/login", post(routes::login))
        .route("/logout", post(routes::logout))
        .route("/session", get(routes::current_session))
        // Request headers carry the session cookie; keep them out of spans
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
