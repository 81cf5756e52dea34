//! Operator HTTP surface for the tunnel broker
//!
//! Two authorized endpoints (`POST /adduser` and `GET /info`) plus a public
//! health check, the OpenAPI document and an optional static file tree.

pub mod handlers;
pub mod middleware;
pub mod models;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use broker_registry::AdmissionController;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;

pub use middleware::{AdminSecret, ADMIN_SECRET_HEADER};

/// Default admin listener
pub const DEFAULT_ADMIN_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 4446);

/// Default bound on how long provisioning waits for the store
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Application state shared across handlers
pub struct AppState {
    pub controller: Arc<AdmissionController>,
    pub store_timeout: Duration,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tunnel Broker Admin API",
        version = "0.1.0",
        description = "Operator endpoints for provisioning and inspecting tunnel accounts"
    ),
    paths(
        handlers::provision_account,
        handlers::show_info,
        handlers::health_check,
    ),
    components(
        schemas(
            broker_proto::AccountConfig,
            broker_proto::AccountSnapshot,
            models::ProvisionResponse,
            models::HealthResponse,
            models::ErrorResponse,
        )
    ),
    tags(
        (name = "accounts", description = "Account provisioning and inspection"),
        (name = "system", description = "System health and info endpoints")
    )
)]
struct ApiDoc;

/// Admin server configuration
pub struct AdminServerConfig {
    /// Address to bind the admin server
    pub bind_addr: SocketAddr,
    /// Value the `Auth` header must carry
    pub admin_secret: String,
    /// How long a provisioning request waits for the store
    pub store_timeout: Duration,
    /// Directory served under `/static/`
    pub static_dir: Option<PathBuf>,
    /// Serve HTTPS with this configuration instead of plain HTTP
    pub tls: Option<Arc<rustls::ServerConfig>>,
}

impl Default for AdminServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADMIN_ADDR,
            admin_secret: String::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            static_dir: None,
            tls: None,
        }
    }
}

/// Admin server
pub struct AdminServer {
    config: AdminServerConfig,
    state: Arc<AppState>,
}

impl AdminServer {
    /// Create a new admin server
    pub fn new(config: AdminServerConfig, controller: Arc<AdmissionController>) -> Self {
        let state = Arc::new(AppState {
            controller,
            store_timeout: config.store_timeout,
        });

        Self { config, state }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let secret = AdminSecret::new(self.config.admin_secret.clone());

        let public_router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/api/openapi.json", get(openapi_json))
            .with_state(self.state.clone());

        let protected_router = Router::new()
            .route("/adduser", post(handlers::provision_account))
            .route("/info", get(handlers::show_info))
            .with_state(self.state.clone())
            .layer(axum_middleware::from_fn_with_state(
                secret,
                middleware::require_admin_secret,
            ));

        let mut router = public_router.merge(protected_router);

        if let Some(dir) = &self.config.static_dir {
            router = router.nest_service("/static", ServeDir::new(dir));
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Start the admin server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        if self.config.admin_secret.is_empty() {
            anyhow::bail!("Admin secret must not be empty");
        }

        let router = self.build_router();
        let addr = self.config.bind_addr;

        match self.config.tls.clone() {
            Some(tls) => {
                info!("Starting admin server on https://{}", addr);
                axum_server::bind_rustls(addr, RustlsConfig::from_config(tls))
                    .serve(router.into_make_service())
                    .await
                    .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
            }
            None => {
                info!("Starting admin server on http://{}", addr);
                let listener = tokio::net::TcpListener::bind(addr).await?;
                axum::serve(listener, router)
                    .await
                    .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
            }
        }

        Ok(())
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
