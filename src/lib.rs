pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod login;
pub mod rotation;

use api::create_api_router;
use axum::Router;
use db::{Database, RefreshTokenStore};
use jwt::{TokenCodec, TokenLifetimes};
use login::CredentialVerifier;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (users and refresh tokens)
    pub db: Database,
    /// JWT secret for signing tokens
    pub jwt_secret: Vec<u8>,
    /// Access and refresh token lifetimes
    pub lifetimes: TokenLifetimes,
}

/// Create the application router with the given configuration.
/// Users and refresh tokens both live in the configured database.
pub fn create_app(config: &ServerConfig) -> Router {
    let codec = Arc::new(TokenCodec::with_lifetimes(
        &config.jwt_secret,
        config.lifetimes,
    ));

    build_app(codec, config.db.clone(), config.db.tokens())
}

/// Create the application router from explicit collaborators.
pub fn build_app<V, S>(codec: Arc<TokenCodec>, verifier: V, store: S) -> Router
where
    V: CredentialVerifier + Clone + 'static,
    S: RefreshTokenStore + Clone + 'static,
{
    Router::new().nest("/api", create_api_router(codec, verifier, store))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(&db.tokens()).await;
    cleanup::spawn_cleanup_scheduler(db.tokens());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    axum::serve(listener, app.into_make_service()).await
}
