//! # aegis_api
//!
//! HTTP edge of the Aegis identity provider: routing, cookie handling,
//! and the error envelope. Business rules live in `aegis_core`.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use axum::http::header;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use aegis_core::auth::AuthService;
use aegis_core::oauth::OAuthService;
use aegis_core::repo::postgres::{PgAuthCodeRepo, PgClientRepo, PgRefreshTokenRepo, PgUserRepo};
use aegis_core::repo::{AuthCodeRepo, ClientRepo, RefreshTokenRepo, UserRepo};
use aegis_core::token::TokenCodec;

use crate::config::ApiConfig;
use crate::handlers::{auth, oauth};

/// Repository handles the application state is assembled from.
pub struct Repositories {
    pub users: Arc<dyn UserRepo>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepo>,
    pub auth_codes: Arc<dyn AuthCodeRepo>,
    pub clients: Arc<dyn ClientRepo>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepo::new(pool.clone())),
            refresh_tokens: Arc::new(PgRefreshTokenRepo::new(pool.clone())),
            auth_codes: Arc::new(PgAuthCodeRepo::new(pool.clone())),
            clients: Arc::new(PgClientRepo::new(pool)),
        }
    }
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub oauth: Arc<OAuthService>,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(config: ApiConfig, repos: Repositories) -> Self {
        let codec = Arc::new(TokenCodec::new(
            config.access_token_secret.as_bytes(),
            config.refresh_token_secret.as_bytes(),
            config.token_issuer.clone(),
            config.token_audience.clone(),
            config.access_ttl_secs,
            config.refresh_ttl_secs,
        ));

        let auth = Arc::new(AuthService::new(
            repos.users.clone(),
            repos.refresh_tokens.clone(),
            codec.clone(),
            config.password_hash_cost,
            config.password_min_len,
        ));

        let oauth = Arc::new(OAuthService::new(
            repos.users,
            repos.clients,
            repos.auth_codes,
            repos.refresh_tokens,
            codec,
            config.code_ttl_secs,
            config.login_path.clone(),
            config.email_verification_required,
        ));

        Self {
            auth,
            oauth,
            config: Arc::new(config),
        }
    }
}

/// Builds the axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    // CORS: allow credentials (cookies) with mirrored origins.
    // In production, restrict allow_origin to the registered RP domains.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
        ]))
        .allow_credentials(true);

    let public = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/oauth/authorize", get(oauth::authorize_handler))
        .route("/oauth/token", post(oauth::token_handler));

    let protected = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
