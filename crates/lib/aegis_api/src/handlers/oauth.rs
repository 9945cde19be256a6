//! OAuth request handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use aegis_core::oauth::{AuthorizeOutcome, AuthorizeParams, TokenParams};

use crate::AppState;
use crate::error::ApiResult;
use crate::services::cookies;

#[derive(Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
}

#[derive(Deserialize)]
pub struct TokenBody {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    success: bool,
    access_token: String,
    refresh_token: String,
    id_token: String,
    token_type: &'static str,
    expires_in: i64,
}

/// `GET /oauth/authorize` — recognize the browser via the SSO cookie and
/// either redirect back to the relying party with a fresh code, or send
/// the user agent to the login page. Parameter and client validation
/// failures return JSON and never redirect.
pub async fn authorize_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<AuthorizeQuery>,
) -> ApiResult<Response> {
    let sso_token = jar
        .get(cookies::SSO_COOKIE)
        .map(|c| c.value().to_string());

    let params = AuthorizeParams {
        client_id: query.client_id,
        redirect_uri: query.redirect_uri,
        response_type: query.response_type,
        state: query.state,
    };

    let outcome = state.oauth.authorize(params, sso_token.as_deref()).await?;
    let target = match outcome {
        AuthorizeOutcome::CodeRedirect(url) | AuthorizeOutcome::LoginRedirect(url) => url,
    };
    Ok(Redirect::to(&target).into_response())
}

/// `POST /oauth/token` — exchange an authorization code for the three
/// JWTs. Called by relying-party backends, so no cookies are set.
pub async fn token_handler(
    State(state): State<AppState>,
    body: Result<Json<TokenBody>, JsonRejection>,
) -> ApiResult<Json<TokenResponse>> {
    let Json(body) = body?;
    let grant = state
        .oauth
        .exchange(TokenParams {
            grant_type: body.grant_type,
            code: body.code,
            client_id: body.client_id,
            client_secret: body.client_secret,
            redirect_uri: body.redirect_uri,
        })
        .await?;

    Ok(Json(TokenResponse {
        success: true,
        access_token: grant.access_token,
        refresh_token: grant.refresh_token,
        id_token: grant.id_token,
        token_type: grant.token_type,
        expires_in: grant.expires_in,
    }))
}
