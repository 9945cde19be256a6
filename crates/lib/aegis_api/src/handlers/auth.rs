//! Authentication request handlers.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use aegis_core::auth::SessionTokens;
use aegis_core::models::PublicUser;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::services::cookies;

#[derive(Deserialize)]
pub struct RegisterBody {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub identifier: Option<String>,
    pub password: Option<String>,
    /// When paired with `redirect_uri`, login continues into the OAuth
    /// flow instead of returning JSON.
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
}

/// Body shape shared by refresh and logout: the refresh token may arrive
/// here or in its cookie.
#[derive(Deserialize, Default)]
pub struct RefreshBody {
    pub refresh_token: Option<String>,
}

#[derive(Serialize)]
pub struct UserResponse {
    success: bool,
    user: PublicUser,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    user: PublicUser,
    access: String,
    refresh: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    success: bool,
    access: String,
}

#[derive(Serialize)]
pub struct OkResponse {
    success: bool,
}

fn required(value: Option<String>, name: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{name} is required")))
}

/// All three cookies set on a successful credential login.
fn session_cookies(state: &AppState, jar: CookieJar, tokens: &SessionTokens) -> CookieJar {
    jar.add(cookies::access_cookie(&state.config, &tokens.access))
        .add(cookies::refresh_cookie(&state.config, &tokens.refresh))
        .add(cookies::sso_cookie(&state.config, &tokens.access))
}

/// `POST /auth/register` — create a new account. Issues no tokens; the
/// client follows up with a login.
pub async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let Json(body) = body?;
    let email = required(body.email, "email")?;
    let password = required(body.password, "password")?;
    let user = state
        .auth
        .register(
            &email,
            body.username.as_deref(),
            &password,
            body.name.as_deref(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            success: true,
            user,
        }),
    ))
}

/// `POST /auth/login` — authenticate with email or username plus
/// password. Sets all three session cookies.
///
/// With `client_id` and `redirect_uri` present the response is a redirect
/// into `/oauth/authorize`, which now finds the fresh SSO cookie;
/// otherwise the tokens come back as JSON.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body?;
    let identifier = required(body.identifier, "identifier")?;
    let password = required(body.password, "password")?;

    // Two distinct service operations: a plain login answers with JSON, a
    // login carrying OAuth parameters continues into /oauth/authorize.
    if let (Some(client_id), Some(redirect_uri)) = (&body.client_id, &body.redirect_uri) {
        let (session, target) = state
            .auth
            .login_and_start_oauth(
                &identifier,
                &password,
                client_id,
                redirect_uri,
                body.state.as_deref(),
            )
            .await?;
        let jar = session_cookies(&state, jar, &session.tokens);
        return Ok((jar, Redirect::to(&target)).into_response());
    }

    let session = state.auth.login_direct(&identifier, &password).await?;
    let jar = session_cookies(&state, jar, &session.tokens);
    let response = LoginResponse {
        success: true,
        user: PublicUser::from(&session.user),
        access: session.tokens.access,
        refresh: session.tokens.refresh,
    };
    Ok((jar, Json(response)).into_response())
}

/// `POST /auth/refresh` — exchange a refresh token (cookie preferred,
/// body fallback) for a fresh access token. The refresh token is not
/// rotated.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Option<Json<RefreshBody>>, JsonRejection>,
) -> ApiResult<(CookieJar, Json<RefreshResponse>)> {
    let body = body?.map(|Json(b)| b).unwrap_or_default();
    let refresh_token = jar
        .get(cookies::REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or(body.refresh_token)
        .ok_or(ApiError::InvalidToken {
            tag: "invalid_token",
            message: "missing refresh token",
        })?;

    let access = state.auth.refresh(&refresh_token).await?;
    let jar = jar.add(cookies::access_cookie(&state.config, &access));
    Ok((
        jar,
        Json(RefreshResponse {
            success: true,
            access,
        }),
    ))
}

/// `POST /auth/logout` — revoke the refresh token and clear all three
/// cookies. Succeeds whether or not the token was known.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Option<Json<RefreshBody>>, JsonRejection>,
) -> ApiResult<(CookieJar, Json<OkResponse>)> {
    let body = body?.map(|Json(b)| b).unwrap_or_default();
    let refresh_token = jar
        .get(cookies::REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .or(body.refresh_token);

    if let Some(token) = refresh_token {
        state.auth.revoke(&token).await?;
    }

    let jar = jar
        .add(cookies::clear_access_cookie(&state.config))
        .add(cookies::clear_refresh_cookie(&state.config))
        .add(cookies::clear_sso_cookie(&state.config));
    Ok((jar, Json(OkResponse { success: true })))
}

/// `GET /auth/me` — the authenticated user's public profile.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(claims)): Extension<AuthenticatedUser>,
) -> ApiResult<Json<UserResponse>> {
    let user = state
        .auth
        .user_by_id(claims.user_id)
        .await?
        .ok_or(ApiError::InvalidToken {
            tag: "invalid_token",
            message: "user no longer exists",
        })?;

    if state.config.email_verification_required && !user.email_verified {
        return Err(ApiError::Forbidden("email not verified".into()));
    }

    Ok(Json(UserResponse {
        success: true,
        user: PublicUser::from(&user),
    }))
}
