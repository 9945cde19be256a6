//! Cookie adapter — the three session cookies and their scoping rules.
//!
//! `sso_session` is scoped to the configured parent domain so the IdP and
//! every relying party on a sibling subdomain can round-trip it through
//! `/authorize`. The access and refresh cookies stay host-only. All three
//! are HttpOnly, SameSite=Lax, and Secure in production.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::ApiConfig;

/// Cookie holding the access-token JWT, for direct IdP API calls.
pub const ACCESS_COOKIE: &str = "access_token";
/// Cookie holding the refresh-token JWT, consumed by `/auth/refresh`.
pub const REFRESH_COOKIE: &str = "refresh_token";
/// Parent-domain cookie read by `/oauth/authorize` to recognize a session.
pub const SSO_COOKIE: &str = "sso_session";

fn base(config: &ApiConfig, name: &str, value: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name.to_string(), value))
        .http_only(true)
        .secure(config.production_mode)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(max_age)
        .build()
}

pub fn access_cookie(config: &ApiConfig, token: &str) -> Cookie<'static> {
    base(
        config,
        ACCESS_COOKIE,
        token.to_string(),
        Duration::seconds(config.access_ttl_secs),
    )
}

pub fn refresh_cookie(config: &ApiConfig, token: &str) -> Cookie<'static> {
    base(
        config,
        REFRESH_COOKIE,
        token.to_string(),
        Duration::seconds(config.refresh_ttl_secs),
    )
}

/// The SSO cookie carries the access JWT but lives as long as a refresh
/// token, so `/authorize` can keep recognizing the browser for the whole
/// session window.
pub fn sso_cookie(config: &ApiConfig, access_token: &str) -> Cookie<'static> {
    let mut cookie = base(
        config,
        SSO_COOKIE,
        access_token.to_string(),
        Duration::seconds(config.refresh_ttl_secs),
    );
    cookie.set_domain(config.cookie_domain.clone());
    cookie
}

pub fn clear_access_cookie(config: &ApiConfig) -> Cookie<'static> {
    base(config, ACCESS_COOKIE, String::new(), Duration::ZERO)
}

pub fn clear_refresh_cookie(config: &ApiConfig) -> Cookie<'static> {
    base(config, REFRESH_COOKIE, String::new(), Duration::ZERO)
}

/// Clearing must repeat the domain attribute or browsers keep the cookie.
pub fn clear_sso_cookie(config: &ApiConfig) -> Cookie<'static> {
    let mut cookie = base(config, SSO_COOKIE, String::new(), Duration::ZERO);
    cookie.set_domain(config.cookie_domain.clone());
    cookie
}
