//! API server configuration.

use std::str::FromStr;

use aegis_core::crypto::DEFAULT_HASH_COST;

/// Configuration for the identity provider.
///
/// All secrets and policy knobs are loaded once at startup and are
/// immutable for the life of the process.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:4000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// HMAC key for access and ID tokens.
    pub access_token_secret: String,
    /// HMAC key for refresh tokens. Falls back to the access secret when
    /// unset (single-key compatibility mode).
    pub refresh_token_secret: String,
    /// Parent-suffix domain for the `sso_session` cookie. The access and
    /// refresh cookies are host-only.
    pub cookie_domain: String,
    /// Flips cookie `Secure` and suppresses error detail.
    pub production_mode: bool,
    /// Gates `/auth/me` and `/oauth/authorize` on a verified email.
    pub email_verification_required: bool,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub code_ttl_secs: i64,
    /// bcrypt cost for passwords and client secrets.
    pub password_hash_cost: u32,
    pub password_min_len: usize,
    pub token_issuer: String,
    pub token_audience: String,
    /// Where `/oauth/authorize` sends user agents without a usable session.
    pub login_path: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str) -> bool {
    matches!(
        std::env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes")
    )
}

impl ApiConfig {
    /// Reads configuration from environment variables with development
    /// defaults. Production deployments must override both secrets and
    /// the cookie domain.
    pub fn from_env() -> Self {
        let access_token_secret = env_or(
            "ACCESS_TOKEN_SECRET",
            "aegis-dev-access-secret-change-in-production",
        );
        let refresh_token_secret =
            std::env::var("REFRESH_TOKEN_SECRET").unwrap_or_else(|_| access_token_secret.clone());
        Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:4000"),
            database_url: env_or("DATABASE_URL", "postgres://localhost:5432/aegis"),
            access_token_secret,
            refresh_token_secret,
            cookie_domain: env_or("COOKIE_DOMAIN", "localhost"),
            production_mode: env_bool("PRODUCTION_MODE"),
            email_verification_required: env_bool("EMAIL_VERIFICATION_REQUIRED"),
            access_ttl_secs: env_parse("ACCESS_TTL_SECS", 86_400),
            refresh_ttl_secs: env_parse("REFRESH_TTL_SECS", 86_400 * 30),
            code_ttl_secs: env_parse("CODE_TTL_SECS", 600),
            password_hash_cost: env_parse("PASSWORD_HASH_COST", DEFAULT_HASH_COST),
            password_min_len: env_parse("PASSWORD_MIN_LEN", 8),
            token_issuer: env_or("TOKEN_ISSUER", "aegis-idp"),
            token_audience: env_or("TOKEN_AUDIENCE", "aegis-apps"),
            login_path: env_or("LOGIN_PATH", "/login"),
        }
    }

    /// True when the refresh tokens share the access secret, which a
    /// leaked access key would then be able to forge.
    pub fn single_key_mode(&self) -> bool {
        self.refresh_token_secret == self.access_token_secret
    }
}
