use axum_extra::extract::CookieJar;
use log::debug;

use crate::auth::AuthPolicy;

/// Upstream credential derived from the caller's session cookie.
///
/// The token is passed through as-is; it is never decoded, validated or
/// refreshed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn from_jar(jar: &CookieJar, cookie_name: &str, policy: AuthPolicy) -> Option<Self> {
        if !policy.forwards_credentials() {
            return None;
        }

        let token = jar
            .get(cookie_name)
            .map(|c| c.value().trim())
            .filter(|v| !v.is_empty())?;

        debug!("Session cookie {cookie_name} found, forwarding bearer credential");
        Some(Self(token.to_string()))
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

/// Session the caller's relays belong to: the raw session cookie value, read
/// whatever the forwarding policy. Callers without the cookie share one
/// anonymous scope.
pub fn session_owner(jar: &CookieJar, cookie_name: &str) -> Option<String> {
    jar.get(cookie_name)
        .map(|c| c.value().trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Attaches the bearer header when a session token exists.
pub fn with_session(
    request: reqwest::RequestBuilder,
    session: Option<&SessionToken>,
) -> reqwest::RequestBuilder {
    match session {
        Some(token) => request.header(reqwest::header::AUTHORIZATION, token.bearer()),
        None => request,
    }
}
