use serde::{Deserialize, Serialize};

/// Cookie the sign-in flow stores the upstream access token in.
pub const AUTH_COOKIE_NAME: &str = "access_token";

/// Whether the relay attaches the session credential to upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthPolicy {
    /// Send `Authorization: Bearer <cookie value>` when the cookie is present.
    ForwardSessionCookie,
    /// Never send credentials upstream.
    Anonymous,
}

impl AuthPolicy {
    pub fn forwards_credentials(self) -> bool {
        matches!(self, AuthPolicy::ForwardSessionCookie)
    }
}
