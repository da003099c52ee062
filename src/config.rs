use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::auth::{AuthPolicy, AUTH_COOKIE_NAME};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Settings for the relay server, read from the process environment.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub site_addr: SocketAddr,
    pub api_url: String,
    pub chat_path: String,
    pub chats_path: String,
    pub session_cookie: String,
    pub auth_policy: AuthPolicy,
    pub upload_dir: PathBuf,
    pub relay_buffer: usize,
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            site_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            api_url: "http://localhost:3001".to_string(),
            chat_path: "/chat/send".to_string(),
            chats_path: "/chat/all".to_string(),
            session_cookie: AUTH_COOKIE_NAME.to_string(),
            auth_policy: AuthPolicy::ForwardSessionCookie,
            upload_dir: PathBuf::from("public/uploads"),
            relay_buffer: 16,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to the
    /// defaults for anything missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("SITE_ADDR") {
            config.site_addr = parse_var("SITE_ADDR", &addr)?;
        }
        if let Some(url) = lookup("API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(path) = lookup("CHAT_PATH") {
            config.chat_path = normalize_path(&path);
        }
        if let Some(path) = lookup("CHATS_PATH") {
            config.chats_path = normalize_path(&path);
        }
        if let Some(name) = lookup("SESSION_COOKIE") {
            config.session_cookie = name;
        }
        if let Some(flag) = lookup("FORWARD_AUTH") {
            config.auth_policy = match parse_bool("FORWARD_AUTH", &flag)? {
                true => AuthPolicy::ForwardSessionCookie,
                false => AuthPolicy::Anonymous,
            };
        }
        if let Some(dir) = lookup("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(buffer) = lookup("RELAY_BUFFER") {
            let buffer: usize = parse_var("RELAY_BUFFER", &buffer)?;
            if buffer == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "RELAY_BUFFER",
                    value: "0".to_string(),
                });
            }
            config.relay_buffer = buffer;
        }
        if let Some(secs) = lookup("CONNECT_TIMEOUT_SECS") {
            config.connect_timeout =
                Duration::from_secs(parse_var("CONNECT_TIMEOUT_SECS", &secs)?);
        }

        Ok(config)
    }

    pub fn upstream_url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

/// Settings for the terminal chat client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relay_url: String,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let relay_url = env::var("RELAY_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
        Self {
            relay_url: relay_url.trim_end_matches('/').to_string(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
