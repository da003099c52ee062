#[cfg(feature = "ssr")]
pub mod app;
pub mod auth;
#[cfg(feature = "ssr")]
pub mod cancellable_sse;
pub mod components;
pub mod config;
#[cfg(feature = "ssr")]
pub mod error;
#[cfg(feature = "ssr")]
pub mod handlers;
#[cfg(feature = "ssr")]
pub mod middleware;
pub mod models;
#[cfg(feature = "ssr")]
pub mod state;
pub mod types;
