#[cfg(feature = "ssr")]
pub mod server;
mod types;

pub use types::*;

#[cfg(feature = "ssr")]
pub use server::*;
