//! HTTP host for the Carestate bucket store.
//!
//! Registers the telehealth bucket catalog, hydrates it, exposes read-only
//! inspection endpoints, and drains pending writes on shutdown.

pub mod catalog;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use catalog::register_catalog;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::CarestateServer;
