//! Discovery errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mDNS daemon failed: {0}")]
    Daemon(String),

    #[error("service registration failed: {0}")]
    Register(String),

    #[error("browse failed: {0}")]
    Browse(String),
}
