//! Input subsystem errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("permission denied: cannot register event tap")]
    PermissionDenied,

    #[error("capture backend already started")]
    AlreadyStarted,

    #[error("injection failed: {0}")]
    Injection(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
