use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Room gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Rejected: {0}")]
    PermissionDenied(String),

    #[error("Cannot resolve identity: {0}")]
    UnresolvedIdentity(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Error::Custom(msg.into())
    }

    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Error::InvalidCommand(msg.into())
    }
}
