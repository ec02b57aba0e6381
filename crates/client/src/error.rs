use crate::auth::AuthError;
use common::crypto::ShareError;

/// Errors raised while constructing or configuring the client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("share error: {0}")]
    Share(#[from] ShareError),
}
