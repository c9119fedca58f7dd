//! Error handling for the session runtime

use thiserror::Error;

/// Unified error type for the session runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Login or signup failures
    #[error("Authentication error: {0}")]
    Auth(#[from] oll_auth::AuthError),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether retrying with other credentials could succeed
    pub fn is_credentials_error(&self) -> bool {
        matches!(
            self,
            Error::Auth(oll_auth::AuthError::InvalidCredentials)
                | Error::Auth(oll_auth::AuthError::UserAlreadyExists)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
