use thiserror::Error;

/// Authentication error
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("User already exists with this email")]
    UserAlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// A newer login, signup or logout happened while this attempt was pending
    #[error("Authentication attempt was superseded")]
    Superseded,
}

pub type Result<T> = std::result::Result<T, AuthError>;
