//! JSON-over-HTTP authentication backend

use async_trait::async_trait;
use log::{debug, warn};
use oll_session::User;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::backend::AuthBackend;
use crate::error::{AuthError, Result};

/// Backend that forwards login and signup to a remote auth API.
///
/// Requests are `POST {base}/auth/login` and `POST {base}/auth/signup` with a
/// JSON body; a successful response carries the user as JSON.
pub struct HttpAuthBackend {
    base_url: Url,
    http_client: Client,
}

impl HttpAuthBackend {
    /// Create a backend for the API rooted at `base_url`
    pub fn new(base_url: &str, http_client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    fn endpoint(&self, action: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AuthError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("auth")
            .push(action);
        Ok(url)
    }

    async fn post(&self, action: &str, payload: serde_json::Value) -> Result<User> {
        let url = self.endpoint(action)?;
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED => AuthError::InvalidCredentials,
                StatusCode::CONFLICT => AuthError::UserAlreadyExists,
                StatusCode::NOT_FOUND => AuthError::UserNotFound,
                _ => {
                    warn!("Auth API {} failed with {}: {}", action, status, error_text);
                    AuthError::Api(error_text)
                }
            });
        }

        let body = response.text().await?;
        let user = serde_json::from_str::<User>(&body)?;
        Ok(user)
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, email: &str, password: &str) -> Result<User> {
        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });
        self.post("login", payload).await
    }

    async fn signup(&self, name: &str, email: &str, password: &str) -> Result<User> {
        let payload = serde_json::json!({
            "name": name,
            "email": email,
            "password": password,
        });
        self.post("signup", payload).await
    }
}
