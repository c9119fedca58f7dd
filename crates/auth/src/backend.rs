//! Credential verification and account creation

use async_trait::async_trait;
use log::{debug, info};
use oll_session::User;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AuthError, Result};

/// Capability that checks credentials and creates accounts
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Verify `email` / `password` and return the matching user
    async fn login(&self, email: &str, password: &str) -> Result<User>;

    /// Create an account and return the new user
    async fn signup(&self, name: &str, email: &str, password: &str) -> Result<User>;
}

/// Simulated network latency of [`MockAuthBackend`]
#[derive(Debug, Clone)]
pub struct MockLatency {
    pub login: Duration,
    pub signup: Duration,
}

impl Default for MockLatency {
    fn default() -> Self {
        Self {
            login: Duration::from_millis(1000),
            signup: Duration::from_millis(1200),
        }
    }
}

impl MockLatency {
    /// No delay at all
    pub fn none() -> Self {
        Self {
            login: Duration::ZERO,
            signup: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct Directory {
    users: Vec<User>,
    // Plain-text passwords, mock only.
    credentials: HashMap<String, String>,
}

/// In-memory backend seeded with two demo accounts
pub struct MockAuthBackend {
    directory: RwLock<Directory>,
    latency: MockLatency,
}

impl MockAuthBackend {
    /// Backend with the demo accounts and default latency
    pub fn new() -> Self {
        Self::with_latency(MockLatency::default())
    }

    /// Backend with the demo accounts and custom latency
    pub fn with_latency(latency: MockLatency) -> Self {
        let backend = Self::empty(latency);
        backend.insert(
            User::new("1", "John Doe", "john@example.com"),
            "password123",
        );
        backend.insert(
            User::new("2", "Jane Smith", "jane@example.com"),
            "password456",
        );
        backend
    }

    /// Backend without any account
    pub fn empty(latency: MockLatency) -> Self {
        Self {
            directory: RwLock::new(Directory::default()),
            latency,
        }
    }

    /// Add an account directly
    pub fn insert(&self, user: User, password: &str) {
        let mut directory = self
            .directory
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        directory
            .credentials
            .insert(user.email.clone(), password.to_string());
        directory.users.push(user);
    }

    /// Register a password without a user record
    pub fn insert_credentials(&self, email: &str, password: &str) {
        let mut directory = self
            .directory
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        directory
            .credentials
            .insert(email.to_string(), password.to_string());
    }

    /// Number of known users
    pub fn user_count(&self) -> usize {
        self.directory
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .users
            .len()
    }

    async fn simulate_latency(delay: Duration) {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn login(&self, email: &str, password: &str) -> Result<User> {
        Self::simulate_latency(self.latency.login).await;

        let directory = self
            .directory
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match directory.credentials.get(email) {
            Some(stored) if stored == password => {}
            _ => {
                debug!("Rejected login for {}", email);
                return Err(AuthError::InvalidCredentials);
            }
        }

        directory
            .users
            .iter()
            .find(|user| user.email == email)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn signup(&self, name: &str, email: &str, password: &str) -> Result<User> {
        Self::simulate_latency(self.latency.signup).await;

        let mut directory = self
            .directory
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if directory.users.iter().any(|user| user.email == email) {
            return Err(AuthError::UserAlreadyExists);
        }

        let user = User::new(Uuid::new_v4().to_string(), name, email);
        directory.users.push(user.clone());
        directory
            .credentials
            .insert(email.to_string(), password.to_string());

        info!("Registered mock user {}", email);
        Ok(user)
    }
}
