use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::users::model::User;

#[derive(Debug, Error)]
pub enum RepoError {
    /// A unique constraint on the named column was violated.
    #[error("duplicate value for {0}")]
    Duplicate(&'static str),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence seam for user records. Implementations return the full
/// record including the password hash; redaction policy lives in the
/// credential store on top.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn insert(&self, user: &User) -> Result<(), RepoError>;
    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    /// Exact match; emails are stored lowercase so callers lowercase first.
    async fn fetch_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    /// Case-sensitive match.
    async fn fetch_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;
    async fn fetch_by_reset_token(&self, token: &str) -> Result<Option<User>, RepoError>;
    async fn fetch_by_verification_token(&self, token: &str) -> Result<Option<User>, RepoError>;
    /// Replaces the stored record, keyed by `user.id`.
    async fn update(&self, user: &User) -> Result<(), RepoError>;
}
