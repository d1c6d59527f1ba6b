use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::model::User;
use crate::users::repo::{RepoError, UserRepo};

/// In-memory repository with the same uniqueness behavior as the
/// Postgres one. Backs the test suite and local development without a
/// database.
#[derive(Default)]
pub struct InMemoryUserRepo {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepo for InMemoryUserRepo {
    async fn insert(&self, user: &User) -> Result<(), RepoError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(RepoError::Duplicate("username"));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(RepoError::Duplicate("email"));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn fetch_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn fetch_by_reset_token(&self, token: &str) -> Result<Option<User>, RepoError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.password_reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn fetch_by_verification_token(&self, token: &str) -> Result<Option<User>, RepoError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email_verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update(&self, user: &User) -> Result<(), RepoError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(RepoError::Duplicate("username"));
        }
        if users.values().any(|u| u.id != user.id && u.email == user.email) {
            return Err(RepoError::Duplicate("email"));
        }
        match users.get_mut(&user.id) {
            Some(slot) => {
                *slot = user.clone();
                Ok(())
            }
            None => Err(RepoError::Backend(anyhow::anyhow!(
                "user {} does not exist",
                user.id
            ))),
        }
    }
}
