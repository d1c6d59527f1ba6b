use std::sync::Arc;

use rand::RngCore;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::users::error::{StoreError, ValidationError};
use crate::users::model::{NewUser, PublicProfile, User, UserUpdate};
use crate::users::password;
use crate::users::repo::{RepoError, UserRepo};
use crate::users::validate;

const VERIFICATION_TOKEN_TTL: Duration = Duration::hours(24);
const RESET_TOKEN_TTL: Duration = Duration::hours(1);

impl From<RepoError> for StoreError {
    fn from(e: RepoError) -> Self {
        match e {
            // A constraint race on insert/update surfaces like any other
            // uniqueness violation.
            RepoError::Duplicate(field) => {
                let mut errors = ValidationError::default();
                errors.add(field, duplicate_message(field));
                StoreError::Validation(errors)
            }
            RepoError::Backend(e) => StoreError::Backend(e),
        }
    }
}

fn duplicate_message(field: &str) -> &'static str {
    match field {
        "email" => "Email is already registered",
        _ => "Username is already taken",
    }
}

fn one_shot_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Owns the user credential lifecycle: validation, hashing, lookup,
/// redaction, and the one-shot token flows. Constructed with an explicit
/// repository handle; holds no other state.
#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn UserRepo>,
}

impl CredentialStore {
    pub fn new(repo: Arc<dyn UserRepo>) -> Self {
        Self { repo }
    }

    /// Validates every field constraint plus uniqueness, collecting all
    /// violations before failing. On success the password is hashed off
    /// the request thread and the stored record is returned redacted.
    pub async fn create(&self, mut candidate: NewUser) -> Result<PublicProfile, StoreError> {
        candidate.username = candidate.username.trim().to_string();
        candidate.email = candidate.email.trim().to_lowercase();

        let mut errors = validate::validate_new_user(&candidate);
        if self.repo.fetch_by_username(&candidate.username).await?.is_some() {
            errors.add("username", duplicate_message("username"));
        }
        if self.repo.fetch_by_email(&candidate.email).await?.is_some() {
            errors.add("email", duplicate_message("email"));
        }
        errors.into_result().map_err(StoreError::Validation)?;

        let hash = hash_blocking(candidate.password).await?;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: candidate.username,
            email: candidate.email,
            password_hash: Some(hash),
            profile: candidate.profile,
            preferences: candidate.preferences.unwrap_or_default(),
            mental_health_profile: candidate.mental_health_profile,
            is_active: true,
            is_email_verified: false,
            last_login: None,
            password_reset_token: None,
            password_reset_expires: None,
            email_verification_token: None,
            email_verification_expires: None,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert(&user).await?;

        info!(user_id = %user.id, username = %user.username, "user created");
        Ok(PublicProfile::from(&user))
    }

    /// Login lookup: matches the identifier against the email
    /// (case-insensitive) or the username (case-sensitive). Returns the
    /// record including the password hash.
    pub async fn find_by_email_or_username(&self, identifier: &str) -> Result<User, StoreError> {
        let identifier = identifier.trim();
        if let Some(user) = self.repo.fetch_by_email(&identifier.to_lowercase()).await? {
            return Ok(user);
        }
        self.repo
            .fetch_by_username(identifier)
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Primary-key lookup with the password hash redacted.
    pub async fn find_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        self.repo
            .fetch_by_id(id)
            .await?
            .map(User::redacted)
            .ok_or(StoreError::NotFound)
    }

    /// Compares a candidate plaintext against the record's stored hash.
    /// An absent or malformed hash is a `Comparison` error, logged but
    /// never detailed to the caller.
    pub async fn verify_password(&self, user: &User, candidate: &str) -> Result<bool, StoreError> {
        let hash = user
            .password_hash
            .clone()
            .ok_or(StoreError::Comparison)?;
        let candidate = candidate.to_string();
        let user_id = user.id;
        let outcome = tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash))
            .await
            .map_err(|e| StoreError::Backend(anyhow::anyhow!(e)))?;
        match outcome {
            Ok(matched) => Ok(matched),
            Err(e) => {
                tracing::error!(error = %e, %user_id, "password comparison failed");
                Err(StoreError::Comparison)
            }
        }
    }

    pub fn to_public_profile(&self, user: &User) -> PublicProfile {
        PublicProfile::from(user)
    }

    /// Applies a partial update. Changed fields are re-validated; the
    /// password is re-hashed if and only if it is part of the update.
    pub async fn update(&self, id: Uuid, mut update: UserUpdate) -> Result<PublicProfile, StoreError> {
        if let Some(username) = update.username.as_mut() {
            *username = username.trim().to_string();
        }
        if let Some(email) = update.email.as_mut() {
            *email = email.trim().to_lowercase();
        }

        let mut user = self.repo.fetch_by_id(id).await?.ok_or(StoreError::NotFound)?;

        let mut errors = validate::validate_update(&update);
        if let Some(username) = &update.username {
            if *username != user.username {
                if let Some(existing) = self.repo.fetch_by_username(username).await? {
                    if existing.id != id {
                        errors.add("username", duplicate_message("username"));
                    }
                }
            }
        }
        if let Some(email) = &update.email {
            if *email != user.email {
                if let Some(existing) = self.repo.fetch_by_email(email).await? {
                    if existing.id != id {
                        errors.add("email", duplicate_message("email"));
                    }
                }
            }
        }
        errors.into_result().map_err(StoreError::Validation)?;

        if let Some(username) = update.username {
            user.username = username;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(profile) = update.profile {
            user.profile = Some(profile);
        }
        if let Some(preferences) = update.preferences {
            user.preferences = preferences;
        }
        if let Some(mhp) = update.mental_health_profile {
            user.mental_health_profile = Some(mhp);
        }
        if let Some(plain) = update.password {
            user.password_hash = Some(hash_blocking(plain).await?);
            debug!(user_id = %id, "password re-hashed");
        }
        user.updated_at = OffsetDateTime::now_utc();
        self.repo.update(&user).await?;

        Ok(PublicProfile::from(&user))
    }

    pub async fn record_login(&self, id: Uuid) -> Result<(), StoreError> {
        let mut user = self.repo.fetch_by_id(id).await?.ok_or(StoreError::NotFound)?;
        let now = OffsetDateTime::now_utc();
        user.last_login = Some(now);
        user.updated_at = now;
        self.repo.update(&user).await?;
        Ok(())
    }

    /// Soft delete: accounts are deactivated, never removed.
    pub async fn deactivate(&self, id: Uuid) -> Result<(), StoreError> {
        let mut user = self.repo.fetch_by_id(id).await?.ok_or(StoreError::NotFound)?;
        user.is_active = false;
        user.updated_at = OffsetDateTime::now_utc();
        self.repo.update(&user).await?;
        info!(user_id = %id, "user deactivated");
        Ok(())
    }

    /// Stores a fresh single-use verification token on the record and
    /// returns it for delivery.
    pub async fn issue_email_verification(&self, id: Uuid) -> Result<String, StoreError> {
        let mut user = self.repo.fetch_by_id(id).await?.ok_or(StoreError::NotFound)?;
        let token = one_shot_token();
        let now = OffsetDateTime::now_utc();
        user.email_verification_token = Some(token.clone());
        user.email_verification_expires = Some(now + VERIFICATION_TOKEN_TTL);
        user.updated_at = now;
        self.repo.update(&user).await?;
        Ok(token)
    }

    /// Consumes a verification token: unknown or expired tokens are
    /// `NotFound`, a valid one marks the email verified and is cleared.
    pub async fn verify_email(&self, token: &str) -> Result<PublicProfile, StoreError> {
        let mut user = self
            .repo
            .fetch_by_verification_token(token)
            .await?
            .ok_or(StoreError::NotFound)?;
        let now = OffsetDateTime::now_utc();
        if !user.email_verification_expires.is_some_and(|exp| exp > now) {
            return Err(StoreError::NotFound);
        }
        user.is_email_verified = true;
        user.email_verification_token = None;
        user.email_verification_expires = None;
        user.updated_at = now;
        self.repo.update(&user).await?;
        info!(user_id = %user.id, "email verified");
        Ok(PublicProfile::from(&user))
    }

    pub async fn issue_password_reset(&self, email: &str) -> Result<String, StoreError> {
        let email = email.trim().to_lowercase();
        let mut user = self
            .repo
            .fetch_by_email(&email)
            .await?
            .ok_or(StoreError::NotFound)?;
        let token = one_shot_token();
        let now = OffsetDateTime::now_utc();
        user.password_reset_token = Some(token.clone());
        user.password_reset_expires = Some(now + RESET_TOKEN_TTL);
        user.updated_at = now;
        self.repo.update(&user).await?;
        Ok(token)
    }

    /// Consumes a reset token and replaces the password. The new
    /// plaintext goes through the same validation as registration.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), StoreError> {
        let mut user = self
            .repo
            .fetch_by_reset_token(token)
            .await?
            .ok_or(StoreError::NotFound)?;
        let now = OffsetDateTime::now_utc();
        if !user.password_reset_expires.is_some_and(|exp| exp > now) {
            return Err(StoreError::NotFound);
        }

        let mut errors = ValidationError::default();
        validate::password_rules(new_password, &mut errors);
        errors.into_result().map_err(StoreError::Validation)?;

        user.password_hash = Some(hash_blocking(new_password.to_string()).await?);
        user.password_reset_token = None;
        user.password_reset_expires = None;
        user.updated_at = now;
        self.repo.update(&user).await?;
        info!(user_id = %user.id, "password reset");
        Ok(())
    }
}

/// bcrypt is CPU-bound; keep it off the request-handling threads.
async fn hash_blocking(plain: String) -> Result<String, StoreError> {
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| StoreError::Backend(anyhow::anyhow!(e)))?
        .map_err(StoreError::Backend)
}
