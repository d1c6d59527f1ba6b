use anyhow::Context;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::model::{MentalHealthProfile, Preferences, Profile, User};
use crate::users::repo::{RepoError, UserRepo};

const USER_COLUMNS: &str = "id, username, email, password_hash, profile, preferences, \
     mental_health_profile, is_active, is_email_verified, last_login, \
     password_reset_token, password_reset_expires, \
     email_verification_token, email_verification_expires, \
     created_at, updated_at";

/// Postgres-backed user repository. Nested sub-records live in JSONB
/// columns; uniqueness is enforced by the unique indexes on `username`
/// and `email`.
#[derive(Clone)]
pub struct PgUserRepo {
    pool: PgPool,
}

impl PgUserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_text_column(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<User>, RepoError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .context("fetch user")?;
        Ok(row.map(User::from))
    }
}

/// Row shape as stored; converted to the domain `User` on read.
#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    profile: Option<Json<Profile>>,
    preferences: Json<Preferences>,
    mental_health_profile: Option<Json<MentalHealthProfile>>,
    is_active: bool,
    is_email_verified: bool,
    last_login: Option<OffsetDateTime>,
    password_reset_token: Option<String>,
    password_reset_expires: Option<OffsetDateTime>,
    email_verification_token: Option<String>,
    email_verification_expires: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: Some(row.password_hash),
            profile: row.profile.map(|j| j.0),
            preferences: row.preferences.0,
            mental_health_profile: row.mental_health_profile.map(|j| j.0),
            is_active: row.is_active,
            is_email_verified: row.is_email_verified,
            last_login: row.last_login,
            password_reset_token: row.password_reset_token,
            password_reset_expires: row.password_reset_expires,
            email_verification_token: row.email_verification_token,
            email_verification_expires: row.email_verification_expires,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn map_write_error(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let constraint = db.constraint().unwrap_or_default();
            if constraint.contains("username") {
                return RepoError::Duplicate("username");
            }
            if constraint.contains("email") {
                return RepoError::Duplicate("email");
            }
        }
    }
    RepoError::Backend(anyhow::Error::new(e).context("write user"))
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn insert(&self, user: &User) -> Result<(), RepoError> {
        let hash = user
            .password_hash
            .as_deref()
            .ok_or_else(|| RepoError::Backend(anyhow::anyhow!("password hash missing on insert")))?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, email, password_hash, profile, preferences,
                mental_health_profile, is_active, is_email_verified, last_login,
                password_reset_token, password_reset_expires,
                email_verification_token, email_verification_expires,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(hash)
        .bind(user.profile.as_ref().map(Json))
        .bind(Json(&user.preferences))
        .bind(user.mental_health_profile.as_ref().map(Json))
        .bind(user.is_active)
        .bind(user.is_email_verified)
        .bind(user.last_login)
        .bind(user.password_reset_token.as_deref())
        .bind(user.password_reset_expires)
        .bind(user.email_verification_token.as_deref())
        .bind(user.email_verification_expires)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch user")?;
        Ok(row.map(User::from))
    }

    async fn fetch_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        self.fetch_by_text_column("email", email).await
    }

    async fn fetch_by_username(&self, username: &str) -> Result<Option<User>, RepoError> {
        self.fetch_by_text_column("username", username).await
    }

    async fn fetch_by_reset_token(&self, token: &str) -> Result<Option<User>, RepoError> {
        self.fetch_by_text_column("password_reset_token", token).await
    }

    async fn fetch_by_verification_token(&self, token: &str) -> Result<Option<User>, RepoError> {
        self.fetch_by_text_column("email_verification_token", token).await
    }

    async fn update(&self, user: &User) -> Result<(), RepoError> {
        let hash = user
            .password_hash
            .as_deref()
            .ok_or_else(|| RepoError::Backend(anyhow::anyhow!("password hash missing on update")))?;

        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = $2,
                email = $3,
                password_hash = $4,
                profile = $5,
                preferences = $6,
                mental_health_profile = $7,
                is_active = $8,
                is_email_verified = $9,
                last_login = $10,
                password_reset_token = $11,
                password_reset_expires = $12,
                email_verification_token = $13,
                email_verification_expires = $14,
                updated_at = $15
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(hash)
        .bind(user.profile.as_ref().map(Json))
        .bind(Json(&user.preferences))
        .bind(user.mental_health_profile.as_ref().map(Json))
        .bind(user.is_active)
        .bind(user.is_email_verified)
        .bind(user.last_login)
        .bind(user.password_reset_token.as_deref())
        .bind(user.password_reset_expires)
        .bind(user.email_verification_token.as_deref())
        .bind(user.email_verification_expires)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::Backend(anyhow::anyhow!(
                "user {} does not exist",
                user.id
            )));
        }
        Ok(())
    }
}
