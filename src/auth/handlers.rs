use axum::{
    extract::State,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            CompleteResetRequest, LoginRequest, MessageResponse, PasswordResetRequest,
            VerifyEmailRequest,
        },
        middleware as mw,
        middleware::CurrentUser,
        session::Session,
    },
    state::AppState,
    users::{
        error::StoreError,
        model::{NewUser, PublicProfile, UserUpdate},
    },
};

pub fn routes(state: AppState) -> Router<AppState> {
    let entry = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", get(login_page).post(login))
        .route_layer(from_fn(mw::redirect_if_authenticated));

    let open = Router::new()
        .route("/auth/logout", post(logout))
        .route("/auth/verify-email", get(verify_email_page).post(verify_email))
        .route("/auth/request-password-reset", post(request_password_reset))
        .route("/auth/reset-password", post(reset_password));

    let account = Router::new()
        .route("/me", get(get_me).patch(update_me).delete(deactivate_me))
        .route_layer(from_fn_with_state(state.clone(), mw::require_auth));

    let dashboard = Router::new()
        .route("/dashboard", get(dashboard))
        .route_layer(from_fn(mw::require_email_verification))
        .route_layer(from_fn_with_state(state, mw::require_auth));

    entry.merge(open).merge(account).merge(dashboard)
}

fn store_error_response(e: StoreError) -> Response {
    match e {
        StoreError::Validation(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "Validation failed", "details": errors.errors })),
        )
            .into_response(),
        StoreError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Not found" })),
        )
            .into_response(),
        StoreError::Comparison => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid credentials" })),
        )
            .into_response(),
        StoreError::Backend(e) => {
            error!(error = %e, "credential store error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

fn invalid_credentials() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Invalid credentials" })),
    )
        .into_response()
}

#[instrument(skip(state, candidate))]
pub async fn register(
    State(state): State<AppState>,
    Json(candidate): Json<NewUser>,
) -> Result<(StatusCode, Json<PublicProfile>), Response> {
    let created = state
        .users
        .create(candidate)
        .await
        .map_err(store_error_response)?;

    // TODO: deliver the token by email once the mailer lands
    let _token = state
        .users
        .issue_email_verification(created.id)
        .await
        .map_err(store_error_response)?;

    info!(user_id = %created.id, username = %created.username, "user registered");
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state, session, payload))]
pub async fn login(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<PublicProfile>, Response> {
    let user = match state.users.find_by_email_or_username(&payload.identifier).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            warn!(identifier = %payload.identifier, "login unknown identifier");
            return Err(invalid_credentials());
        }
        Err(e) => return Err(store_error_response(e)),
    };

    if !user.is_active {
        warn!(user_id = %user.id, "login for inactive account");
        return Err(invalid_credentials());
    }

    let matched = match state.users.verify_password(&user, &payload.password).await {
        Ok(matched) => matched,
        // a broken stored hash is an authentication failure, details stay in the log
        Err(StoreError::Comparison) => return Err(invalid_credentials()),
        Err(e) => return Err(store_error_response(e)),
    };
    if !matched {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid_credentials());
    }

    state
        .users
        .record_login(user.id)
        .await
        .map_err(store_error_response)?;
    session.log_in(user.id);
    info!(user_id = %user.id, "user logged in");

    // re-read so the response carries the fresh last_login
    let user = state
        .users
        .find_by_id(user.id)
        .await
        .map_err(store_error_response)?;
    Ok(Json(state.users.to_public_profile(&user)))
}

pub async fn login_page(Extension(session): Extension<Session>) -> Json<MessageResponse> {
    let message = session
        .take_flash()
        .unwrap_or_else(|| "Please log in".to_string());
    Json(MessageResponse::new(message))
}

pub async fn logout(Extension(session): Extension<Session>) -> Json<MessageResponse> {
    session.clear();
    Json(MessageResponse::new("Logged out"))
}

pub async fn verify_email_page(Extension(session): Extension<Session>) -> Json<MessageResponse> {
    let message = session
        .take_flash()
        .unwrap_or_else(|| "Check your inbox for a verification link".to_string());
    Json(MessageResponse::new(message))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<PublicProfile>, Response> {
    match state.users.verify_email(&payload.token).await {
        Ok(profile) => Ok(Json(profile)),
        Err(StoreError::NotFound) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid or expired verification token" })),
        )
            .into_response()),
        Err(e) => Err(store_error_response(e)),
    }
}

#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, Response> {
    match state.users.issue_password_reset(&payload.email).await {
        // TODO: deliver the token by email once the mailer lands
        Ok(_token) => info!("password reset issued"),
        // same response for unknown emails, account existence stays private
        Err(StoreError::NotFound) => {
            warn!("password reset requested for unknown email");
        }
        Err(e) => return Err(store_error_response(e)),
    }
    Ok(Json(MessageResponse::new(
        "If that email is registered, a reset link is on its way",
    )))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<CompleteResetRequest>,
) -> Result<Json<MessageResponse>, Response> {
    match state.users.reset_password(&payload.token, &payload.password).await {
        Ok(()) => Ok(Json(MessageResponse::new(
            "Password updated, you can log in now",
        ))),
        Err(StoreError::NotFound) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid or expired reset token" })),
        )
            .into_response()),
        Err(e) => Err(store_error_response(e)),
    }
}

pub async fn get_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<PublicProfile> {
    Json(state.users.to_public_profile(&user))
}

#[instrument(skip(state, user, update), fields(user_id = %user.id))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(update): Json<UserUpdate>,
) -> Result<Json<PublicProfile>, Response> {
    let updated = state
        .users
        .update(user.id, update)
        .await
        .map_err(store_error_response)?;
    Ok(Json(updated))
}

#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn deactivate_me(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MessageResponse>, Response> {
    state
        .users
        .deactivate(user.id)
        .await
        .map_err(store_error_response)?;
    session.clear();
    Ok(Json(MessageResponse::new("Account deactivated")))
}

pub async fn dashboard(CurrentUser(user): CurrentUser) -> Json<MessageResponse> {
    Json(MessageResponse::new(format!(
        "Welcome back, {}",
        user.full_name()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_page_prefers_the_flash_message() {
        let session = Session::default();
        session.set_flash("User not found or inactive");
        let Json(body) = login_page(Extension(session.clone())).await;
        assert_eq!(body.message, "User not found or inactive");

        // flash consumed, fallback afterwards
        let Json(body) = login_page(Extension(session)).await;
        assert_eq!(body.message, "Please log in");
    }

    #[tokio::test]
    async fn logout_clears_the_session() {
        let session = Session::default();
        session.log_in(uuid::Uuid::new_v4());
        logout(Extension(session.clone())).await;
        assert_eq!(session.user_id(), None);
    }
}
