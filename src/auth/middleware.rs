use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::state::AppState;
use crate::users::model::User;

use super::guards::{self, Decision, RedirectTarget};
use super::session::Session;

/// The user resolved by the `require_auth` guard, attached to the
/// request for downstream handlers. Also usable as an extractor.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or((StatusCode::UNAUTHORIZED, "Not authenticated".to_string()))
    }
}

fn apply_deny(
    session: Option<&Session>,
    redirect: RedirectTarget,
    flash: Option<String>,
    clear_session: bool,
) -> Response {
    if let Some(session) = session {
        if clear_session {
            session.clear();
        }
        if let Some(message) = flash {
            session.set_flash(message);
        }
    }
    Redirect::to(redirect.path()).into_response()
}

/// Route layer for pages that need a logged-in, active user.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let session = req.extensions().get::<Session>().cloned();
    let session_user = session.as_ref().and_then(Session::user_id);

    match guards::require_auth(session_user, &state.users).await {
        (Decision::Allow, Some(user)) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        (Decision::Allow, None) => {
            // require_auth never allows without a user; treat as a deny
            apply_deny(session.as_ref(), RedirectTarget::Login, None, false)
        }
        (
            Decision::Deny {
                redirect,
                flash,
                clear_session,
            },
            _,
        ) => apply_deny(session.as_ref(), redirect, flash, clear_session),
    }
}

/// Route layer for the login and registration pages.
pub async fn redirect_if_authenticated(req: Request, next: Next) -> Response {
    let session_user = req
        .extensions()
        .get::<Session>()
        .and_then(Session::user_id);

    match guards::redirect_if_authenticated(session_user) {
        Decision::Allow => next.run(req).await,
        Decision::Deny { redirect, .. } => Redirect::to(redirect.path()).into_response(),
    }
}

/// Route layer for pages that additionally need a verified email.
/// Must be layered inside `require_auth`; without a resolved user the
/// request is bounced to login.
pub async fn require_email_verification(req: Request, next: Next) -> Response {
    let session = req.extensions().get::<Session>().cloned();
    let Some(CurrentUser(user)) = req.extensions().get::<CurrentUser>().cloned() else {
        return apply_deny(session.as_ref(), RedirectTarget::Login, None, false);
    };

    match guards::require_email_verification(&user) {
        Decision::Allow => next.run(req).await,
        Decision::Deny {
            redirect,
            flash,
            clear_session,
        } => apply_deny(session.as_ref(), redirect, flash, clear_session),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::Preferences;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn some_user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            username: "sam_w".to_string(),
            email: "sam@example.com".to_string(),
            password_hash: None,
            profile: None,
            preferences: Preferences::default(),
            mental_health_profile: None,
            is_active: true,
            is_email_verified: true,
            last_login: None,
            password_reset_token: None,
            password_reset_expires: None,
            email_verification_token: None,
            email_verification_expires: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn extractor_requires_the_guard_to_have_run() {
        let (mut parts, _) = axum::http::Request::builder()
            .body(())
            .unwrap()
            .into_parts();
        let rejected = CurrentUser::from_request_parts(&mut parts, &()).await;
        assert!(matches!(rejected, Err((StatusCode::UNAUTHORIZED, _))));
    }

    #[tokio::test]
    async fn extractor_returns_the_attached_user() {
        let user = some_user();
        let request = axum::http::Request::builder()
            .extension(CurrentUser(user.clone()))
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let extracted = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .expect("extension present");
        assert_eq!(extracted.0.id, user.id);
    }
}
