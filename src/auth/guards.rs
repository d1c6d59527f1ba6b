use tracing::error;
use uuid::Uuid;

use crate::users::{error::StoreError, model::User, store::CredentialStore};

/// Where a denied request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    Login,
    Dashboard,
    VerifyEmail,
}

impl RedirectTarget {
    pub fn path(self) -> &'static str {
        match self {
            RedirectTarget::Login => "/auth/login",
            RedirectTarget::Dashboard => "/dashboard",
            RedirectTarget::VerifyEmail => "/auth/verify-email",
        }
    }
}

/// Outcome of a guard: let the request through, or bounce it with an
/// optional one-shot message. `clear_session` tells the caller the
/// session referenced a user that no longer exists or is inactive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny {
        redirect: RedirectTarget,
        flash: Option<String>,
        clear_session: bool,
    },
}

impl Decision {
    fn deny(redirect: RedirectTarget, flash: &str) -> Self {
        Decision::Deny {
            redirect,
            flash: Some(flash.to_string()),
            clear_session: false,
        }
    }
}

/// Full authentication check: the session must name a user, and that
/// user must still exist and be active. Any store failure is absorbed
/// into a deny; guards never surface errors to the hosting layer.
pub async fn require_auth(
    session_user: Option<Uuid>,
    store: &CredentialStore,
) -> (Decision, Option<User>) {
    let Some(user_id) = session_user else {
        return (
            Decision::deny(RedirectTarget::Login, "Login to access this page"),
            None,
        );
    };

    match store.find_by_id(user_id).await {
        Ok(user) if user.is_active => (Decision::Allow, Some(user)),
        Ok(_) | Err(StoreError::NotFound) => (
            Decision::Deny {
                redirect: RedirectTarget::Login,
                flash: Some("User not found or inactive".to_string()),
                clear_session: true,
            },
            None,
        ),
        Err(e) => {
            error!(error = %e, %user_id, "authentication error");
            (
                Decision::deny(RedirectTarget::Login, "An error occurred while authenticating"),
                None,
            )
        }
    }
}

/// Keeps already-logged-in users away from the login and registration
/// pages. Deliberately checks session presence only: a stale session is
/// cleaned up by `require_auth` on the very next protected page, so a
/// store round-trip here would buy nothing.
pub fn redirect_if_authenticated(session_user: Option<Uuid>) -> Decision {
    if session_user.is_some() {
        Decision::Deny {
            redirect: RedirectTarget::Dashboard,
            flash: None,
            clear_session: false,
        }
    } else {
        Decision::Allow
    }
}

/// Runs after `require_auth` has resolved the user.
pub fn require_email_verification(user: &User) -> Decision {
    if user.is_email_verified {
        Decision::Allow
    } else {
        Decision::deny(
            RedirectTarget::VerifyEmail,
            "Please verify your email to access this page",
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::users::model::NewUser;
    use crate::users::repo_memory::InMemoryUserRepo;

    async fn store_with_user(active: bool, verified: bool) -> (CredentialStore, Uuid) {
        let store = CredentialStore::new(Arc::new(InMemoryUserRepo::new()));
        let created = store
            .create(NewUser {
                username: "sam_w".to_string(),
                email: "sam@example.com".to_string(),
                password: "hunter2secret".to_string(),
                profile: None,
                preferences: None,
                mental_health_profile: None,
            })
            .await
            .unwrap();
        if verified {
            let token = store.issue_email_verification(created.id).await.unwrap();
            store.verify_email(&token).await.unwrap();
        }
        if !active {
            store.deactivate(created.id).await.unwrap();
        }
        (store, created.id)
    }

    #[tokio::test]
    async fn missing_session_user_denies_to_login() {
        let (store, _) = store_with_user(true, false).await;
        let (decision, user) = require_auth(None, &store).await;
        assert!(user.is_none());
        assert_eq!(
            decision,
            Decision::Deny {
                redirect: RedirectTarget::Login,
                flash: Some("Login to access this page".to_string()),
                clear_session: false,
            }
        );
    }

    #[tokio::test]
    async fn unknown_user_denies_and_clears_session() {
        let (store, _) = store_with_user(true, false).await;
        let (decision, user) = require_auth(Some(Uuid::new_v4()), &store).await;
        assert!(user.is_none());
        assert_eq!(
            decision,
            Decision::Deny {
                redirect: RedirectTarget::Login,
                flash: Some("User not found or inactive".to_string()),
                clear_session: true,
            }
        );
    }

    #[tokio::test]
    async fn inactive_user_denies_and_clears_session() {
        let (store, id) = store_with_user(false, true).await;
        let (decision, user) = require_auth(Some(id), &store).await;
        assert!(user.is_none());
        assert!(matches!(
            decision,
            Decision::Deny {
                redirect: RedirectTarget::Login,
                clear_session: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn active_user_is_allowed_and_attached() {
        let (store, id) = store_with_user(true, false).await;
        let (decision, user) = require_auth(Some(id), &store).await;
        assert_eq!(decision, Decision::Allow);
        let user = user.expect("user attached on allow");
        assert_eq!(user.id, id);
        // resolved through the redacting lookup
        assert!(user.password_hash.is_none());
    }

    #[tokio::test]
    async fn unverified_user_passes_auth_but_not_verification() {
        let (store, id) = store_with_user(true, false).await;
        let (decision, user) = require_auth(Some(id), &store).await;
        assert_eq!(decision, Decision::Allow);
        let user = user.unwrap();
        assert_eq!(
            require_email_verification(&user),
            Decision::Deny {
                redirect: RedirectTarget::VerifyEmail,
                flash: Some("Please verify your email to access this page".to_string()),
                clear_session: false,
            }
        );
    }

    #[tokio::test]
    async fn verified_user_passes_both_guards() {
        let (store, id) = store_with_user(true, true).await;
        let (decision, user) = require_auth(Some(id), &store).await;
        assert_eq!(decision, Decision::Allow);
        assert_eq!(require_email_verification(&user.unwrap()), Decision::Allow);
    }

    #[test]
    fn redirect_if_authenticated_checks_presence_only() {
        assert_eq!(redirect_if_authenticated(None), Decision::Allow);
        assert_eq!(
            redirect_if_authenticated(Some(Uuid::new_v4())),
            Decision::Deny {
                redirect: RedirectTarget::Dashboard,
                flash: None,
                clear_session: false,
            }
        );
    }

    #[test]
    fn redirect_targets_map_to_routes() {
        assert_eq!(RedirectTarget::Login.path(), "/auth/login");
        assert_eq!(RedirectTarget::Dashboard.path(), "/dashboard");
        assert_eq!(RedirectTarget::VerifyEmail.path(), "/auth/verify-email");
    }
}
