use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use rand::RngCore;
use uuid::Uuid;

use crate::state::AppState;

pub const SESSION_COOKIE: &str = "mindtrack_sid";

#[derive(Debug, Default)]
struct SessionData {
    user_id: Option<Uuid>,
    flash: Option<String>,
}

/// Per-request session handle. The guards only ever read `user_id` and
/// write a one-shot flash message; everything else about the session
/// lifecycle lives outside the core.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionData>>,
}

impl Session {
    pub fn user_id(&self) -> Option<Uuid> {
        self.lock().user_id
    }

    pub fn log_in(&self, user_id: Uuid) {
        self.lock().user_id = Some(user_id);
    }

    /// Drops the authenticated user, keeping the session itself.
    pub fn clear(&self) {
        self.lock().user_id = None;
    }

    pub fn set_flash(&self, message: impl Into<String>) {
        self.lock().flash = Some(message.into());
    }

    /// Returns and consumes the flash message.
    pub fn take_flash(&self) -> Option<String> {
        self.lock().flash.take()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionData> {
        self.inner.lock().expect("session mutex poisoned")
    }
}

/// In-memory session map keyed by the cookie id.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for a known cookie id, or a fresh session
    /// under a new id.
    pub fn load_or_create(&self, id: Option<&str>) -> (String, Session) {
        let mut sessions = self.sessions.lock().expect("session store mutex poisoned");
        if let Some(id) = id {
            if let Some(session) = sessions.get(id) {
                return (id.to_string(), session.clone());
            }
        }
        let id = new_session_id();
        let session = Session::default();
        sessions.insert(id.clone(), session.clone());
        (id, session)
    }
}

fn new_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn session_cookie_value(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Loads (or creates) the request's session and puts the handle into
/// the request extensions for the guards and handlers downstream.
pub async fn session_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let cookie_id = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_cookie_value);

    let (id, session) = state.sessions.load_or_create(cookie_id.as_deref());
    req.extensions_mut().insert(session);

    let mut res = next.run(req).await;

    if cookie_id.as_deref() != Some(id.as_str()) {
        let cookie = format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            res.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    res
}
