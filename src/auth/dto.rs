use serde::{Deserialize, Serialize};

/// Request body for login. The identifier is an email or a username.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

/// Request body for starting a password reset.
#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Request body for completing a password reset.
#[derive(Debug, Deserialize)]
pub struct CompleteResetRequest {
    pub token: String,
    pub password: String,
}

/// Request body for consuming an email verification token.
#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Plain user-facing message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
