use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Who may see a user's tracking data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    #[default]
    Private,
    Anonymous,
    Public,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Anxiety,
    Depression,
    Bipolar,
    Ptsd,
    Ocd,
    Other,
}

/// Optional personal details shown on the user's profile page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub timezone: String,
    pub bio: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            first_name: None,
            last_name: None,
            age: None,
            timezone: "UTC".to_string(),
            bio: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notifications {
    pub email: bool,
    pub push: bool,
    pub daily_reminder: bool,
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            email: true,
            push: true,
            daily_reminder: true,
        }
    }
}

/// App preferences, all defaulted so a fresh account works without setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// "HH:MM", 24-hour clock.
    pub reminder_time: String,
    pub notifications: Notifications,
    pub privacy_level: PrivacyLevel,
    pub theme: Theme,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            reminder_time: "20:00".to_string(),
            notifications: Notifications::default(),
            privacy_level: PrivacyLevel::default(),
            theme: Theme::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    pub relationship: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisResource {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub available_24_7: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MentalHealthProfile {
    pub conditions: Vec<Condition>,
    pub therapist_name: Option<String>,
    pub medications: Vec<Medication>,
    pub emergency_contact: Option<EmergencyContact>,
    pub crisis_resources: Vec<CrisisResource>,
}

/// Full user record as held by the store.
///
/// `password_hash` is `None` when the record was loaded through a
/// redacting lookup; only `find_by_email_or_username` returns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub profile: Option<Profile>,
    pub preferences: Preferences,
    pub mental_health_profile: Option<MentalHealthProfile>,
    pub is_active: bool,
    pub is_email_verified: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub email_verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub email_verification_expires: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// "First Last" when both names are set, username otherwise.
    /// Computed on read, never persisted.
    pub fn full_name(&self) -> String {
        if let Some(profile) = &self.profile {
            if let (Some(first), Some(last)) =
                (profile.first_name.as_deref(), profile.last_name.as_deref())
            {
                return format!("{first} {last}");
            }
        }
        self.username.clone()
    }

    /// Same record with the password hash stripped.
    pub fn redacted(mut self) -> Self {
        self.password_hash = None;
        self
    }
}

/// Externally safe projection of a user: secrets stripped, `full_name`
/// included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub profile: Option<Profile>,
    pub preferences: Preferences,
    pub mental_health_profile: Option<MentalHealthProfile>,
    pub is_active: bool,
    pub is_email_verified: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for PublicProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name(),
            profile: user.profile.clone(),
            preferences: user.preferences.clone(),
            mental_health_profile: user.mental_health_profile.clone(),
            is_active: user.is_active,
            is_email_verified: user.is_email_verified,
            last_login: user.last_login,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Candidate input for registration. Password arrives in plaintext and
/// is hashed by the store before anything is persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub preferences: Option<Preferences>,
    #[serde(default)]
    pub mental_health_profile: Option<MentalHealthProfile>,
}

/// Partial update: only set fields are validated and applied. A set
/// `password` is the only thing that triggers a re-hash.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub profile: Option<Profile>,
    pub preferences: Option<Preferences>,
    pub mental_health_profile: Option<MentalHealthProfile>,
}
