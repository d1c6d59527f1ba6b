use lazy_static::lazy_static;
use regex::Regex;

use crate::users::error::ValidationError;
use crate::users::model::{NewUser, Preferences, Profile, UserUpdate};

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref REMINDER_TIME_RE: Regex = Regex::new(r"^([01]?\d|2[0-3]):[0-5]\d$").unwrap();
}

pub(crate) fn username_rules(username: &str, errors: &mut ValidationError) {
    let len = username.chars().count();
    if len < 3 {
        errors.add("username", "Username must be at least 3 characters");
    }
    if len > 20 {
        errors.add("username", "Username cannot exceed 20 characters");
    }
    if !USERNAME_RE.is_match(username) {
        errors.add(
            "username",
            "Username can only contain letters, numbers, and underscores",
        );
    }
}

pub(crate) fn email_rules(email: &str, errors: &mut ValidationError) {
    if !EMAIL_RE.is_match(email) {
        errors.add("email", "Please enter a valid email");
    }
}

pub(crate) fn password_rules(password: &str, errors: &mut ValidationError) {
    if password.chars().count() < 6 {
        errors.add("password", "Password must be at least 6 characters");
    }
}

pub(crate) fn profile_rules(profile: &Profile, errors: &mut ValidationError) {
    if let Some(first) = &profile.first_name {
        if first.chars().count() > 50 {
            errors.add("profile.first_name", "First name cannot exceed 50 characters");
        }
    }
    if let Some(last) = &profile.last_name {
        if last.chars().count() > 50 {
            errors.add("profile.last_name", "Last name cannot exceed 50 characters");
        }
    }
    if let Some(age) = profile.age {
        if age < 13 {
            errors.add("profile.age", "Must be at least 13 years old");
        }
        if age > 120 {
            errors.add("profile.age", "Age cannot exceed 120");
        }
    }
    if let Some(bio) = &profile.bio {
        if bio.chars().count() > 500 {
            errors.add("profile.bio", "Bio cannot exceed 500 characters");
        }
    }
}

pub(crate) fn preference_rules(preferences: &Preferences, errors: &mut ValidationError) {
    if !REMINDER_TIME_RE.is_match(&preferences.reminder_time) {
        errors.add("preferences.reminder_time", "Invalid time format");
    }
}

/// Checks every field constraint of a registration candidate, collecting
/// all violations. Uniqueness is checked separately by the store since it
/// needs the repository.
pub(crate) fn validate_new_user(candidate: &NewUser) -> ValidationError {
    let mut errors = ValidationError::default();
    username_rules(&candidate.username, &mut errors);
    email_rules(&candidate.email, &mut errors);
    password_rules(&candidate.password, &mut errors);
    if let Some(profile) = &candidate.profile {
        profile_rules(profile, &mut errors);
    }
    if let Some(preferences) = &candidate.preferences {
        preference_rules(preferences, &mut errors);
    }
    errors
}

/// Re-validates only the fields present in a partial update.
pub(crate) fn validate_update(update: &UserUpdate) -> ValidationError {
    let mut errors = ValidationError::default();
    if let Some(username) = &update.username {
        username_rules(username, &mut errors);
    }
    if let Some(email) = &update.email {
        email_rules(email, &mut errors);
    }
    if let Some(password) = &update.password {
        password_rules(password, &mut errors);
    }
    if let Some(profile) = &update.profile {
        profile_rules(profile, &mut errors);
    }
    if let Some(preferences) = &update.preferences {
        preference_rules(preferences, &mut errors);
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> NewUser {
        NewUser {
            username: "sam_w".to_string(),
            email: "sam@example.com".to_string(),
            password: "hunter2secret".to_string(),
            profile: None,
            preferences: None,
            mental_health_profile: None,
        }
    }

    #[test]
    fn valid_candidate_passes() {
        assert!(validate_new_user(&candidate()).is_empty());
    }

    #[test]
    fn every_violation_is_reported() {
        let bad = NewUser {
            username: "a!".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            ..candidate()
        };
        let errors = validate_new_user(&bad);
        assert!(errors.has_field("username"));
        assert!(errors.has_field("email"));
        assert!(errors.has_field("password"));
        // "a!" is both too short and contains an invalid character
        assert_eq!(errors.errors.len(), 4);
    }

    #[test]
    fn username_boundaries() {
        let mut errors = ValidationError::default();
        username_rules("abc", &mut errors);
        username_rules("a2345678901234567890", &mut errors);
        assert!(errors.is_empty());

        let mut errors = ValidationError::default();
        username_rules("a23456789012345678901", &mut errors);
        assert!(errors.has_field("username"));

        let mut errors = ValidationError::default();
        username_rules("has space", &mut errors);
        assert!(errors.has_field("username"));
    }

    #[test]
    fn profile_bounds_are_enforced() {
        let profile = Profile {
            first_name: Some("x".repeat(51)),
            last_name: Some("y".repeat(51)),
            age: Some(12),
            bio: Some("z".repeat(501)),
            ..Profile::default()
        };
        let mut errors = ValidationError::default();
        profile_rules(&profile, &mut errors);
        assert!(errors.has_field("profile.first_name"));
        assert!(errors.has_field("profile.last_name"));
        assert!(errors.has_field("profile.age"));
        assert!(errors.has_field("profile.bio"));

        let mut errors = ValidationError::default();
        profile_rules(
            &Profile {
                age: Some(121),
                ..Profile::default()
            },
            &mut errors,
        );
        assert!(errors.has_field("profile.age"));

        let mut errors = ValidationError::default();
        profile_rules(
            &Profile {
                age: Some(13),
                ..Profile::default()
            },
            &mut errors,
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn reminder_time_format() {
        for ok in ["00:00", "7:05", "20:00", "23:59"] {
            let mut errors = ValidationError::default();
            preference_rules(
                &Preferences {
                    reminder_time: ok.to_string(),
                    ..Preferences::default()
                },
                &mut errors,
            );
            assert!(errors.is_empty(), "{ok} should be accepted");
        }
        for bad in ["24:00", "12:60", "noon", "9", "09:5"] {
            let mut errors = ValidationError::default();
            preference_rules(
                &Preferences {
                    reminder_time: bad.to_string(),
                    ..Preferences::default()
                },
                &mut errors,
            );
            assert!(errors.has_field("preferences.reminder_time"), "{bad} should be rejected");
        }
    }

    #[test]
    fn update_only_checks_present_fields() {
        assert!(validate_update(&UserUpdate::default()).is_empty());

        let update = UserUpdate {
            email: Some("broken".to_string()),
            ..UserUpdate::default()
        };
        let errors = validate_update(&update);
        assert!(errors.has_field("email"));
        assert_eq!(errors.errors.len(), 1);
    }
}
