use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{auth::repo_types::User, error::AuthError};

pub const TOKEN_TYPE: &str = "Bearer";

const NAME_MAX: usize = 100;
const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 128;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed and lower-cased; every lookup and insert goes through this.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Request body for user registration. Missing fields deserialize as empty
/// so `validate` can report them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = BTreeMap::new();
        let name = self.name.trim();
        if name.is_empty() {
            errors.insert("name".into(), "name is required".into());
        } else if name.chars().count() > NAME_MAX {
            errors.insert("name".into(), format!("name must be at most {NAME_MAX} characters"));
        }
        if !is_valid_email(self.email.trim()) {
            errors.insert("email".into(), "must be a valid email address".into());
        }
        let len = self.password.chars().count();
        if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
            errors.insert(
                "password".into(),
                format!("password must be between {PASSWORD_MIN} and {PASSWORD_MAX} characters"),
            );
        }
        if self.password_confirm.is_empty() {
            errors.insert("passwordConfirm".into(), "password confirmation is required".into());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::InvalidFields(errors))
        }
    }
}

/// Request body for login.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        let mut errors = BTreeMap::new();
        if !is_valid_email(self.email.trim()) {
            errors.insert("email".into(), "must be a valid email address".into());
        }
        if self.password.is_empty() {
            errors.insert("password".into(), "password is required".into());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuthError::InvalidFields(errors))
        }
    }
}

/// Response returned after register or login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Public profile; never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            active: u.active,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}
