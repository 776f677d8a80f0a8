//! Error kinds returned by the credential service and their HTTP mapping.

use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{error, warn};

use crate::auth::repo::StoreError;

/// Shared by "no such active user" and "wrong password".
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Validation failed")]
    InvalidFields(BTreeMap<String, String>),
    #[error("{}", INVALID_CREDENTIALS)]
    Unauthorized,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("User not found")]
    NotFound,
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => {
                AuthError::Validation("Email is already registered".into())
            }
            StoreError::Backend(e) => AuthError::Internal(e.context("user store")),
        }
    }
}

// Unparsable or wrongly typed bodies get the same 400 shape as field errors.
impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AuthError::Internal(e) => error!(error = ?e, "unhandled error"),
            AuthError::InvalidFields(fields) => warn!(?fields, "request validation failed"),
            other => warn!(%status, message = %other, "request rejected"),
        }

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let mut body = json!({
            "timestamp": timestamp,
            "status": status.as_u16(),
            "message": self.to_string(),
        });
        if let AuthError::InvalidFields(fields) = &self {
            body["errors"] = json!(fields);
        }
        (status, Json(body)).into_response()
    }
}
