use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                   // unique user ID
    pub name: String,               // display name
    pub email: String,              // normalised login email
    #[serde(skip_serializing)]
    pub password_hash: String,      // Argon2 hash, not exposed in JSON
    pub active: bool,               // only active users may log in
    pub created_at: OffsetDateTime, // creation timestamp
    pub updated_at: OffsetDateTime, // last modification timestamp
}

impl User {
    /// New active account with a fresh id and both timestamps set to now.
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
