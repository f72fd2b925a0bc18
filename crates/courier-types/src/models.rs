use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

pub type UserId = Uuid;
pub type MessageId = Uuid;

/// Placeholder avatar assigned when a user registers without a picture.
pub const DEFAULT_PROFILE_PIC: &str =
    "https://www.shutterstock.com/image-vector/user-profile-icon-vector-avatar-600nw-2247726673.jpg";

/// A registered user as seen by callers.
///
/// The password hash lives only in the storage row type and is never part of
/// this struct, so rendering a `User` cannot leak it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub profile_pic: String,
    pub join_date: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub is_active: bool,
}

/// Public profile projection of a [`User`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub join_date: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            email: user.email,
            join_date: user.join_date,
            last_active: user.last_active,
        }
    }
}

/// A single directed message. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Parse a caller-supplied identifier. The nil UUID is rejected the same as
/// garbage, since no store ever assigns it.
pub fn parse_id(raw: &str, field: &str) -> Result<Uuid, StoreError> {
    match raw.trim().parse::<Uuid>() {
        Ok(id) if !id.is_nil() => Ok(id),
        _ => Err(StoreError::Validation(format!("{field} is not a valid identifier"))),
    }
}
