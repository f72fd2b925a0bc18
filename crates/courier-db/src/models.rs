//! Database row types. These map directly to SQLite rows and are kept apart
//! from the courier-types models so the password hash never leaves this crate
//! by accident.

use anyhow::{Context, Result};
use uuid::Uuid;

use courier_types::{Message, User};

use crate::parse_timestamp;

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    /// PHC-format Argon2 hash.
    pub password: String,
    pub profile_pic: String,
    pub join_date: String,
    pub last_active: String,
    pub is_active: bool,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub timestamp: String,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid(&row.id, "user id")?,
            join_date: parse_timestamp(&row.join_date)?,
            last_active: parse_timestamp(&row.last_active)?,
            name: row.name,
            email: row.email,
            profile_pic: row.profile_pic,
            is_active: row.is_active,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: parse_uuid(&row.id, "message id")?,
            sender_id: parse_uuid(&row.sender_id, "sender_id")?,
            receiver_id: parse_uuid(&row.receiver_id, "receiver_id")?,
            timestamp: parse_timestamp(&row.timestamp)?,
            content: row.content,
        })
    }
}

pub fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("Corrupt {} '{}'", what, raw))
}
