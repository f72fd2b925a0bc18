use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use courier_db::Database;
use courier_types::models::parse_id;
use courier_types::{Message, StoreError};

/// Owns message records: sending and conversation retrieval.
///
/// Sender and receiver ids are not checked against the user table. A message
/// may name a user that does not exist; that is the caller's concern.
pub struct MessageStore {
    db: Arc<Database>,
}

impl MessageStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a message. The timestamp is always the store's own clock.
    pub fn send(&self, sender_id: &str, receiver_id: &str, content: &str) -> Result<Message, StoreError> {
        let sender_id = parse_id(sender_id, "sender_id")?;
        let receiver_id = parse_id(receiver_id, "receiver_id")?;
        if content.is_empty() {
            return Err(StoreError::validation("content is required"));
        }

        let id = Uuid::new_v4();
        let timestamp = self
            .db
            .insert_message(
                &id.to_string(),
                &sender_id.to_string(),
                &receiver_id.to_string(),
                content,
                Utc::now(),
            )
            .map_err(StoreError::storage)?;

        debug!("Message {} stored: {} -> {}", id, sender_id, receiver_id);
        Ok(Message {
            id,
            sender_id,
            receiver_id,
            content: content.to_string(),
            timestamp,
        })
    }

    /// Full history between two users, oldest first. Argument order does not
    /// matter.
    pub fn get_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<Message>, StoreError> {
        let user_a = parse_id(user_a, "sender_id")?;
        let user_b = parse_id(user_b, "receiver_id")?;

        self.db
            .get_conversation(&user_a.to_string(), &user_b.to_string())
            .map_err(StoreError::storage)?
            .into_iter()
            .map(|row| Message::try_from(row).map_err(StoreError::storage))
            .collect()
    }
}
