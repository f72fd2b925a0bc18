use std::collections::HashSet;
use std::sync::Arc;

use courier_db::Database;
use courier_types::models::parse_id;
use courier_types::{StoreError, UserId};

/// Derives a user's chat list from the message table.
pub struct ChatListAggregator {
    db: Arc<Database>,
}

impl ChatListAggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Everyone the user has sent to or received from, each once.
    pub fn get_chat_list(&self, user_id: &str) -> Result<HashSet<UserId>, StoreError> {
        let user_id = parse_id(user_id, "user_id")?.to_string();

        let mut peers: HashSet<UserId> = self
            .db
            .distinct_receivers_of(&user_id)
            .map_err(StoreError::storage)?
            .into_iter()
            .collect();

        // The two distinct queries overlap whenever a conversation goes both ways.
        peers.extend(self.db.distinct_senders_to(&user_id).map_err(StoreError::storage)?);

        Ok(peers)
    }
}
