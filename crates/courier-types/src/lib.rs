pub mod api;
pub mod error;
pub mod models;

pub use error::StoreError;
pub use models::{Message, MessageId, User, UserId, UserProfile};
