//! Identity, message and chat-list stores for courier, plus the axum
//! handlers that expose them over HTTP.

pub mod assets;
pub mod chat_list;
pub mod error;
pub mod identity;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod token;

pub use chat_list::ChatListAggregator;
pub use identity::IdentityStore;
pub use messages::MessageStore;
pub use token::{SessionToken, TokenIssuer};
