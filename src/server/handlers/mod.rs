pub mod chat;
pub mod chats;
pub mod documents;
pub mod health;
