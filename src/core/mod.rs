pub mod chat;
pub mod chat_stream;
pub mod config;
pub mod history;
pub mod message;
pub mod transcript;
