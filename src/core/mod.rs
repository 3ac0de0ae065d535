pub mod chat_stream;
pub mod config;
pub mod context;
pub mod conversation;
pub mod demo;
pub mod message;
