pub mod attachments;
pub mod chat;
pub mod events;
pub mod models;
pub mod modes;
pub mod summary;
pub mod transcript;
