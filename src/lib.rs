//! Receipt Bot: automated review of payment receipts sent over chat.

pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod receipt;
pub mod replies;
