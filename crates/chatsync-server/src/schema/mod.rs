//! Request and response types for every endpoint, grouped by domain.

pub mod chats;
pub mod common;
pub mod llms;
pub mod metrics;
pub mod stores;
pub mod workspace;
