//! HTTP handler functions, one module per domain.
//!
//! Handlers are thin: they lock the domain store, delegate, and wrap the
//! result in [`crate::schema::common::ApiResponse`].

pub mod chats;
pub mod llms;
pub mod metrics;
pub mod stores;
pub mod workspace;
