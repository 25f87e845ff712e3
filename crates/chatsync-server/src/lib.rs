//! HTTP/JSON storage server for chatsync clients.
//!
//! Exposes named blobs, conversation aggregates, the LLM registry, usage
//! metrics and workspace associations over REST. Every response uses the
//! `{success, data | error}` envelope. This crate contains the server
//! configuration, API schema types, error handling, and route definitions.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod schema;
pub mod service;
pub mod state;
