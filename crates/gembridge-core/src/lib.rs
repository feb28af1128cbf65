//! # GemBridge Core
//!
//! Shared types, traits, and the session engine for the GemBridge WhatsApp
//! AI bridge. This crate is the foundation; all other crates depend on it.

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod manager;
pub mod message;
pub mod provider;
pub mod session;
pub mod store;
