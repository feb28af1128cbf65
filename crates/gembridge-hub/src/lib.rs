//! # GemBridge Hub
//!
//! Concrete backends for the session engine: the Gemini provider, the
//! WhatsApp bridge channel, file-backed session storage, and the idle
//! session sweeper.

pub mod channels;
pub mod providers;
pub mod store;
pub mod sweep;
