pub mod json;

pub use json::JsonSessionStore;
