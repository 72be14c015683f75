// src/utils/mod.rs

pub mod crypto;
pub mod performance;

pub use crypto::{preview_key, KeySealer, SecretSealer};
pub use performance::OperationTimer;
