//! Core types for the chuan rendezvous server
//!
//! Shared by the signaling crate and the server binary:
//! - Room code generation and parsing
//! - Configuration (dotfile, environment, defaults)
//! - Domain error kinds

pub mod code;
pub mod config;
pub mod error;

pub use code::{generate_code, normalize_code, validate_code, CODE_LENGTH};
pub use config::{Config, TurnConfig};
pub use error::SignalError;
