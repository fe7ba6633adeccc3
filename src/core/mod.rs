// src/core/mod.rs

//! The central module containing the relay's core logic and data structures.

pub mod accounts;
pub mod errors;
pub mod handler;
pub mod metrics;
pub mod protocol;
pub mod relay;
pub mod state;

pub use errors::RelayError;
