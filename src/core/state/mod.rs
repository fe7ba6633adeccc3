// src/core/state/mod.rs

//! Defines the central `ServerState` struct and the statistics it carries.

mod core;
mod stats;

pub use core::ServerState;
pub use stats::StatsState;
