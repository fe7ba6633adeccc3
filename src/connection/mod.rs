// src/connection/mod.rs

//! Manages the lifecycle of a single relay connection: frame reading, action
//! routing, the outbound writer and cleanup on close. The same code serves
//! both the line-delimited TCP listener and the WebSocket listener.

mod guard;
mod handler;
mod session;
mod writer;

pub use guard::ConnectionGuard;
pub use handler::{ConnectionHandler, serve};
pub use session::SessionState;
