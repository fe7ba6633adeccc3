// src/core/protocol/mod.rs

//! The JSON wire protocol spoken by producers and consumers.
//!
//! Every frame is one JSON object. Over TCP a frame is one line; over
//! WebSocket it is one text message.

pub mod client_message;
pub mod server_message;

pub use client_message::ClientMessage;
pub use server_message::{ServerMessage, Status};
