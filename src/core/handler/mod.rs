// src/core/handler/mod.rs

pub mod action_router;
