#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Ludo Stacked Server
//!
//! Real-time multiplayer session core for a stacked Ludo variant:
//! authenticated WebSocket connections, room lifecycle, and a deterministic
//! rules engine with stack semantics.

/// Bearer-token validation against the identity provider
pub mod auth;

/// Typed key-value cache adapter (in-memory backed)
pub mod cache;

/// Server configuration and environment variables
pub mod config;

/// Pure rules engine for the Ludo variant
pub mod engine;

/// Structured logging configuration
pub mod logging;

/// Distributed presence counters
pub mod presence;

/// WebSocket message protocol definitions
pub mod protocol;

/// Room and seat persistence (in-memory implementation)
pub mod repository;

/// Main server orchestration
pub mod server;

/// WebSocket connection handling
pub mod websocket;
