//! WebSocket endpoint: socket acceptance, the auth handshake with its
//! deadline, frame decoding, and the outbound pump.

mod connection;
mod routes;
mod sending;

pub use routes::{create_router, run_server};
