//! Framed TCP transport: listeners, outbound workers, and a one-shot
//! client, all speaking 4-byte length-prefixed bincode frames.

pub mod client;
pub mod frame;
pub mod peer;
pub mod server;
