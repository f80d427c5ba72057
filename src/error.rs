//! Error types for the raftkv replicated store.
//!
//! A single crate-wide error enum [`KvError`] with a [`Result`] alias.
//! The consensus core itself surfaces no errors upward: every failure it
//! sees collapses into a wire-level reply or a silent drop. Only storage
//! and listener-bind failures escape and terminate the process.

use std::io;
use thiserror::Error;

use crate::types::NodeId;

/// Main error type for raftkv operations.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("not the leader; leader is {leader:?}")]
    NotLeader { leader: Option<NodeId> },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("node shutting down")]
    Shutdown,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<bincode::Error> for KvError {
    fn from(e: bincode::Error) -> Self {
        KvError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for KvError {
    fn from(e: serde_json::Error) -> Self {
        KvError::Config(e.to_string())
    }
}

/// Result type alias for raftkv operations.
pub type Result<T> = std::result::Result<T, KvError>;
