//! Core type definitions for raftkv.
//!
//! Raft terms and log indexes are signed 32-bit with `-1` meaning "none":
//! a node that has never seen a term reports `current_term == -1`, and an
//! empty log has `last_index == -1`. Arithmetic on these values must stay
//! in `i32`; do not widen.

/// Unique identifier for a node in the cluster.
pub type NodeId = u16;

/// Raft term number. `-1` means no term has been observed yet.
pub type Term = i32;

/// Raft log position, 0-indexed. `-1` means "before the first entry".
pub type LogIndex = i32;

/// Sentinel shared by [`Term`] and [`LogIndex`]: no term / empty log.
pub const NONE: i32 = -1;
