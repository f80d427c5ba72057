//! Command-line interface for raftkv.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// raftkv - a replicated key-value store on Raft consensus.
#[derive(Parser)]
#[command(name = "raftkv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RAFTKV_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Start a raftkv server node
    Server {
        /// Configuration file path
        #[arg(short, long, env = "RAFTKV_CONFIG")]
        config: PathBuf,
    },

    /// Store a value through the cluster leader
    Set {
        /// Client endpoint of any node
        #[arg(short, long, default_value = "127.0.0.1:7001")]
        addr: String,

        key: String,
        value: String,
    },

    /// Read a value from a node's applied state
    Get {
        /// Client endpoint of any node
        #[arg(short, long, default_value = "127.0.0.1:7001")]
        addr: String,

        key: String,
    },

    /// Round-trip a payload through a node
    Echo {
        /// Client endpoint of any node
        #[arg(short, long, default_value = "127.0.0.1:7001")]
        addr: String,

        payload: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
