//! One-shot client for the kv surface.

use super::frame;
use crate::error::{KvError, Result};
use crate::raft::{ClientRequest, ClientResponse};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A `set` waits for commit and apply, which can span several heartbeat
/// rounds and an election; give it room.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Send one client request to a node and await its single response frame.
pub async fn request(addr: &str, request: &ClientRequest) -> Result<ClientResponse> {
    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| KvError::Timeout(format!("connect to {}", addr)))??;

    frame::write_message(&mut stream, request).await?;
    timeout(REPLY_TIMEOUT, frame::read_message(&mut stream))
        .await
        .map_err(|_| KvError::Timeout(format!("reply from {}", addr)))?
}
