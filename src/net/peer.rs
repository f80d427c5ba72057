//! Outbound peer RPC workers.
//!
//! The consensus core hands each outbound RPC to this dispatcher over a
//! non-blocking channel and moves on. One short-lived task per send opens
//! a connection, writes the request frame, reads one response frame, and
//! re-enters the response onto the inbound queue as an ordinary command.
//! Connect failures and timeouts drop the send silently; replication
//! retries on the next heartbeat tick.

use super::frame;
use crate::error::{KvError, Result};
use crate::raft::{OutboundRpc, PeerRequest, PeerResponse, RaftCommand};
use crate::types::{LogIndex, NodeId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(250);
const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Dispatch outbound RPCs until the core drops its sender.
pub async fn run_outbound(
    mut outbound: mpsc::UnboundedReceiver<OutboundRpc>,
    peers: HashMap<NodeId, String>,
    inbound: mpsc::UnboundedSender<RaftCommand>,
) {
    while let Some(rpc) = outbound.recv().await {
        let Some(addr) = peers.get(&rpc.target).cloned() else {
            warn!(target = rpc.target, "no address for peer");
            continue;
        };
        let inbound = inbound.clone();
        tokio::spawn(async move {
            let target = rpc.target;
            if let Err(e) = send_one(rpc, &addr, inbound).await {
                debug!(target, addr = %addr, error = %e, "peer rpc dropped");
            }
        });
    }
}

async fn send_one(
    rpc: OutboundRpc,
    addr: &str,
    inbound: mpsc::UnboundedSender<RaftCommand>,
) -> Result<()> {
    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| KvError::Timeout(format!("connect to {}", addr)))??;

    frame::write_message(&mut stream, &rpc.request).await?;
    let response: PeerResponse = timeout(REPLY_TIMEOUT, frame::read_message(&mut stream))
        .await
        .map_err(|_| KvError::Timeout(format!("reply from {}", addr)))??;

    let command = match (rpc.request, response) {
        (PeerRequest::Vote(_), PeerResponse::Vote(response)) => RaftCommand::VoteReply {
            from: rpc.target,
            response,
        },
        (PeerRequest::Append(request), PeerResponse::Append(response)) => {
            // This send covered the log through prev + len(entries).
            let ack_index = request.prev_log_index + request.entries.len() as LogIndex;
            RaftCommand::AppendReply {
                from: rpc.target,
                response,
                ack_index,
            }
        }
        _ => {
            return Err(KvError::Malformed(
                "response kind does not match request".into(),
            ))
        }
    };

    inbound.send(command).map_err(|_| KvError::Shutdown)?;
    Ok(())
}
