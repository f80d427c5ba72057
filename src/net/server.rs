//! Peer and client listeners.
//!
//! Each accepted connection carries exactly one request frame. The
//! connection handler parses it, enqueues the matching [`RaftCommand`]
//! with a oneshot reply handle, awaits that handle, writes the single
//! response frame, and closes. The consensus core never sees a socket.

use super::frame;
use crate::error::{KvError, Result};
use crate::raft::{ClientRequest, ClientResponse, PeerRequest, PeerResponse, RaftCommand};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// Accept peer connections (vote/append) until shutdown.
pub async fn serve_peers(
    listener: TcpListener,
    inbound: mpsc::UnboundedSender<RaftCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let inbound = inbound.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_peer_conn(stream, inbound).await {
                                warn!(peer = %addr, error = %e, "dropping peer connection");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "peer accept failed");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Accept client connections (set/get/echo) until shutdown.
pub async fn serve_clients(
    listener: TcpListener,
    inbound: mpsc::UnboundedSender<RaftCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let inbound = inbound.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_client_conn(stream, inbound).await {
                                debug!(client = %addr, error = %e, "dropping client connection");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "client accept failed");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn handle_peer_conn(
    mut stream: TcpStream,
    inbound: mpsc::UnboundedSender<RaftCommand>,
) -> Result<()> {
    let request: PeerRequest = frame::read_message(&mut stream).await?;

    let response = match request {
        PeerRequest::Vote(request) => {
            let (tx, rx) = oneshot::channel();
            inbound
                .send(RaftCommand::Vote { request, reply: tx })
                .map_err(|_| KvError::Shutdown)?;
            PeerResponse::Vote(rx.await.map_err(|_| KvError::Shutdown)?)
        }
        PeerRequest::Append(request) => {
            let (tx, rx) = oneshot::channel();
            inbound
                .send(RaftCommand::Append { request, reply: tx })
                .map_err(|_| KvError::Shutdown)?;
            PeerResponse::Append(rx.await.map_err(|_| KvError::Shutdown)?)
        }
    };

    frame::write_message(&mut stream, &response).await
}

async fn handle_client_conn(
    mut stream: TcpStream,
    inbound: mpsc::UnboundedSender<RaftCommand>,
) -> Result<()> {
    let request: ClientRequest = frame::read_message(&mut stream).await?;

    let response = match request {
        ClientRequest::Set { key, value } => {
            let (tx, rx) = oneshot::channel();
            inbound
                .send(RaftCommand::Set {
                    key,
                    value,
                    reply: tx,
                })
                .map_err(|_| KvError::Shutdown)?;
            let outcome = rx.await.map_err(|_| KvError::Shutdown)?;
            ClientResponse::Set {
                ok: outcome.ok,
                leader_id: outcome.leader_id,
            }
        }
        ClientRequest::Get { key } => {
            let (tx, rx) = oneshot::channel();
            inbound
                .send(RaftCommand::Get { key, reply: tx })
                .map_err(|_| KvError::Shutdown)?;
            let value = rx.await.map_err(|_| KvError::Shutdown)?;
            ClientResponse::Get { ok: true, value }
        }
        ClientRequest::Echo { payload } => {
            let (tx, rx) = oneshot::channel();
            inbound
                .send(RaftCommand::Echo { payload, reply: tx })
                .map_err(|_| KvError::Shutdown)?;
            ClientResponse::Echo {
                payload: rx.await.map_err(|_| KvError::Shutdown)?,
            }
        }
    };

    frame::write_message(&mut stream, &response).await
}
