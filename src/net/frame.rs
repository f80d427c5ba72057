//! Length-framed message codec.
//!
//! Every message on the wire is one frame: a 4-byte big-endian length
//! prefix followed by a bincode payload. Reading the exact byte count
//! avoids delimiter scanning and partial-message buffering; a length
//! above [`MAX_FRAME_LEN`] is treated as a malformed frame.

use crate::error::{KvError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame's payload.
pub const MAX_FRAME_LEN: u32 = 4 * 1024 * 1024;

/// Write one framed message.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(KvError::Malformed(format!(
            "outbound frame of {} bytes exceeds limit",
            payload.len()
        )));
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(KvError::Malformed(format!(
            "inbound frame of {} bytes exceeds limit",
            len
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    bincode::deserialize(&payload).map_err(|e| KvError::Malformed(e.to_string()))
}
