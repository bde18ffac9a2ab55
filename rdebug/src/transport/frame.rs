//! Length-prefixed framing over a byte stream.
//!
//! Every frame is a 4-byte big-endian length followed by exactly that many
//! payload bytes. Structured messages are JSON; the archive travels as a raw
//! frame.

use std::io;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::DeployError;

/// Size of the length prefix
pub const PREFIX_LEN: usize = 4;

/// Default upper bound for an incoming frame
pub const DEFAULT_MAX_FRAME_LEN: u32 = 1024 * 1024 * 1024;

/// Write one raw frame
pub async fn send_data<W>(writer: &mut W, data: &[u8]) -> Result<(), DeployError>
where
    W: AsyncWrite + Unpin,
{
    if data.is_empty() {
        return Err(DeployError::Protocol("refusing to send an empty frame".to_string()));
    }
    let len = u32::try_from(data.len())
        .ok()
        .filter(|len| *len <= i32::MAX as u32)
        .ok_or_else(|| DeployError::Protocol(format!("frame too large: {} bytes", data.len())))?;

    let mut frame = Vec::with_capacity(PREFIX_LEN + data.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(data);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one raw frame, accumulating short reads until it is complete
pub async fn receive_data<R>(reader: &mut R, max_len: u32) -> Result<Vec<u8>, DeployError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    read_frame_part(reader, &mut prefix).await?;

    let len = u32::from_be_bytes(prefix);
    if len == 0 || len > i32::MAX as u32 {
        return Err(DeployError::Protocol(format!("invalid frame length: {}", len as i32)));
    }
    if len > max_len {
        return Err(DeployError::Protocol(format!(
            "frame length {} exceeds limit of {} bytes",
            len, max_len
        )));
    }

    let mut data = vec![0u8; len as usize];
    read_frame_part(reader, &mut data).await?;
    Ok(data)
}

/// Fill `buf` completely; a stream that ends early is a truncated frame
async fn read_frame_part<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), DeployError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(DeployError::Protocol(format!(
            "truncated frame: expected {} bytes",
            buf.len()
        ))),
        Err(e) => Err(e.into()),
    }
}

/// Serialize and write one structured frame
pub async fn send_message<W, T>(writer: &mut W, message: &T) -> Result<(), DeployError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = serde_json::to_vec(message)?;
    send_data(writer, &data).await
}

/// Read and deserialize one structured frame
pub async fn receive_message<R, T>(reader: &mut R, max_len: u32) -> Result<T, DeployError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let data = receive_data(reader, max_len).await?;
    serde_json::from_slice(&data)
        .map_err(|e| DeployError::Protocol(format!("malformed message: {}", e)))
}
