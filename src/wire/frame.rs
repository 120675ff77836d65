//! Message framing on the socket.
//!
//! Frame format:
//!
//! ```text
//! u32 LE   magic
//! [u8;12]  command, NUL padded
//! u32 LE   payload length
//! [u8;4]   checksum (first 4 bytes of double SHA-256 of the payload)
//! ...      payload
//! ```

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;
use crate::wire::command::Command;
use crate::wire::parse::double_sha256;

pub const HEADER_LEN: usize = 24;

/// Largest payload accepted from a peer (32 MiB, as in Bitcoin Core).
pub const MAX_PAYLOAD_SIZE: u32 = 32 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub payload: Bytes,
}

pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = double_sha256(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Serialize a frame into a single buffer.
pub fn encode_frame(magic: u32, command: &Command, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let name = command.as_str().as_bytes();
    if name.len() > 12 || !name.is_ascii() {
        return Err(FrameError::BadCommand);
    }
    if payload.len() > MAX_PAYLOAD_SIZE as usize {
        return Err(FrameError::TooLarge(payload.len() as u32));
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&magic.to_le_bytes());
    let mut cmd = [0u8; 12];
    cmd[..name.len()].copy_from_slice(name);
    frame.extend_from_slice(&cmd);
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&checksum(payload));
    frame.extend_from_slice(payload);
    Ok(frame)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    magic: u32,
    command: &Command,
    payload: &[u8],
) -> Result<(), FrameError> {
    let frame = encode_frame(magic, command, payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Returns `Ok(None)` on a clean EOF between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    magic: u32,
) -> Result<Option<Frame>, FrameError> {
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let got = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if got != magic {
        return Err(FrameError::BadMagic {
            expected: magic,
            got,
        });
    }

    let name_field = &header[4..16];
    let name_len = name_field.iter().position(|&b| b == 0).unwrap_or(12);
    let name = std::str::from_utf8(&name_field[..name_len]).map_err(|_| FrameError::BadCommand)?;
    if !name.is_ascii() {
        return Err(FrameError::BadCommand);
    }
    let command = Command::from_name(name);

    let len = u32::from_le_bytes([header[16], header[17], header[18], header[19]]);
    if len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::TooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    if checksum(&payload) != header[20..24] {
        return Err(FrameError::Checksum {
            command: command.to_string(),
        });
    }

    Ok(Some(Frame {
        command,
        payload: Bytes::from(payload),
    }))
}
