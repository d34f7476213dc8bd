use molbus_protocol::SessionName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::TcpError;

/// Length-prefix value marking a heartbeat frame instead of a message
/// (§4.9, §6): `len = -2 (i16)`, `session[10]`, `next_seq[8]`.
const HEARTBEAT_MARKER: i16 = -2;

pub enum Frame {
    Message(Vec<u8>),
    Heartbeat { session: SessionName, next_seq: u64 },
}

/// Reads one frame from `stream`: a regular message (`len > 0` then
/// `len` bytes) or a heartbeat (`len == -2` then 18 more bytes).
pub async fn read_frame<R: AsyncReadExt + Unpin>(stream: &mut R) -> Result<Frame, TcpError> {
    let len = stream.read_i16().await?;
    if len == HEARTBEAT_MARKER {
        let mut session = [0u8; 10];
        stream.read_exact(&mut session).await?;
        let next_seq = stream.read_u64().await?;
        return Ok(Frame::Heartbeat { session, next_seq });
    }
    if len <= 0 {
        return Err(TcpError::MalformedFrame(len));
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    Ok(Frame::Message(body))
}

pub async fn write_message<W: AsyncWriteExt + Unpin>(stream: &mut W, body: &[u8]) -> Result<(), TcpError> {
    stream.write_i16(body.len() as i16).await?;
    stream.write_all(body).await?;
    Ok(())
}

pub async fn write_heartbeat<W: AsyncWriteExt + Unpin>(
    stream: &mut W,
    session: &SessionName,
    next_seq: u64,
) -> Result<(), TcpError> {
    stream.write_i16(HEARTBEAT_MARKER).await?;
    stream.write_all(session).await?;
    stream.write_u64(next_seq).await?;
    Ok(())
}
