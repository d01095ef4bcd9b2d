use std::io::ErrorKind;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::utils::Envelope;
use crate::MAX_FRAME_SIZE;

/// Open a fresh connection to `addr`. Connections are never reused.
pub async fn dial(addr: &str) -> Result<TcpStream> {
    debug!("Dialing {}", addr);
    TcpStream::connect(addr)
        .await
        .map_err(|e| Error::network(addr, e))
}

/// Write one envelope: a big-endian u32 length followed by the bincode body.
pub async fn write_envelope<W>(writer: &mut W, peer: &str, envelope: &Envelope) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = bincode::serialize(envelope)?;
    if encoded.len() > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "envelope of {} bytes exceeds the {}-byte frame limit",
            encoded.len(),
            MAX_FRAME_SIZE
        )));
    }

    writer
        .write_u32(encoded.len() as u32)
        .await
        .map_err(|e| Error::network(peer, e))?;
    writer
        .write_all(&encoded)
        .await
        .map_err(|e| Error::network(peer, e))?;
    writer.flush().await.map_err(|e| Error::network(peer, e))?;

    debug!("Sent {} byte envelope to {}", encoded.len(), peer);
    Ok(())
}

/// Read one envelope, or `None` if the peer closed before sending anything.
pub async fn read_optional_envelope<R>(reader: &mut R, peer: &str) -> Result<Option<Envelope>>
where
    R: AsyncRead + Unpin,
{
    let frame_size = match reader.read_u32().await {
        Ok(size) => size as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::network(peer, e)),
    };

    if frame_size > MAX_FRAME_SIZE {
        return Err(Error::Protocol(format!(
            "{} announced a {} byte frame, limit is {}",
            peer, frame_size, MAX_FRAME_SIZE
        )));
    }

    let mut buffer = vec![0; frame_size];
    reader.read_exact(&mut buffer).await.map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => {
            Error::Protocol(format!("{} closed mid-frame after announcing {} bytes", peer, frame_size))
        }
        _ => Error::network(peer, e),
    })?;

    let envelope: Envelope = bincode::deserialize(&buffer)?;
    debug!("Received {} byte envelope from {}", frame_size, peer);
    Ok(Some(envelope))
}

/// Read exactly one envelope; an early close is a protocol error.
pub async fn read_envelope<R>(reader: &mut R, peer: &str) -> Result<Envelope>
where
    R: AsyncRead + Unpin,
{
    read_optional_envelope(reader, peer)
        .await?
        .ok_or_else(|| Error::Protocol(format!("{} closed the connection without replying", peer)))
}
