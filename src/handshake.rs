//! Opening exchange of every flow: both ends prove they speak the protocol, then trade
//! display names.
//!
//! Each step is symmetric: a side sends first and then reads what the peer sent, so the
//! two ends never wait on each other.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::error::{FlowError, HandshakeError};
use crate::message::{FrameReader, FrameWriter};

/// Fixed protocol signature, sent as the first frame in each direction.
pub const SIGNATURE: [u8; 16] = [
    0x46, 0x41, 0x43, 0x48, 0x50, 0x49, 0x00, 0xFF, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF,
];

/// Sends `signature` and checks that the peer sent the very same bytes.
pub async fn exchange_signature<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    signature: &[u8],
) -> Result<(), FlowError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.send_frame(signature.to_vec()).await?;

    let answer = reader.receive_frame().await;
    if answer.is_empty() {
        return Err(HandshakeError::MissingSignature.into());
    }
    if answer[..] != *signature {
        warn!(received = ?&answer[..], "peer answered with a foreign signature");
        return Err(HandshakeError::SignatureMismatch.into());
    }
    debug!("signature accepted");
    Ok(())
}

/// Sends our display name and returns the peer's.
pub async fn exchange_names<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    local_name: &str,
) -> Result<String, FlowError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.send_text(local_name).await?;

    let remote_name = reader.receive_text().await;
    if remote_name.is_empty() {
        return Err(HandshakeError::MissingName.into());
    }
    Ok(remote_name)
}
