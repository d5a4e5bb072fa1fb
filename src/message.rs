//! Length-prefixed frames on top of any duplex byte stream.
//!
//! Wire format, for every frame:
//!
//! <len i32 little-endian><payload bytes>
//!
//! A receiver treats a zero or negative length as a broken stream, as it does a stream that
//! closes halfway through a frame. None of those raise an error to the caller: the reader logs
//! the fault and returns an empty frame, and the caller stops reading.

use std::io;

use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, ReadHalf, WriteHalf};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::error::FrameError;

/// Size of the length prefix in front of every frame.
pub const LEN_PREFIX: usize = 4;

// Never pre-allocate more than this for a frame that has not arrived yet.
const MAX_RESERVE: usize = 64 * 1024;

/// Splits a byte stream into frame-sized chunks and back.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Payload length of the frame whose prefix has been consumed already.
    pending: Option<usize>,
}

impl FrameCodec {
    pub fn new() -> FrameCodec {
        FrameCodec::default()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                if buf.len() < LEN_PREFIX {
                    return Ok(None);
                }
                let announced = LittleEndian::read_i32(&buf[..LEN_PREFIX]);
                buf.advance(LEN_PREFIX);
                if announced < 0 {
                    return Err(FrameError::NegativeLength(announced));
                }
                if announced == 0 {
                    return Err(FrameError::EmptyFrame);
                }
                let len = announced as usize;
                self.pending = Some(len);
                len
            }
        };

        if buf.len() < len {
            buf.reserve((len - buf.len()).min(MAX_RESERVE));
            return Ok(None);
        }
        self.pending = None;
        Ok(Some(buf.split_to(len).freeze()))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, FrameError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        match self.pending {
            None if buf.is_empty() => Ok(None),
            None => Err(FrameError::Truncated {
                expected: LEN_PREFIX,
                received: buf.len(),
            }),
            Some(expected) => Err(FrameError::Truncated {
                expected,
                received: buf.len(),
            }),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = i32::try_from(item.len()).map_err(|_| FrameError::TooLarge(item.len()))?;
        let mut prefix = [0u8; LEN_PREFIX];
        LittleEndian::write_i32(&mut prefix, len);

        dst.reserve(LEN_PREFIX + item.len());
        dst.put_slice(&prefix);
        dst.put(item);
        Ok(())
    }
}

/// Receiving side of a framed stream.
pub struct FrameReader<R> {
    inner: FramedRead<BufReader<R>, FrameCodec>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> FrameReader<R> {
        FrameReader {
            inner: FramedRead::new(BufReader::new(reader), FrameCodec::new()),
        }
    }

    /// Suspends until at least one byte can be read. Returns `false` once the peer has closed
    /// the stream and nothing is left to read.
    pub async fn wait_for_data(&mut self) -> io::Result<bool> {
        if !self.inner.read_buffer().is_empty() {
            return Ok(true);
        }
        let available = self.inner.get_mut().fill_buf().await?;
        Ok(!available.is_empty())
    }

    /// Reads one whole frame. An empty result means no usable frame could be read and the
    /// stream should be abandoned.
    pub async fn receive_frame(&mut self) -> Bytes {
        match self.inner.next().await {
            Some(Ok(frame)) => {
                debug!(len = frame.len(), "received frame");
                frame
            }
            Some(Err(FrameError::Io(err))) => {
                warn!(%err, "could not read frame");
                Bytes::new()
            }
            Some(Err(err)) => {
                warn!(%err, "discarding unusable frame");
                Bytes::new()
            }
            None => {
                debug!("stream closed before a frame arrived");
                Bytes::new()
            }
        }
    }

    /// Reads one frame and decodes it as UTF-8, replacing invalid sequences.
    pub async fn receive_text(&mut self) -> String {
        let frame = self.receive_frame().await;
        String::from_utf8_lossy(&frame).into_owned()
    }
}

/// Sending side of a framed stream.
pub struct FrameWriter<W> {
    inner: FramedWrite<W, FrameCodec>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> FrameWriter<W> {
        FrameWriter {
            inner: FramedWrite::new(writer, FrameCodec::new()),
        }
    }

    /// Writes one frame and flushes it. A payload too long for the prefix is logged and
    /// skipped rather than reported.
    pub async fn send_frame(&mut self, data: impl Into<Bytes>) -> io::Result<()> {
        match self.inner.send(data.into()).await {
            Ok(()) => Ok(()),
            Err(FrameError::TooLarge(len)) => {
                warn!(len, "frame too large to send, dropping it");
                Ok(())
            }
            Err(FrameError::Io(err)) => Err(err),
            Err(err) => Err(io::Error::new(io::ErrorKind::InvalidData, err)),
        }
    }

    pub async fn send_text(&mut self, text: &str) -> io::Result<()> {
        self.send_frame(Bytes::copy_from_slice(text.as_bytes()))
            .await
    }

    /// Flushes pending frames and shuts the write direction down.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        match self.inner.close().await {
            Ok(()) => Ok(()),
            Err(FrameError::Io(err)) => Err(err),
            Err(err) => Err(io::Error::new(io::ErrorKind::Other, err)),
        }
    }
}

/// Splits a duplex stream into a frame reader and a frame writer that can be driven
/// concurrently.
pub fn split<S>(stream: S) -> (FrameReader<ReadHalf<S>>, FrameWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(stream);
    (FrameReader::new(reader), FrameWriter::new(writer))
}
