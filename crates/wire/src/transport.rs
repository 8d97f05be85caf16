//! Framing and transport seam.
//!
//! Stream transports carry protobuf messages length-delimited: a varint
//! byte count followed by the encoded message.

use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use prost::Message;

use crate::{ClientFrame, ServerFrame};

/// Upper bound on a single frame body.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Maximum bytes in a varint length prefix.
const MAX_VARINT_BYTES: usize = 10;

// ============================================================================
// Errors
// ============================================================================

/// Channel or network failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed frame: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
    #[error("invalid varint length prefix")]
    BadPrefix,
    #[error("no response within {waited_ms} ms")]
    Timeout { waited_ms: u64 },
    #[error("connection closed")]
    Closed,
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Duplex connection carrying client frames out and server frames in.
///
/// `recv` returns `Ok(None)` when nothing is available yet; implementations
/// may wait up to their own poll interval before returning.
pub trait Transport {
    fn send(&mut self, frame: &ClientFrame) -> Result<(), TransportError>;

    fn recv(&mut self) -> Result<Option<ServerFrame>, TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;
}

// ============================================================================
// Framing
// ============================================================================

/// Encode a message with its varint length prefix.
pub fn encode_frame<M: Message>(msg: &M) -> Vec<u8> {
    msg.encode_length_delimited_to_vec()
}

/// Incremental decoder for length-delimited frames.
#[derive(Debug)]
pub struct FrameDecoder<M> {
    buf: Vec<u8>,
    _msg: PhantomData<M>,
}

impl<M: Message + Default> Default for FrameDecoder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Message + Default> FrameDecoder<M> {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            _msg: PhantomData,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<M>, TransportError> {
        let Some((prefix_len, body_len)) = read_prefix(&self.buf)? else {
            return Ok(None);
        };
        if body_len > MAX_FRAME_BYTES {
            return Err(TransportError::FrameTooLarge(body_len));
        }
        let total = prefix_len + body_len;
        if self.buf.len() < total {
            return Ok(None);
        }
        let msg = M::decode(&self.buf[prefix_len..total])?;
        self.buf.drain(..total);
        Ok(Some(msg))
    }
}

/// Parse a varint length prefix. `None` when more bytes are needed.
fn read_prefix(buf: &[u8]) -> Result<Option<(usize, usize)>, TransportError> {
    let mut value: u64 = 0;
    for (i, &byte) in buf.iter().take(MAX_VARINT_BYTES).enumerate() {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            let len = usize::try_from(value).map_err(|_| TransportError::FrameTooLarge(usize::MAX))?;
            return Ok(Some((i + 1, len)));
        }
    }
    if buf.len() >= MAX_VARINT_BYTES {
        return Err(TransportError::BadPrefix);
    }
    Ok(None)
}

// ============================================================================
// TCP Transport
// ============================================================================

/// Length-delimited protobuf frames over a TCP stream.
pub struct TcpTransport {
    stream: TcpStream,
    decoder: FrameDecoder<ServerFrame>,
    closed: bool,
}

impl TcpTransport {
    /// Connect and use `poll_interval` as the per-`recv` read timeout.
    pub fn connect(addr: impl ToSocketAddrs, poll_interval: Duration) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream, poll_interval)
    }

    pub fn from_stream(stream: TcpStream, poll_interval: Duration) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(poll_interval))?;
        tracing::debug!(peer = ?stream.peer_addr().ok(), "tcp transport connected");
        Ok(Self {
            stream,
            decoder: FrameDecoder::new(),
            closed: false,
        })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, frame: &ClientFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.stream.write_all(&encode_frame(frame))?;
        self.stream.flush()?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Option<ServerFrame>, TransportError> {
        if let Some(frame) = self.decoder.next_frame()? {
            return Ok(Some(frame));
        }
        if self.closed {
            return Err(TransportError::Closed);
        }

        let mut chunk = [0u8; 4096];
        match self.stream.read(&mut chunk) {
            Ok(0) => {
                self.closed = true;
                Err(TransportError::Closed)
            }
            Ok(n) => {
                self.decoder.extend(&chunk[..n]);
                self.decoder.next_frame()
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.shutdown(std::net::Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
