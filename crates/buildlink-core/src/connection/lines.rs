//! Newline-delimited JSON over TCP.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Connection, SerialCounter};
use crate::codec;
use crate::errors::TransportError;
use crate::protocol::Envelope;

/// Longest frame accepted from the server.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// A [`Connection`] speaking one JSON envelope per line.
///
/// Frames that fail to decode, or exceed the size limit, are logged and
/// skipped; the stream stays usable.
pub struct LineConnection {
    reader: Mutex<FramedRead<OwnedReadHalf, LinesCodec>>,
    writer: Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
    serials: SerialCounter,
    closed: CancellationToken,
}

impl LineConnection {
    /// Dial the server.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        if let Err(error) = stream.set_nodelay(true) {
            debug!(%error, "could not disable Nagle");
        }
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: Mutex::new(FramedRead::new(
                read_half,
                LinesCodec::new_with_max_length(MAX_FRAME_BYTES),
            )),
            writer: Mutex::new(FramedWrite::new(write_half, LinesCodec::new())),
            serials: SerialCounter::new(),
            closed: CancellationToken::new(),
        }
    }

    async fn read_frame(&self) -> Result<Envelope, TransportError> {
        let mut reader = self.reader.lock().await;
        loop {
            let line = match reader.next().await {
                None => return Err(TransportError::Closed),
                Some(Ok(line)) => line,
                Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!(max = MAX_FRAME_BYTES, "dropping oversized frame");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match codec::decode(&line) {
                Ok(envelope) => return Ok(envelope),
                Err(error) => warn!(%error, "dropping malformed frame"),
            }
        }
    }
}

#[async_trait]
impl Connection for LineConnection {
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let frame = codec::encode(&envelope).map_err(TransportError::Encode)?;
        // A write stalled on a peer that stopped reading must not keep the
        // writer locked past `close`.
        tokio::select! {
            () = self.closed.cancelled() => Err(TransportError::Closed),
            sent = async {
                let mut writer = self.writer.lock().await;
                writer.send(frame).await
            } => sent.map_err(|e| match e {
                LinesCodecError::Io(e) => TransportError::Io(e),
                LinesCodecError::MaxLineLengthExceeded => TransportError::Closed,
            }),
        }
    }

    async fn receive(&self) -> Result<Envelope, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let result = tokio::select! {
            () = self.closed.cancelled() => Err(TransportError::Closed),
            result = self.read_frame() => result,
        };
        if result.is_err() {
            self.closed.cancel();
        }
        result
    }

    fn next_serial(&self) -> u64 {
        self.serials.next()
    }

    async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        let mut writer = self.writer.lock().await;
        if let Err(error) = writer.get_mut().shutdown().await {
            debug!(%error, "shutdown of write half failed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
