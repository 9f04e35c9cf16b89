//! V2GTP framing over any byte stream
//!
//! Reads reassemble exactly one frame before anything is handed to the
//! codec; writes emit header and body in one buffer. Generic over the
//! stream so sessions run identically on TCP, TLS, and the in-memory
//! duplex pipes the tests use.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use v2g_codec::v2gtp::{parse_header, V2gtpFrame, V2GTP_HEADER_LEN};

use crate::error::TransportError;

/// A byte stream that speaks whole V2GTP frames.
pub struct FramedStream<S> {
    inner: S,
    /// Frames with larger payloads are a protocol error
    max_payload: u32,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedStream<S> {
    pub fn new(inner: S, max_payload: u32) -> Self {
        Self { inner, max_payload }
    }

    /// Tighten or relax the payload bound (set after SAP negotiation
    /// fixes the dialect).
    pub fn set_max_payload(&mut self, max_payload: u32) {
        self.max_payload = max_payload;
    }

    /// Read one complete frame. `Ok(None)` means the peer closed the
    /// connection before a new frame started.
    pub async fn read_frame(&mut self) -> Result<Option<V2gtpFrame>, TransportError> {
        let mut header = [0u8; V2GTP_HEADER_LEN];
        match self.inner.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let (parsed, _) = parse_header(&header)?;
        if parsed.payload_len > self.max_payload {
            return Err(TransportError::FrameTooLarge {
                len: parsed.payload_len,
                max: self.max_payload,
            });
        }

        let mut payload = vec![0u8; parsed.payload_len as usize];
        self.inner
            .read_exact(&mut payload)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => TransportError::PeerClosed,
                _ => TransportError::Io(e),
            })?;

        Ok(Some(V2gtpFrame::new(parsed.payload_type, payload)))
    }

    /// Write one complete frame and flush.
    pub async fn write_frame(&mut self, frame: &V2gtpFrame) -> Result<(), TransportError> {
        self.inner.write_all(&frame.to_bytes()).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Write pre-framed bytes (output of the codec's `encode`).
    pub async fn write_raw(&mut self, framed: &[u8]) -> Result<(), TransportError> {
        self.inner.write_all(framed).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use v2g_core::dialect::payload_type;

    #[tokio::test]
    async fn frame_survives_partial_writes() {
        let (client, server) = tokio::io::duplex(16); // tiny buffer forces fragmentation
        let mut tx = FramedStream::new(client, 8192);
        let mut rx = FramedStream::new(server, 8192);

        let frame = V2gtpFrame::new(payload_type::EXI_SAP_V2, vec![0xAB; 300]);
        let send = tokio::spawn({
            let frame = frame.clone();
            async move {
                tx.write_frame(&frame).await.unwrap();
                tx
            }
        });

        let got = rx.read_frame().await.unwrap().unwrap();
        assert_eq!(got, frame);
        send.await.unwrap();
    }

    #[tokio::test]
    async fn clean_close_reads_none() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut rx = FramedStream::new(server, 8192);
        assert!(rx.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversize_frame_is_protocol_error() {
        let (client, server) = tokio::io::duplex(1024);
        let mut tx = FramedStream::new(client, u32::MAX);
        let mut rx = FramedStream::new(server, 16);

        let frame = V2gtpFrame::new(payload_type::EXI_SAP_V2, vec![0; 64]);
        tokio::spawn(async move {
            let _ = tx.write_frame(&frame).await;
        });

        assert!(matches!(
            rx.read_frame().await,
            Err(TransportError::FrameTooLarge { len: 64, .. })
        ));
    }
}
