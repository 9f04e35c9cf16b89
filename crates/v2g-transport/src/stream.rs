//! Plain-TCP or TLS stream behind one type
//!
//! The session task neither knows nor cares whether its bytes are
//! encrypted; the accept/connect paths decide once.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{client, server};

/// A connected HLC byte stream.
pub enum V2gStream {
    Tcp(TcpStream),
    TlsClient(Box<client::TlsStream<TcpStream>>),
    TlsServer(Box<server::TlsStream<TcpStream>>),
}

impl V2gStream {
    pub fn is_tls(&self) -> bool {
        !matches!(self, V2gStream::Tcp(_))
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        match self {
            V2gStream::Tcp(s) => s.peer_addr(),
            V2gStream::TlsClient(s) => s.get_ref().0.peer_addr(),
            V2gStream::TlsServer(s) => s.get_ref().0.peer_addr(),
        }
    }

    /// DER client certificate presented during the TLS handshake, if
    /// mutual authentication ran (server side only).
    pub fn peer_certificates(&self) -> Option<Vec<Vec<u8>>> {
        match self {
            V2gStream::TlsServer(s) => s
                .get_ref()
                .1
                .peer_certificates()
                .map(|certs| certs.iter().map(|c| c.0.clone()).collect()),
            _ => None,
        }
    }
}

impl AsyncRead for V2gStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            V2gStream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            V2gStream::TlsClient(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
            V2gStream::TlsServer(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for V2gStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            V2gStream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            V2gStream::TlsClient(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
            V2gStream::TlsServer(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            V2gStream::Tcp(s) => Pin::new(s).poll_flush(cx),
            V2gStream::TlsClient(s) => Pin::new(s.as_mut()).poll_flush(cx),
            V2gStream::TlsServer(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            V2gStream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            V2gStream::TlsClient(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
            V2gStream::TlsServer(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
