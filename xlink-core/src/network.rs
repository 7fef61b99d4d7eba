//! Network provider abstraction for reaching an X server.
//!
//! The transport engine only ever sees a bidirectional byte stream; this
//! module provides the trait that produces one from a [`DisplayAddress`],
//! plus the Tokio implementation used in production. Tests substitute an
//! in-memory duplex pipe instead of going through a provider at all.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::display::{ConnectTarget, DisplayAddress};

/// Provider trait for opening the byte stream to a display.
///
/// Implementations decide how a [`DisplayAddress`] maps to an actual
/// connection. `Clone` allows sharing a provider across connections.
#[async_trait]
pub trait NetworkProvider: Clone + Send + Sync {
    /// The stream type this provider produces.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a connection to the server named by `display`.
    async fn connect(&self, display: &DisplayAddress) -> io::Result<Self::Stream>;
}

/// Real networking via Tokio: unix sockets for local displays, TCP for
/// remote ones. Protocol prefixes other than `unix` are dialed as TCP,
/// which is the only stream transport available here.
#[derive(Debug, Clone, Default)]
pub struct TokioNetworkProvider;

impl TokioNetworkProvider {
    /// Create a new Tokio network provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NetworkProvider for TokioNetworkProvider {
    type Stream = ServerStream;

    async fn connect(&self, display: &DisplayAddress) -> io::Result<Self::Stream> {
        match display.target() {
            #[cfg(unix)]
            ConnectTarget::Unix(path) => Ok(ServerStream::Unix(UnixStream::connect(path).await?)),
            #[cfg(not(unix))]
            ConnectTarget::Unix(path) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("unix socket {path} not supported on this platform"),
            )),
            ConnectTarget::Tcp { host, port } => Ok(ServerStream::Tcp(
                TcpStream::connect((host.as_str(), *port)).await?,
            )),
        }
    }
}

/// A stream to the X server: either a TCP connection or a unix socket.
#[derive(Debug)]
pub enum ServerStream {
    /// TCP connection to a remote display.
    Tcp(TcpStream),
    /// Unix domain socket to a local display.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for ServerStream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            ServerStream::Tcp(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            ServerStream::Unix(s) => std::pin::Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ServerStream {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        match self.get_mut() {
            ServerStream::Tcp(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            ServerStream::Unix(s) => std::pin::Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            ServerStream::Tcp(s) => std::pin::Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            ServerStream::Unix(s) => std::pin::Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            ServerStream::Tcp(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            ServerStream::Unix(s) => std::pin::Pin::new(s).poll_shutdown(cx),
        }
    }
}
