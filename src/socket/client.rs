use crate::base::neterror::NetError;
use crate::socket::tls::TlsStream;
use futures::FutureExt;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A connected transport, plain or TLS, that the pool can check for
/// liveness without reading from it (Chromium's `StreamSocket`).
pub trait StreamSocket: AsyncRead + AsyncWrite + Unpin + Send + Sync + fmt::Debug {
    /// Returns true if the peer has not closed or reset the connection.
    fn is_connected(&self) -> bool;

    /// Connected, with nothing buffered from the peer.
    fn is_connected_and_idle(&self) -> bool;
}

#[derive(Debug)]
pub enum SocketType {
    Tcp(TcpStream),
    Tls(Box<dyn TlsStream>),
}

/// Result of a non-blocking peek on an idle socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    /// Nothing to read, connection open.
    Idle,
    /// Bytes are waiting. For an idle pooled connection this is either a
    /// TLS close_notify or garbage; either way the socket is not reusable.
    Readable,
    /// EOF or error.
    Closed,
}

impl SocketType {
    fn tcp(&self) -> &TcpStream {
        match self {
            SocketType::Tcp(s) => s,
            SocketType::Tls(s) => s.tcp(),
        }
    }

    fn liveness(&self) -> Liveness {
        let stream = self.tcp();
        if stream.peer_addr().is_err() {
            return Liveness::Closed;
        }
        let mut buf = [0u8; 1];
        match stream.peek(&mut buf).now_or_never() {
            None => Liveness::Idle,
            Some(Ok(0)) => Liveness::Closed,
            Some(Ok(_)) => Liveness::Readable,
            Some(Err(_)) => Liveness::Closed,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, SocketType::Tls(_))
    }

    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.tcp().peer_addr().ok()
    }
}

impl AsyncRead for SocketType {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            SocketType::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SocketType {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            SocketType::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_flush(cx),
            SocketType::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            SocketType::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            SocketType::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

impl StreamSocket for SocketType {
    fn is_connected(&self) -> bool {
        self.liveness() != Liveness::Closed
    }

    fn is_connected_and_idle(&self) -> bool {
        self.liveness() == Liveness::Idle
    }
}

/// A pooled transport plus whether it has carried a request yet.
///
/// A socket that has served a response must be idle to be handed out
/// again; one that never has only needs to be open.
#[derive(Debug)]
pub struct WrappedSocket {
    inner: SocketType,
    was_used: bool,
}

impl WrappedSocket {
    pub fn new(socket: SocketType) -> Self {
        Self {
            inner: socket,
            was_used: false,
        }
    }

    pub fn mark_used(&mut self) {
        self.was_used = true;
    }

    pub fn was_ever_used(&self) -> bool {
        self.was_used
    }

    /// `Ok` if the socket may carry the next request.
    pub fn is_usable(&self) -> Result<(), NetError> {
        if self.was_used {
            if !self.inner.is_connected_and_idle() {
                return if !self.inner.is_connected() {
                    Err(NetError::ConnectionClosed)
                } else {
                    Err(NetError::InvalidHttpResponse(
                        "data received on idle connection".into(),
                    ))
                };
            }
        } else if !self.inner.is_connected() {
            return Err(NetError::ConnectionClosed);
        }
        Ok(())
    }

    pub fn inner(&self) -> &SocketType {
        &self.inner
    }
}

impl AsyncRead for WrappedSocket {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for WrappedSocket {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_fresh_socket_is_usable() {
        let (client, _server) = pair().await;
        let socket = WrappedSocket::new(SocketType::Tcp(client));
        assert!(socket.is_usable().is_ok());
        assert!(!socket.was_ever_used());
    }

    #[tokio::test]
    async fn test_closed_peer_detected() {
        let (client, server) = pair().await;
        drop(server);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mut socket = WrappedSocket::new(SocketType::Tcp(client));
        socket.mark_used();
        assert_eq!(socket.is_usable(), Err(NetError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_unexpected_data_not_idle() {
        let (client, mut server) = pair().await;
        server.write_all(b"x").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mut socket = WrappedSocket::new(SocketType::Tcp(client));
        assert!(socket.inner().is_connected());
        assert!(!socket.inner().is_connected_and_idle());
        socket.mark_used();
        assert!(socket.is_usable().is_err());
    }
}
