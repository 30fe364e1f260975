//! Response body streaming.
//! Mirrors Chromium's HttpStream::ReadResponseBody.

use crate::base::cancel::Interrupt;
use crate::base::neterror::NetError;
use crate::http::decoder::ContentDecoder;
use crate::http::h1::H1Body;
use crate::http::h2::H2Body;
use crate::socket::pool::{ConnectionPool, PooledSocket};
use bytes::{Bytes, BytesMut};
use std::fmt;

/// Where raw body bytes come from.
pub(crate) enum BodySource {
    Empty,
    /// The pooled connection goes back to `pool` once the body ends cleanly.
    H1 {
        body: H1Body<PooledSocket>,
        pool: ConnectionPool,
    },
    H2(H2Body),
}

/// Decoded response body.
///
/// Dropping the body before the end closes an HTTP/1.1 connection or resets
/// an HTTP/2 stream.
pub struct ResponseBody {
    source: BodySource,
    decoder: Option<ContentDecoder>,
    interrupt: Interrupt,
    done: bool,
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            BodySource::Empty => "empty",
            BodySource::H1 { .. } => "http/1.1",
            BodySource::H2(_) => "h2",
        };
        f.debug_struct("ResponseBody")
            .field("source", &source)
            .field("decoder", &self.decoder.as_ref().map(ContentDecoder::codings))
            .field("done", &self.done)
            .finish()
    }
}

impl ResponseBody {
    pub(crate) fn new(
        source: BodySource,
        decoder: Option<ContentDecoder>,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            source,
            decoder,
            interrupt,
            done: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(BodySource::Empty, None, Interrupt::never())
    }

    /// Next decoded chunk; `None` once the body is exhausted.
    ///
    /// Observes the request's cancellation token and deadline. After an
    /// error the body is finished and its connection discarded.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, NetError> {
        if self.done {
            return Ok(None);
        }
        let interrupt = self.interrupt.clone();
        let result = interrupt.run(self.next_decoded()).await;
        match &result {
            Ok(Some(_)) => {}
            Ok(None) => self.done = true,
            Err(e) => {
                if e.is_cancellation() {
                    tracing::debug!(error = %e, "response body interrupted, discarding connection");
                } else {
                    tracing::warn!(error = %e, "response body failed, discarding connection");
                }
                self.done = true;
                self.source = BodySource::Empty;
                self.decoder = None;
            }
        }
        result
    }

    /// Read the rest of the body.
    pub async fn bytes(mut self) -> Result<Bytes, NetError> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    /// Read the rest of the body as UTF-8.
    pub async fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    /// Read the rest of the body as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, NetError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| NetError::JsonParseError(e.to_string()))
    }

    async fn next_decoded(&mut self) -> Result<Option<Bytes>, NetError> {
        loop {
            let raw = self.next_raw().await?;
            let Some(decoder) = self.decoder.as_mut() else {
                return Ok(raw);
            };
            match raw {
                Some(raw) => {
                    let out = decoder.push(&raw)?;
                    if !out.is_empty() {
                        return Ok(Some(Bytes::from(out)));
                    }
                }
                None => {
                    let tail = match self.decoder.take() {
                        Some(decoder) => decoder.finish()?,
                        None => Vec::new(),
                    };
                    return Ok((!tail.is_empty()).then(|| Bytes::from(tail)));
                }
            }
        }
    }

    async fn next_raw(&mut self) -> Result<Option<Bytes>, NetError> {
        let chunk = match &mut self.source {
            BodySource::Empty => return Ok(None),
            BodySource::H1 { body, .. } => body.next_chunk().await?,
            BodySource::H2(body) => body.next_chunk().await?,
        };
        if chunk.is_none() {
            let source = std::mem::replace(&mut self.source, BodySource::Empty);
            if let BodySource::H1 { mut body, pool } = source {
                match body.take_reusable() {
                    Some(socket) => socket.release(&pool),
                    None => tracing::debug!("connection not reusable, closing"),
                }
            }
        }
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::cancel::CancellationToken;
    use crate::http::h1::{Conn, Framing};
    use crate::socket::client::{SocketType, WrappedSocket};
    use crate::socket::pool::{Acquired, PoolKey};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};
    use url::Url;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    /// A body read from a real pooled connection whose server sends
    /// `payload` after the (already consumed) response head.
    async fn h1_body(
        payload: Vec<u8>,
        framing: Framing,
        decoder: Option<ContentDecoder>,
        interrupt: Interrupt,
    ) -> (ResponseBody, ConnectionPool, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();
        server.write_all(&payload).await.unwrap();

        let pool = ConnectionPool::default();
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let key = PoolKey::new(&url, None, "chrome-auto", false).unwrap();
        let Acquired::Slot(slot) = pool.acquire(&key).await else {
            panic!("expected a fresh slot");
        };
        let socket = pool.checkout(WrappedSocket::new(SocketType::Tcp(client)), slot, None);
        let body = H1Body::new(Conn::new(socket), framing, true);
        let body = ResponseBody::new(
            BodySource::H1 {
                body,
                pool: pool.clone(),
            },
            decoder,
            interrupt,
        );
        (body, pool, server)
    }

    #[tokio::test]
    async fn test_decoded_body_releases_connection() {
        let original = b"hello hello hello hello".to_vec();
        let compressed = gzip(&original);
        let (body, pool, _server) = h1_body(
            compressed.clone(),
            Framing::Length(compressed.len() as u64),
            ContentDecoder::for_encoding("gzip"),
            Interrupt::never(),
        )
        .await;

        assert_eq!(body.bytes().await.unwrap(), original);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let garbage = b"definitely not gzip".to_vec();
        let (body, pool, _server) = h1_body(
            garbage.clone(),
            Framing::Length(garbage.len() as u64),
            ContentDecoder::for_encoding("gzip"),
            Interrupt::never(),
        )
        .await;

        let err = body.bytes().await.unwrap_err();
        assert_eq!(err.kind(), crate::base::neterror::ErrorKind::Decode);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_body_discards_connection() {
        let (mut body, pool, _server) = h1_body(
            b"abc".to_vec(),
            Framing::Length(10),
            None,
            Interrupt::never(),
        )
        .await;
        assert_eq!(body.chunk().await.unwrap().as_deref(), Some(&b"abc"[..]));
        drop(body);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_body_read() {
        let token = CancellationToken::new();
        let (mut body, _pool, _server) = h1_body(
            Vec::new(),
            Framing::Length(10),
            None,
            Interrupt::new(Some(token.clone()), None),
        )
        .await;

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = body.chunk().await.unwrap_err();
        assert_eq!(err, NetError::Aborted);
        assert!(err.is_cancellation());
        assert_eq!(body.chunk().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_body() {
        assert!(ResponseBody::empty().bytes().await.unwrap().is_empty());
    }
}
