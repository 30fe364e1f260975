//! HTTP/1.1 request writer and response reader.
//!
//! Requests are serialized byte for byte from the resolved header order with
//! the stored field casing. Responses are parsed with `httparse`; the body is
//! framed by `Content-Length`, chunked encoding, or connection close.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::base::trace::ClientTrace;
use crate::http::orderedheaders::{OrderedHeaders, Protocol};
use crate::http::requestbody::RequestBody;
use crate::http::writer::{write_head, HeaderBlockWriter, RequestHead};
use bytes::{Buf, Bytes, BytesMut};
use http::{Method, StatusCode, Version};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const MAX_HEAD_BYTES: usize = 256 * 1024;
const MAX_HEADERS: usize = 128;
const MAX_LINE: usize = 8 * 1024;
const READ_CHUNK: usize = 16 * 1024;

/// Serializes a request head into a byte buffer.
#[derive(Debug, Default)]
pub(crate) struct H1HeadWriter {
    buf: Vec<u8>,
}

impl HeaderBlockWriter for H1HeadWriter {
    fn protocol(&self) -> Protocol {
        Protocol::Http1
    }

    fn begin(&mut self, head: &RequestHead<'_>) {
        self.buf.extend_from_slice(head.method.as_str().as_bytes());
        self.buf.push(b' ');
        self.buf.extend_from_slice(head.target().as_bytes());
        self.buf.extend_from_slice(b" HTTP/1.1\r\n");
    }

    fn field(&mut self, name: &str, value: &str) {
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.extend_from_slice(b": ");
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }

    fn finish(&mut self) {
        self.buf.extend_from_slice(b"\r\n");
    }
}

/// The full request: head, then the body framed as the headers declare.
pub(crate) fn encode_request(
    head: &RequestHead<'_>,
    body: &RequestBody,
    trace: &ClientTrace,
) -> Result<Vec<u8>, NetError> {
    let mut writer = H1HeadWriter {
        buf: Vec::with_capacity(512 + body.len()),
    };
    write_head(&mut writer, head, &[], trace)?;
    let mut out = writer.buf;

    let data: &[u8] = match body {
        RequestBody::Empty => &[],
        RequestBody::Bytes(b) => &b[..],
    };
    if is_chunked(head.headers) {
        if !data.is_empty() {
            out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"0\r\n\r\n");
    } else {
        out.extend_from_slice(data);
    }
    Ok(out)
}

/// Status line and fields of a response, in received order.
#[derive(Debug, Clone)]
pub(crate) struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: OrderedHeaders,
}

/// A connection with its read buffer.
#[derive(Debug)]
pub(crate) struct Conn<S> {
    io: S,
    buf: BytesMut,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Conn<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            buf: BytesMut::new(),
        }
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        self.io
            .write_all(bytes)
            .await
            .stream_context()?;
        self.io.flush().await.stream_context()
    }

    async fn fill(&mut self) -> Result<usize, NetError> {
        self.buf.reserve(READ_CHUNK);
        self.io
            .read_buf(&mut self.buf)
            .await
            .stream_context()
    }

    /// Read the final response head, skipping 1xx interim responses.
    pub async fn read_head(&mut self, trace: &ClientTrace) -> Result<ResponseHead, NetError> {
        let mut first_byte = true;
        loop {
            if let Some((head, len)) = parse_head(&self.buf)? {
                self.buf.advance(len);
                if head.status.is_informational() && head.status != StatusCode::SWITCHING_PROTOCOLS
                {
                    tracing::trace!(status = %head.status, "skipping interim response");
                    continue;
                }
                return Ok(head);
            }
            if self.buf.len() > MAX_HEAD_BYTES {
                return Err(NetError::ResponseHeadersTooBig);
            }
            if self.fill().await? == 0 {
                return Err(if self.buf.is_empty() {
                    NetError::EmptyResponse
                } else {
                    NetError::InvalidHttpResponse("connection closed inside response head".into())
                });
            }
            if first_byte {
                trace.got_first_response_byte();
                first_byte = false;
            }
        }
    }

    /// A line without its terminator. Bare `\n` is accepted.
    async fn read_line(&mut self) -> Result<BytesMut, NetError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let mut line = self.buf.split_to(pos);
                self.buf.advance(1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(line);
            }
            if self.buf.len() > MAX_LINE {
                return Err(NetError::InvalidChunkedEncoding);
            }
            if self.fill().await? == 0 {
                return Err(NetError::InvalidChunkedEncoding);
            }
        }
    }
}

fn parse_head(buf: &[u8]) -> Result<Option<(ResponseHead, usize)>, NetError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut slots);
    let len = match resp.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => return Err(NetError::ResponseHeadersTooBig),
        Err(e) => return Err(NetError::InvalidHttpResponse(e.to_string())),
    };

    let status = resp
        .code
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(|| NetError::InvalidHttpResponse("bad status code".into()))?;
    let version = match resp.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };
    let mut headers = OrderedHeaders::new();
    for h in resp.headers.iter() {
        headers.add(h.name, String::from_utf8_lossy(h.value).into_owned());
    }
    Ok(Some((
        ResponseHead {
            status,
            version,
            headers,
        },
        len,
    )))
}

/// How the response body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    Empty,
    Length(u64),
    Chunked,
    Close,
}

/// RFC 9112 §6.3 message body length.
pub(crate) fn framing(method: &Method, head: &ResponseHead) -> Result<Framing, NetError> {
    if *method == Method::HEAD
        || head.status.is_informational()
        || head.status == StatusCode::NO_CONTENT
        || head.status == StatusCode::NOT_MODIFIED
    {
        return Ok(Framing::Empty);
    }

    let te = head.headers.get_all("transfer-encoding");
    if !te.is_empty() {
        let last = te
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .last();
        return Ok(match last {
            Some(t) if t.eq_ignore_ascii_case("chunked") => Framing::Chunked,
            _ => Framing::Close,
        });
    }

    let mut length = None;
    for raw in head
        .headers
        .get_all("content-length")
        .iter()
        .flat_map(|v| v.split(','))
    {
        let n: u64 = raw
            .trim()
            .parse()
            .map_err(|_| NetError::InvalidHttpResponse(format!("bad Content-Length {raw:?}")))?;
        match length {
            Some(prev) if prev != n => return Err(NetError::ResponseHeadersMultipleContentLength),
            _ => length = Some(n),
        }
    }
    Ok(match length {
        Some(0) => Framing::Empty,
        Some(n) => Framing::Length(n),
        None => Framing::Close,
    })
}

fn has_token(headers: &OrderedHeaders, name: &str, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

pub(crate) fn is_chunked(headers: &OrderedHeaders) -> bool {
    has_token(headers, "transfer-encoding", "chunked")
}

/// Whether the connection may serve another request once this exchange ends.
pub(crate) fn keep_alive(request: &OrderedHeaders, response: &ResponseHead) -> bool {
    if has_token(request, "connection", "close") || has_token(&response.headers, "connection", "close")
    {
        return false;
    }
    response.version == Version::HTTP_11 || has_token(&response.headers, "connection", "keep-alive")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chunk {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Length(u64),
    Chunked(Chunk),
    Close,
    Done,
}

/// Raw (still content-encoded) response body reader.
#[derive(Debug)]
pub(crate) struct H1Body<S> {
    conn: Option<Conn<S>>,
    state: BodyState,
    reusable: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> H1Body<S> {
    pub fn new(conn: Conn<S>, framing: Framing, reusable: bool) -> Self {
        let state = match framing {
            Framing::Empty => BodyState::Done,
            Framing::Length(n) => BodyState::Length(n),
            Framing::Chunked => BodyState::Chunked(Chunk::Size),
            Framing::Close => BodyState::Close,
        };
        Self {
            conn: Some(conn),
            state,
            reusable: reusable && framing != Framing::Close,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == BodyState::Done
    }

    /// Next slice of body bytes; `None` at the end of the body.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, NetError> {
        loop {
            let Some(conn) = self.conn.as_mut() else {
                return Ok(None);
            };
            match self.state {
                BodyState::Done => return Ok(None),
                BodyState::Length(0) => self.state = BodyState::Done,
                BodyState::Length(remaining) => {
                    if conn.buf.is_empty() && conn.fill().await? == 0 {
                        return Err(NetError::ContentLengthMismatch);
                    }
                    let n = remaining.min(conn.buf.len() as u64);
                    let data = conn.buf.split_to(n as usize).freeze();
                    self.state = match remaining - n {
                        0 => BodyState::Done,
                        left => BodyState::Length(left),
                    };
                    return Ok(Some(data));
                }
                BodyState::Close => {
                    if conn.buf.is_empty() {
                        match conn.fill().await {
                            Ok(0) | Err(NetError::ConnectionClosed) => {
                                self.state = BodyState::Done;
                                return Ok(None);
                            }
                            Ok(_) => {}
                            Err(e) => return Err(e),
                        }
                    }
                    return Ok(Some(conn.buf.split().freeze()));
                }
                BodyState::Chunked(Chunk::Size) => {
                    let line = conn.read_line().await?;
                    let size = parse_chunk_size(&line)?;
                    self.state = BodyState::Chunked(if size == 0 {
                        Chunk::Trailers
                    } else {
                        Chunk::Data(size)
                    });
                }
                BodyState::Chunked(Chunk::Data(remaining)) => {
                    if conn.buf.is_empty() && conn.fill().await? == 0 {
                        return Err(NetError::InvalidChunkedEncoding);
                    }
                    let n = remaining.min(conn.buf.len() as u64);
                    let data = conn.buf.split_to(n as usize).freeze();
                    self.state = BodyState::Chunked(match remaining - n {
                        0 => Chunk::DataEnd,
                        left => Chunk::Data(left),
                    });
                    return Ok(Some(data));
                }
                BodyState::Chunked(Chunk::DataEnd) => {
                    if !conn.read_line().await?.is_empty() {
                        return Err(NetError::InvalidChunkedEncoding);
                    }
                    self.state = BodyState::Chunked(Chunk::Size);
                }
                BodyState::Chunked(Chunk::Trailers) => {
                    if conn.read_line().await?.is_empty() {
                        self.state = BodyState::Done;
                    }
                }
            }
        }
    }

    /// The connection, once the body has ended cleanly and the exchange
    /// allows reuse. Leftover bytes make it unusable.
    pub fn take_reusable(&mut self) -> Option<S> {
        if !self.is_done() || !self.reusable {
            return None;
        }
        let conn = self.conn.take()?;
        conn.buf.is_empty().then_some(conn.io)
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64, NetError> {
    let end = line.iter().position(|b| *b == b';').unwrap_or(line.len());
    let digits = std::str::from_utf8(&line[..end])
        .map_err(|_| NetError::InvalidChunkedEncoding)?
        .trim_matches(|c| c == ' ' || c == '\t');
    if digits.is_empty() {
        return Err(NetError::InvalidChunkedEncoding);
    }
    u64::from_str_radix(digits, 16).map_err(|_| NetError::InvalidChunkedEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};
    use url::Url;

    async fn conn_with(response: &'static [u8]) -> Conn<DuplexStream> {
        let (client, mut server) = duplex(64 * 1024);
        server.write_all(response).await.unwrap();
        drop(server);
        Conn::new(client)
    }

    async fn read_body(body: &mut H1Body<DuplexStream>) -> Result<Vec<u8>, NetError> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    #[test]
    fn test_encode_request_keeps_casing_and_order() {
        let url = Url::parse("http://example.com/path?x=1").unwrap();
        let mut headers = OrderedHeaders::new();
        headers.set("user-AGENT", "ua");
        headers.set("Host", "example.com");
        headers.set("Content-Length", "5");
        let head = RequestHead {
            method: &Method::POST,
            url: &url,
            headers: &headers,
            absolute_form: false,
        };
        let bytes = encode_request(&head, &"hello".into(), &ClientTrace::new()).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "POST /path?x=1 HTTP/1.1\r\nHost: example.com\r\nuser-AGENT: ua\r\nContent-Length: 5\r\n\r\nhello"
        );
    }

    #[test]
    fn test_encode_chunked_request() {
        let url = Url::parse("http://example.com/").unwrap();
        let mut headers = OrderedHeaders::new();
        headers.set("Transfer-Encoding", "chunked");
        let head = RequestHead {
            method: &Method::PUT,
            url: &url,
            headers: &headers,
            absolute_form: false,
        };
        let bytes = encode_request(&head, &"abc".into(), &ClientTrace::new()).unwrap();
        assert!(bytes.ends_with(b"\r\n\r\n3\r\nabc\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_content_length_body_is_reusable() {
        let mut conn = conn_with(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await;
        let head = conn.read_head(&ClientTrace::new()).await.unwrap();
        assert_eq!(head.status, StatusCode::OK);
        let framing = framing(&Method::GET, &head).unwrap();
        assert_eq!(framing, Framing::Length(5));
        let reusable = keep_alive(&OrderedHeaders::new(), &head);
        let mut body = H1Body::new(conn, framing, reusable);
        assert_eq!(read_body(&mut body).await.unwrap(), b"hello");
        assert!(body.take_reusable().is_some());
    }

    #[tokio::test]
    async fn test_chunked_body_with_trailers() {
        let mut conn = conn_with(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4;ext=1\r\nWiki\r\n5\r\npedia\r\n0\r\nX-Trailer: 1\r\n\r\n",
        )
        .await;
        let head = conn.read_head(&ClientTrace::new()).await.unwrap();
        let mut body = H1Body::new(conn, framing(&Method::GET, &head).unwrap(), true);
        assert_eq!(read_body(&mut body).await.unwrap(), b"Wikipedia");
        assert!(body.is_done());
    }

    #[tokio::test]
    async fn test_interim_response_skipped() {
        let mut conn = conn_with(
            b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 204 No Content\r\nX-A: 1\r\n\r\n",
        )
        .await;
        let head = conn.read_head(&ClientTrace::new()).await.unwrap();
        assert_eq!(head.status, StatusCode::NO_CONTENT);
        assert_eq!(head.headers.get("x-a"), Some("1"));
        assert_eq!(framing(&Method::GET, &head).unwrap(), Framing::Empty);
    }

    #[tokio::test]
    async fn test_read_to_close_not_reusable() {
        let mut conn = conn_with(b"HTTP/1.0 200 OK\r\n\r\nuntil close").await;
        let head = conn.read_head(&ClientTrace::new()).await.unwrap();
        let framing = framing(&Method::GET, &head).unwrap();
        assert_eq!(framing, Framing::Close);
        assert!(!keep_alive(&OrderedHeaders::new(), &head));
        let mut body = H1Body::new(conn, framing, true);
        assert_eq!(read_body(&mut body).await.unwrap(), b"until close");
        assert!(body.take_reusable().is_none());
    }

    #[tokio::test]
    async fn test_truncated_length_body() {
        let mut conn = conn_with(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort").await;
        let head = conn.read_head(&ClientTrace::new()).await.unwrap();
        let mut body = H1Body::new(conn, framing(&Method::GET, &head).unwrap(), true);
        assert_eq!(
            read_body(&mut body).await.unwrap_err(),
            NetError::ContentLengthMismatch
        );
    }

    #[tokio::test]
    async fn test_conflicting_content_lengths() {
        let mut conn =
            conn_with(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\nabcd").await;
        let head = conn.read_head(&ClientTrace::new()).await.unwrap();
        assert_eq!(
            framing(&Method::GET, &head).unwrap_err(),
            NetError::ResponseHeadersMultipleContentLength
        );
    }

    #[tokio::test]
    async fn test_empty_response() {
        let mut conn = conn_with(b"").await;
        assert_eq!(
            conn.read_head(&ClientTrace::new()).await.unwrap_err(),
            NetError::EmptyResponse
        );
    }

    #[test]
    fn test_connection_close_disables_reuse() {
        let head = ResponseHead {
            status: StatusCode::OK,
            version: Version::HTTP_11,
            headers: [("Connection", "close")].into_iter().collect(),
        };
        assert!(!keep_alive(&OrderedHeaders::new(), &head));
        let head = ResponseHead {
            headers: OrderedHeaders::new(),
            ..head
        };
        let request: OrderedHeaders = [("Connection", "Close")].into_iter().collect();
        assert!(!keep_alive(&request, &head));
    }

    #[test]
    fn test_chunk_size_parsing() {
        assert_eq!(parse_chunk_size(b"1a").unwrap(), 26);
        assert_eq!(parse_chunk_size(b"0 ; name=value").unwrap(), 0);
        assert!(parse_chunk_size(b"").is_err());
        assert!(parse_chunk_size(b"zz").is_err());
    }
}
