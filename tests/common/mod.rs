//! Local servers and helpers shared by the integration tests.
#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wirenet::http::h2::frame::{self, Frame, PREFACE};

/// One request as a raw HTTP/1.1 server saw it.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// Field names in wire order, with wire casing.
    pub fn header_names(&self) -> Vec<String> {
        self.fields().into_iter().map(|(n, _)| n).collect()
    }

    /// Every value of `name` (case-insensitive), one per line.
    pub fn values(&self, name: &str) -> Vec<String> {
        self.fields()
            .into_iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
            .collect()
    }

    fn fields(&self) -> Vec<(String, String)> {
        self.head
            .lines()
            .skip(1)
            .filter(|l| !l.is_empty())
            .filter_map(|l| l.split_once(':'))
            .map(|(n, v)| (n.to_string(), v.trim().to_string()))
            .collect()
    }
}

/// A raw HTTP/1.1 keep-alive server.
pub struct H1Server {
    pub base: String,
    pub requests: Arc<Mutex<Vec<CapturedRequest>>>,
    pub connections: Arc<AtomicUsize>,
}

impl H1Server {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Route the client's `tracing` output through the test harness.
/// `RUST_LOG=wirenet=trace` shows per-field and per-frame events.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Start a server that answers every request with `respond(request)`.
pub async fn h1_server<F>(respond: F) -> H1Server
where
    F: Fn(&CapturedRequest) -> Vec<u8> + Send + Sync + 'static,
{
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));
    let connections = Arc::new(AtomicUsize::new(0));
    let respond = Arc::new(respond);

    let (reqs, conns) = (requests.clone(), connections.clone());
    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else {
                return;
            };
            conns.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve_h1(sock, reqs.clone(), respond.clone()));
        }
    });

    H1Server {
        base,
        requests,
        connections,
    }
}

async fn serve_h1<F>(
    mut sock: TcpStream,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    respond: Arc<F>,
) where
    F: Fn(&CapturedRequest) -> Vec<u8> + Send + Sync + 'static,
{
    let mut buf = Vec::new();
    loop {
        let Some(end) = read_until_head(&mut sock, &mut buf).await else {
            return;
        };
        let head = String::from_utf8_lossy(&buf[..end]).into_owned();
        buf.drain(..end);

        let len = content_length(&head);
        while buf.len() < len {
            let mut chunk = [0u8; 8192];
            match sock.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        let body: Vec<u8> = buf.drain(..len).collect();

        let request = CapturedRequest { head, body };
        let reply = respond(&request);
        requests.lock().unwrap().push(request);
        if sock.write_all(&reply).await.is_err() {
            return;
        }
    }
}

/// Read until a full head is buffered; returns its length.
async fn read_until_head(sock: &mut TcpStream, buf: &mut Vec<u8>) -> Option<usize> {
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            return Some(pos + 4);
        }
        let mut chunk = [0u8; 8192];
        match sock.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(n, _)| n.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(0)
}

/// A `200 OK` with a fixed-length body and extra header lines.
pub fn ok_response(extra_headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = b"HTTP/1.1 200 OK\r\n".to_vec();
    for (n, v) in extra_headers {
        out.extend_from_slice(format!("{n}: {v}\r\n").as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

/// Header blocks received by a raw HTTP/2 server, decoded in wire order.
pub type CapturedBlocks = Arc<Mutex<Vec<Vec<(String, String)>>>>;

/// A minimal prior-knowledge HTTP/2 server that records each request's
/// decoded header block and answers `200` with body `ok`.
pub async fn h2_capture_server() -> (String, CapturedBlocks) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let blocks: CapturedBlocks = Arc::new(Mutex::new(Vec::new()));

    let captured = blocks.clone();
    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(serve_h2_capture(sock, captured.clone()));
        }
    });
    (base, blocks)
}

async fn serve_h2_capture(mut sock: TcpStream, blocks: CapturedBlocks) {
    let mut preface = [0u8; 24];
    if sock.read_exact(&mut preface).await.is_err() || preface != PREFACE {
        return;
    }
    let mut out = BytesMut::new();
    frame::encode_settings(&mut out, &[]);
    if sock.write_all(&out).await.is_err() {
        return;
    }

    let mut decoder = hpack::Decoder::new();
    let mut encoder = hpack::Encoder::new();
    let mut buf = BytesMut::new();
    let mut pending: Vec<u8> = Vec::new();
    loop {
        let next = loop {
            match frame::decode(&mut buf, 1 << 20) {
                Ok(Some(f)) => break f,
                Ok(None) => {}
                Err(_) => return,
            }
            let mut chunk = [0u8; 16384];
            match sock.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        };

        let mut out = BytesMut::new();
        let finished = match next {
            Frame::Settings { ack: false, .. } => {
                frame::encode_settings_ack(&mut out);
                None
            }
            Frame::Headers {
                stream_id,
                end_headers,
                block,
                ..
            } => {
                pending.extend_from_slice(&block);
                end_headers.then_some(stream_id)
            }
            Frame::Continuation {
                stream_id,
                end_headers,
                block,
            } => {
                pending.extend_from_slice(&block);
                end_headers.then_some(stream_id)
            }
            Frame::GoAway { .. } => return,
            _ => None,
        };

        if let Some(stream_id) = finished {
            let fields = decoder
                .decode(&pending)
                .unwrap()
                .into_iter()
                .map(|(n, v)| {
                    (
                        String::from_utf8(n).unwrap(),
                        String::from_utf8(v).unwrap(),
                    )
                })
                .collect();
            pending.clear();
            blocks.lock().unwrap().push(fields);

            let block = encoder.encode(vec![(&b":status"[..], &b"200"[..])]);
            frame::encode_headers(&mut out, stream_id, &block, false, 16384);
            frame::encode_data(&mut out, stream_id, b"ok", true);
        }
        if !out.is_empty() && sock.write_all(&out).await.is_err() {
            return;
        }
    }
}

/// An `h2` crate server. Each response reports how many request body bytes
/// arrived, in the `x-received` field and as the body.
pub async fn h2_server() -> String {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        loop {
            let Ok((sock, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let Ok(mut conn) = h2::server::handshake(sock).await else {
                    return;
                };
                while let Some(Ok((req, mut respond))) = conn.accept().await {
                    tokio::spawn(async move {
                        let mut body = req.into_body();
                        let mut received = 0usize;
                        while let Some(Ok(chunk)) = body.data().await {
                            received += chunk.len();
                            let _ = body.flow_control().release_capacity(chunk.len());
                        }
                        let response = http::Response::builder()
                            .status(200)
                            .header("x-received", received.to_string())
                            .body(())
                            .unwrap();
                        if let Ok(mut send) = respond.send_response(response, false) {
                            let _ = send.send_data(Bytes::from(received.to_string()), true);
                        }
                    });
                }
            });
        }
    });
    base
}

/// Cipher suites and extensions of a captured ClientHello.
#[derive(Debug, Clone)]
pub struct HelloSummary {
    pub cipher_suites: Vec<u16>,
    pub extensions: Vec<u16>,
}

/// Accept one connection and return the ClientHello it opens with, then
/// drop the connection.
pub async fn capture_client_hello() -> (u16, tokio::task::JoinHandle<HelloSummary>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut header = [0u8; 5];
        sock.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], 0x16, "expected a handshake record");
        let len = u16::from_be_bytes([header[3], header[4]]) as usize;
        let mut record = vec![0u8; len];
        sock.read_exact(&mut record).await.unwrap();
        parse_client_hello(&record)
    });
    (port, handle)
}

/// Parse the handshake message of a ClientHello record.
pub fn parse_client_hello(msg: &[u8]) -> HelloSummary {
    assert_eq!(msg[0], 0x01, "expected ClientHello");
    // type(1) length(3) version(2) random(32)
    let mut pos = 4 + 2 + 32;
    let session_id_len = msg[pos] as usize;
    pos += 1 + session_id_len;

    let suites_len = u16::from_be_bytes([msg[pos], msg[pos + 1]]) as usize;
    pos += 2;
    let cipher_suites = msg[pos..pos + suites_len]
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    pos += suites_len;

    let compression_len = msg[pos] as usize;
    pos += 1 + compression_len;

    let ext_total = u16::from_be_bytes([msg[pos], msg[pos + 1]]) as usize;
    pos += 2;
    let end = pos + ext_total;
    let mut extensions = Vec::new();
    while pos + 4 <= end {
        let ty = u16::from_be_bytes([msg[pos], msg[pos + 1]]);
        let len = u16::from_be_bytes([msg[pos + 2], msg[pos + 3]]) as usize;
        extensions.push(ty);
        pos += 4 + len;
    }
    HelloSummary {
        cipher_suites,
        extensions,
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut e = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    e.write_all(data).unwrap();
    e.finish().unwrap()
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut e = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    e.write_all(data).unwrap();
    e.finish().unwrap()
}

pub fn brotli(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut w = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
        w.write_all(data).unwrap();
    }
    out
}

pub fn zstd(data: &[u8]) -> Vec<u8> {
    zstd::stream::encode_all(data, 3).unwrap()
}
