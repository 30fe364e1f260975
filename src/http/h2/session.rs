//! Multiplexed HTTP/2 session.
//!
//! One driver task owns the connection. [`H2Session`] handles are cheap
//! clones that submit requests over a channel; the driver allocates stream
//! ids, HPACK-encodes header blocks in stream order, enforces flow control
//! and routes response frames back through per-stream channels.

use super::frame::{self, reason, Frame, MAX_WINDOW, PREFACE};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::base::trace::ClientTrace;
use crate::http::h2settings::{SettingId, H2Settings, DEFAULT_MAX_FRAME_SIZE, DEFAULT_WINDOW_SIZE};
use crate::http::orderedheaders::OrderedHeaders;
use crate::socket::pool::SlotGuard;
use bytes::{Bytes, BytesMut};
use http::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// Request fields in wire order, pseudo-headers first.
pub(crate) type Fields = Vec<(String, String)>;

type DataResult = Result<Bytes, NetError>;

const MAX_STREAM_ID: u32 = (1 << 31) - 1;
const MAX_HEADER_BLOCK: usize = 1024 * 1024;
const READ_CHUNK: usize = 16 * 1024;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

enum Command {
    Request(Box<PendingRequest>),
    /// The body consumed `len` bytes; credit flow-control windows.
    Consumed { key: u64, len: usize },
    /// The caller is no longer interested in the stream.
    Cancel { key: u64 },
}

struct PendingRequest {
    key: u64,
    fields: Fields,
    body: Bytes,
    sent: oneshot::Sender<()>,
    reply: oneshot::Sender<Result<ResponseParts, NetError>>,
}

struct ResponseParts {
    status: StatusCode,
    headers: OrderedHeaders,
    data: mpsc::UnboundedReceiver<DataResult>,
}

#[derive(Debug)]
struct Shared {
    id: u64,
    closed: AtomicBool,
    going_away: AtomicBool,
    active: AtomicUsize,
    idle_since: Mutex<Instant>,
    next_key: AtomicU64,
}

/// Handle to a live HTTP/2 connection.
#[derive(Debug, Clone)]
pub struct H2Session {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Request(r) => write!(f, "Request({})", r.key),
            Command::Consumed { key, len } => write!(f, "Consumed({key}, {len})"),
            Command::Cancel { key } => write!(f, "Cancel({key})"),
        }
    }
}

/// Response head from an HTTP/2 stream.
#[derive(Debug)]
pub(crate) struct H2Response {
    pub status: StatusCode,
    pub headers: OrderedHeaders,
    pub body: H2Body,
}

impl H2Session {
    /// Send the connection preface, our SETTINGS in profile order and the
    /// connection WINDOW_UPDATE, then start the driver.
    ///
    /// `slot` is held by the driver and released when the connection ends.
    pub(crate) async fn handshake<S>(
        mut io: S,
        settings: &H2Settings,
        slot: Option<SlotGuard>,
    ) -> Result<Self, NetError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut buf = BytesMut::with_capacity(128);
        buf.extend_from_slice(PREFACE);
        let entries: Vec<(u16, u32)> = settings
            .entries()
            .into_iter()
            .map(|(id, value)| (id as u16, value))
            .collect();
        frame::encode_settings(&mut buf, &entries);
        if settings.connection_window_increment > 0 {
            frame::encode_window_update(&mut buf, 0, settings.connection_window_increment);
        }
        io.write_all(&buf).await.stream_context()?;
        io.flush().await.stream_context()?;

        let shared = Arc::new(Shared {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            closed: AtomicBool::new(false),
            going_away: AtomicBool::new(false),
            active: AtomicUsize::new(0),
            idle_since: Mutex::new(Instant::now()),
            next_key: AtomicU64::new(1),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        tracing::debug!(session = shared.id, settings = ?entries, "http2 session started");

        let driver = Driver {
            io,
            rx,
            rx_open: true,
            shared: shared.clone(),
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            encoder: hpack::Encoder::new(),
            decoder: hpack::Decoder::new(),
            streams: HashMap::new(),
            keys: HashMap::new(),
            queued: VecDeque::new(),
            next_stream_id: 1,
            peer_max_streams: None,
            peer_initial_window: i64::from(DEFAULT_WINDOW_SIZE),
            peer_max_frame: DEFAULT_MAX_FRAME_SIZE,
            local_stream_window: settings.stream_window(),
            local_max_frame: settings.local_max_frame_size(),
            local_conn_window: settings.connection_window(),
            conn_send_window: i64::from(DEFAULT_WINDOW_SIZE),
            conn_recv_window: i64::from(settings.connection_window()),
            conn_unacked: 0,
            continuation: None,
            goaway: None,
            _slot: slot,
        };
        tokio::spawn(driver.run());
        Ok(Self { tx, shared })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Open and not draining: new streams may be started.
    pub fn is_usable(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire)
            && !self.shared.going_away.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Streams open or queued.
    pub fn active_streams(&self) -> usize {
        self.shared.active.load(Ordering::Acquire)
    }

    /// How long the session has had no streams; `None` while busy.
    pub fn idle_for(&self) -> Option<Duration> {
        if self.active_streams() > 0 {
            return None;
        }
        self.shared.idle_since.lock().ok().map(|t| t.elapsed())
    }

    /// Send one request and wait for the response head.
    ///
    /// Dropping the returned future before it completes resets the stream.
    pub(crate) async fn send_request(
        &self,
        fields: Fields,
        body: Bytes,
        trace: &ClientTrace,
    ) -> Result<H2Response, NetError> {
        let key = self.shared.next_key.fetch_add(1, Ordering::Relaxed);
        let mut guard = CancelGuard {
            key,
            tx: &self.tx,
            armed: true,
        };
        let (sent_tx, sent_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Request(Box::new(PendingRequest {
                key,
                fields,
                body,
                sent: sent_tx,
                reply: reply_tx,
            })))
            .map_err(|_| NetError::ConnectionClosed)?;

        if sent_rx.await.is_ok() {
            trace.wrote_request();
        }
        let parts = reply_rx.await.map_err(|_| NetError::ConnectionClosed)??;
        guard.armed = false;
        trace.got_first_response_byte();

        Ok(H2Response {
            status: parts.status,
            headers: parts.headers,
            body: H2Body {
                data: parts.data,
                key,
                tx: self.tx.clone(),
                done: false,
            },
        })
    }
}

struct CancelGuard<'a> {
    key: u64,
    tx: &'a mpsc::UnboundedSender<Command>,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.tx.send(Command::Cancel { key: self.key });
        }
    }
}

/// Raw DATA of one response stream.
///
/// Dropping the body before the end resets the stream with `CANCEL`.
#[derive(Debug)]
pub(crate) struct H2Body {
    data: mpsc::UnboundedReceiver<DataResult>,
    key: u64,
    tx: mpsc::UnboundedSender<Command>,
    done: bool,
}

impl H2Body {
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, NetError> {
        if self.done {
            return Ok(None);
        }
        match self.data.recv().await {
            Some(Ok(chunk)) => {
                let _ = self.tx.send(Command::Consumed {
                    key: self.key,
                    len: chunk.len(),
                });
                Ok(Some(chunk))
            }
            Some(Err(e)) => {
                self.done = true;
                Err(e)
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Drop for H2Body {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.tx.send(Command::Cancel { key: self.key });
        }
    }
}

struct Stream {
    key: u64,
    reply: Option<oneshot::Sender<Result<ResponseParts, NetError>>>,
    sent: Option<oneshot::Sender<()>>,
    data_tx: Option<mpsc::UnboundedSender<DataResult>>,
    pending_body: Bytes,
    send_window: i64,
    recv_window: i64,
    recv_unacked: u32,
    /// Delivered to the body but not yet consumed.
    buffered: usize,
    local_closed: bool,
    remote_closed: bool,
}

impl Stream {
    fn signal_sent(&mut self) {
        if let Some(sent) = self.sent.take() {
            let _ = sent.send(());
        }
    }

    fn is_open(&self) -> bool {
        !(self.local_closed && self.remote_closed)
    }

    fn is_finished(&self) -> bool {
        !self.is_open() && self.reply.is_none() && self.buffered == 0
    }

    fn fail(self, err: NetError) {
        if let Some(reply) = self.reply {
            let _ = reply.send(Err(err));
        } else if let Some(tx) = self.data_tx {
            let _ = tx.send(Err(err));
        }
    }
}

/// A header block being assembled from HEADERS/PUSH_PROMISE + CONTINUATION.
struct HeaderBlock {
    stream_id: u32,
    end_stream: bool,
    promised_id: Option<u32>,
    buf: BytesMut,
}

struct Driver<S> {
    io: S,
    rx: mpsc::UnboundedReceiver<Command>,
    rx_open: bool,
    shared: Arc<Shared>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    encoder: hpack::Encoder<'static>,
    decoder: hpack::Decoder<'static>,
    streams: HashMap<u32, Stream>,
    keys: HashMap<u64, u32>,
    queued: VecDeque<Box<PendingRequest>>,
    next_stream_id: u32,
    peer_max_streams: Option<u32>,
    peer_initial_window: i64,
    peer_max_frame: u32,
    local_stream_window: u32,
    local_max_frame: u32,
    local_conn_window: u32,
    conn_send_window: i64,
    conn_recv_window: i64,
    conn_unacked: u32,
    continuation: Option<HeaderBlock>,
    goaway: Option<u32>,
    _slot: Option<SlotGuard>,
}

fn goaway_code(err: &NetError) -> Option<u32> {
    match err {
        NetError::Http2ProtocolError(_) => Some(reason::PROTOCOL_ERROR),
        NetError::Http2FlowControlError => Some(reason::FLOW_CONTROL_ERROR),
        NetError::Http2FrameSizeError => Some(reason::FRAME_SIZE_ERROR),
        NetError::Http2CompressionError => Some(reason::COMPRESSION_ERROR),
        NetError::ResponseHeadersTooBig => Some(reason::PROTOCOL_ERROR),
        _ => None,
    }
}

impl<S> Driver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self) {
        let err = match self.drive().await {
            Ok(()) => NetError::ConnectionClosed,
            Err(e) => {
                tracing::warn!(session = self.shared.id, error = %e, "http2 session failed, discarding connection");
                if let Some(code) = goaway_code(&e) {
                    frame::encode_goaway(&mut self.write_buf, 0, code);
                    let _ = self.flush().await;
                }
                e
            }
        };
        self.shared.closed.store(true, Ordering::Release);
        tracing::debug!(session = self.shared.id, error = %err, "http2 session closed");

        let queued_err = match self.goaway {
            Some(code) => NetError::Http2GoAway(code),
            None => err.clone(),
        };
        for (_, stream) in self.streams.drain() {
            stream.fail(err.clone());
        }
        for req in self.queued.drain(..) {
            let _ = req.reply.send(Err(queued_err.clone()));
        }
        self.shared.active.store(0, Ordering::Release);
    }

    async fn drive(&mut self) -> Result<(), NetError> {
        loop {
            self.flush().await?;
            if self.streams.is_empty() && self.queued.is_empty() {
                if !self.rx_open {
                    frame::encode_goaway(&mut self.write_buf, 0, reason::NO_ERROR);
                    self.flush().await?;
                    return Ok(());
                }
                if self.goaway.is_some() {
                    return Ok(());
                }
            }

            self.read_buf.reserve(READ_CHUNK);
            tokio::select! {
                cmd = self.rx.recv(), if self.rx_open => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => self.rx_open = false,
                },
                res = self.io.read_buf(&mut self.read_buf) => {
                    let n = res.stream_context()?;
                    if n == 0 {
                        return Err(NetError::ConnectionClosed);
                    }
                    while let Some(frame) = frame::decode(&mut self.read_buf, self.local_max_frame)? {
                        self.on_frame(frame)?;
                    }
                }
            }
            self.reap();
        }
    }

    async fn flush(&mut self) -> Result<(), NetError> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.io
            .write_all(&self.write_buf)
            .await
            .stream_context()?;
        self.write_buf.clear();
        self.io.flush().await.stream_context()
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Request(req) => self.start_request(req),
            Command::Consumed { key, len } => {
                self.release_conn(len as u32);
                if let Some(stream) = self.keys.get(&key).and_then(|id| self.streams.get_mut(id)) {
                    stream.buffered = stream.buffered.saturating_sub(len);
                }
                if let Some(&id) = self.keys.get(&key) {
                    self.release_stream(id, len as u32);
                }
            }
            Command::Cancel { key } => self.cancel(key),
        }
    }

    fn open_streams(&self) -> usize {
        self.streams.values().filter(|s| s.is_open()).count()
    }

    fn at_stream_limit(&self) -> bool {
        self.peer_max_streams
            .is_some_and(|max| self.open_streams() >= max as usize)
    }

    fn start_request(&mut self, req: Box<PendingRequest>) {
        if let Some(code) = self.goaway {
            let _ = req.reply.send(Err(NetError::Http2GoAway(code)));
            return;
        }
        if req.reply.is_closed() {
            return;
        }
        if self.at_stream_limit() {
            tracing::trace!(session = self.shared.id, "stream limit reached, queueing request");
            self.queued.push_back(req);
            self.update_active();
            return;
        }
        self.open_stream(req);
    }

    fn open_stream(&mut self, req: Box<PendingRequest>) {
        let id = self.next_stream_id;
        if id > MAX_STREAM_ID {
            self.goaway = Some(reason::NO_ERROR);
            self.shared.going_away.store(true, Ordering::Release);
            let _ = req.reply.send(Err(NetError::Http2GoAway(reason::NO_ERROR)));
            return;
        }
        self.next_stream_id += 2;

        let PendingRequest {
            key,
            fields,
            body,
            sent,
            reply,
        } = *req;
        let block = self
            .encoder
            .encode(fields.iter().map(|(n, v)| (n.as_bytes(), v.as_bytes())));
        let end_stream = body.is_empty();
        frame::encode_headers(
            &mut self.write_buf,
            id,
            &block,
            end_stream,
            self.peer_max_frame as usize,
        );
        tracing::trace!(session = self.shared.id, stream = id, fields = fields.len(), "HEADERS");

        let mut stream = Stream {
            key,
            reply: Some(reply),
            sent: Some(sent),
            data_tx: None,
            pending_body: body,
            send_window: self.peer_initial_window,
            recv_window: i64::from(self.local_stream_window),
            recv_unacked: 0,
            buffered: 0,
            local_closed: end_stream,
            remote_closed: false,
        };
        if end_stream {
            stream.signal_sent();
        }
        self.keys.insert(key, id);
        self.streams.insert(id, stream);
        self.send_pending_data();
        self.update_active();
    }

    fn open_queued(&mut self) {
        while !self.at_stream_limit() && self.goaway.is_none() {
            let Some(req) = self.queued.pop_front() else {
                break;
            };
            if !req.reply.is_closed() {
                self.open_stream(req);
            }
        }
    }

    /// Frame as much pending request body as the send windows allow.
    fn send_pending_data(&mut self) {
        for (&id, stream) in self.streams.iter_mut() {
            while !stream.pending_body.is_empty() {
                let n = (stream.pending_body.len() as i64)
                    .min(stream.send_window)
                    .min(self.conn_send_window)
                    .min(i64::from(self.peer_max_frame));
                if n <= 0 {
                    break;
                }
                let chunk = stream.pending_body.split_to(n as usize);
                let last = stream.pending_body.is_empty();
                frame::encode_data(&mut self.write_buf, id, &chunk, last);
                stream.send_window -= n;
                self.conn_send_window -= n;
                if last {
                    stream.local_closed = true;
                    stream.signal_sent();
                }
            }
        }
    }

    fn release_conn(&mut self, len: u32) {
        self.conn_unacked = self.conn_unacked.saturating_add(len);
        if self.conn_unacked >= self.local_conn_window / 2 {
            frame::encode_window_update(&mut self.write_buf, 0, self.conn_unacked);
            self.conn_recv_window += i64::from(self.conn_unacked);
            self.conn_unacked = 0;
        }
    }

    fn release_stream(&mut self, id: u32, len: u32) {
        let Some(stream) = self.streams.get_mut(&id) else {
            return;
        };
        if stream.remote_closed {
            return;
        }
        stream.recv_unacked = stream.recv_unacked.saturating_add(len);
        if stream.recv_unacked >= self.local_stream_window / 2 {
            frame::encode_window_update(&mut self.write_buf, id, stream.recv_unacked);
            stream.recv_window += i64::from(stream.recv_unacked);
            stream.recv_unacked = 0;
        }
    }

    fn cancel(&mut self, key: u64) {
        if let Some(pos) = self.queued.iter().position(|r| r.key == key) {
            self.queued.remove(pos);
            self.update_active();
            return;
        }
        let Some(id) = self.keys.remove(&key) else {
            return;
        };
        if let Some(stream) = self.streams.remove(&id) {
            if stream.is_open() {
                tracing::trace!(session = self.shared.id, stream = id, "RST_STREAM(CANCEL)");
                frame::encode_rst_stream(&mut self.write_buf, id, reason::CANCEL);
            }
            self.release_conn(stream.buffered as u32);
        }
        self.open_queued();
        self.update_active();
    }

    /// Drop streams that are closed in both directions and fully consumed.
    fn reap(&mut self) {
        let done: Vec<u32> = self
            .streams
            .iter()
            .filter(|(_, s)| s.is_finished())
            .map(|(id, _)| *id)
            .collect();
        if done.is_empty() {
            return;
        }
        for id in done {
            if let Some(stream) = self.streams.remove(&id) {
                self.keys.remove(&stream.key);
            }
        }
        self.open_queued();
        self.update_active();
    }

    fn update_active(&self) {
        let active = self.streams.len() + self.queued.len();
        self.shared.active.store(active, Ordering::Release);
        if active == 0 {
            if let Ok(mut since) = self.shared.idle_since.lock() {
                *since = Instant::now();
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Result<(), NetError> {
        if self.continuation.is_some() && !matches!(frame, Frame::Continuation { .. }) {
            return Err(NetError::Http2ProtocolError(
                "expected CONTINUATION".into(),
            ));
        }

        match frame {
            Frame::Data {
                stream_id,
                end_stream,
                data,
                flow_len,
            } => self.on_data(stream_id, end_stream, data, flow_len)?,
            Frame::Headers {
                stream_id,
                end_stream,
                end_headers,
                block,
            } => {
                self.continuation = Some(HeaderBlock {
                    stream_id,
                    end_stream,
                    promised_id: None,
                    buf: BytesMut::from(&block[..]),
                });
                if end_headers {
                    self.finish_header_block()?;
                }
            }
            Frame::PushPromise {
                stream_id,
                promised_id,
                end_headers,
                block,
            } => {
                self.continuation = Some(HeaderBlock {
                    stream_id,
                    end_stream: false,
                    promised_id: Some(promised_id),
                    buf: BytesMut::from(&block[..]),
                });
                if end_headers {
                    self.finish_header_block()?;
                }
            }
            Frame::Continuation {
                stream_id,
                end_headers,
                block,
            } => {
                let Some(pending) = self.continuation.as_mut() else {
                    return Err(NetError::Http2ProtocolError(
                        "unexpected CONTINUATION".into(),
                    ));
                };
                if pending.stream_id != stream_id {
                    return Err(NetError::Http2ProtocolError(
                        "CONTINUATION on another stream".into(),
                    ));
                }
                pending.buf.extend_from_slice(&block);
                if pending.buf.len() > MAX_HEADER_BLOCK {
                    return Err(NetError::ResponseHeadersTooBig);
                }
                if end_headers {
                    self.finish_header_block()?;
                }
            }
            Frame::RstStream { stream_id, code } => self.on_reset(stream_id, code),
            Frame::Settings { ack: true, .. } => {}
            Frame::Settings {
                ack: false,
                entries,
            } => self.apply_settings(&entries)?,
            Frame::Ping {
                ack: false,
                payload,
            } => frame::encode_ping_ack(&mut self.write_buf, payload),
            Frame::Ping { ack: true, .. } => {}
            Frame::GoAway {
                last_stream_id,
                code,
            } => self.on_goaway(last_stream_id, code),
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => self.on_window_update(stream_id, increment)?,
            Frame::Ignored => {}
        }
        Ok(())
    }

    fn on_data(
        &mut self,
        id: u32,
        end_stream: bool,
        data: Bytes,
        flow_len: u32,
    ) -> Result<(), NetError> {
        self.conn_recv_window -= i64::from(flow_len);
        if self.conn_recv_window < 0 {
            return Err(NetError::Http2FlowControlError);
        }
        let padding = flow_len - data.len() as u32;

        let Some(stream) = self.streams.get_mut(&id) else {
            self.release_conn(flow_len);
            return Ok(());
        };
        stream.recv_window -= i64::from(flow_len);
        if stream.recv_window < 0 || stream.reply.is_some() {
            let err = if stream.recv_window < 0 {
                (reason::FLOW_CONTROL_ERROR, NetError::Http2FlowControlError)
            } else {
                (
                    reason::PROTOCOL_ERROR,
                    NetError::Http2ProtocolError("DATA before HEADERS".into()),
                )
            };
            self.reset_stream(id, err.0, err.1);
            self.release_conn(flow_len);
            return Ok(());
        }

        let len = data.len();
        let delivered = match &stream.data_tx {
            Some(tx) if len > 0 => tx.send(Ok(data)).is_ok(),
            _ => false,
        };
        if delivered {
            stream.buffered += len;
        }
        if end_stream {
            stream.remote_closed = true;
            stream.data_tx = None;
            self.finish_request_body(id);
        }
        let unconsumed = if delivered { padding } else { flow_len };
        if unconsumed > 0 {
            self.release_conn(unconsumed);
            self.release_stream(id, unconsumed);
        }
        Ok(())
    }

    /// The peer ended its side; an unsent request body is abandoned.
    fn finish_request_body(&mut self, id: u32) {
        let Some(stream) = self.streams.get_mut(&id) else {
            return;
        };
        if !stream.local_closed {
            stream.pending_body = Bytes::new();
            stream.local_closed = true;
            stream.signal_sent();
            frame::encode_rst_stream(&mut self.write_buf, id, reason::NO_ERROR);
        }
    }

    fn reset_stream(&mut self, id: u32, code: u32, err: NetError) {
        if let Some(stream) = self.streams.remove(&id) {
            self.keys.remove(&stream.key);
            frame::encode_rst_stream(&mut self.write_buf, id, code);
            stream.fail(err);
        }
        self.update_active();
    }

    fn finish_header_block(&mut self) -> Result<(), NetError> {
        let Some(block) = self.continuation.take() else {
            return Ok(());
        };
        let fields = self
            .decoder
            .decode(&block.buf)
            .map_err(|_| NetError::Http2CompressionError)?;

        if let Some(promised) = block.promised_id {
            tracing::trace!(session = self.shared.id, stream = promised, "refusing pushed stream");
            frame::encode_rst_stream(&mut self.write_buf, promised, reason::REFUSED_STREAM);
            return Ok(());
        }
        self.on_headers(block.stream_id, fields, block.end_stream);
        Ok(())
    }

    fn on_headers(&mut self, id: u32, fields: Vec<(Vec<u8>, Vec<u8>)>, end_stream: bool) {
        let Some(stream) = self.streams.get_mut(&id) else {
            return;
        };

        if stream.reply.is_some() {
            let mut status = None;
            let mut headers = OrderedHeaders::new();
            for (name, value) in fields {
                let name = String::from_utf8_lossy(&name);
                let value = String::from_utf8_lossy(&value).into_owned();
                if name == ":status" {
                    status = value
                        .parse::<u16>()
                        .ok()
                        .and_then(|c| StatusCode::from_u16(c).ok());
                } else if !name.starts_with(':') {
                    headers.add(name.into_owned(), value);
                }
            }
            let Some(status) = status else {
                self.reset_stream(
                    id,
                    reason::PROTOCOL_ERROR,
                    NetError::Http2ProtocolError("response without :status".into()),
                );
                return;
            };
            if status.is_informational() {
                return;
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let parts = ResponseParts {
                status,
                headers,
                data: rx,
            };
            let delivered = stream
                .reply
                .take()
                .is_some_and(|reply| reply.send(Ok(parts)).is_ok());
            if !delivered {
                let key = stream.key;
                self.cancel(key);
                return;
            }
            stream.data_tx = Some(tx);
        }

        if end_stream {
            stream.remote_closed = true;
            stream.data_tx = None;
            self.finish_request_body(id);
        }
    }

    fn on_reset(&mut self, id: u32, code: u32) {
        let Some(stream) = self.streams.remove(&id) else {
            return;
        };
        self.keys.remove(&stream.key);
        tracing::debug!(session = self.shared.id, stream = id, code, "stream reset by peer");
        if !stream.remote_closed {
            let err = if code == reason::REFUSED_STREAM {
                NetError::Http2ServerRefusedStream
            } else {
                NetError::Http2StreamReset(code)
            };
            stream.fail(err);
        }
        self.open_queued();
        self.update_active();
    }

    fn apply_settings(&mut self, entries: &[(u16, u32)]) -> Result<(), NetError> {
        for &(id, value) in entries {
            match SettingId::from_u16(id) {
                Some(SettingId::MaxConcurrentStreams) => self.peer_max_streams = Some(value),
                Some(SettingId::InitialWindowSize) => {
                    if i64::from(value) > MAX_WINDOW {
                        return Err(NetError::Http2FlowControlError);
                    }
                    let delta = i64::from(value) - self.peer_initial_window;
                    for stream in self.streams.values_mut() {
                        stream.send_window += delta;
                        if stream.send_window > MAX_WINDOW {
                            return Err(NetError::Http2FlowControlError);
                        }
                    }
                    self.peer_initial_window = i64::from(value);
                }
                Some(SettingId::MaxFrameSize) => {
                    if !(16_384..=16_777_215).contains(&value) {
                        return Err(NetError::Http2ProtocolError(format!(
                            "invalid SETTINGS_MAX_FRAME_SIZE {value}"
                        )));
                    }
                    self.peer_max_frame = value;
                }
                Some(SettingId::EnablePush) if value > 1 => {
                    return Err(NetError::Http2ProtocolError(
                        "invalid SETTINGS_ENABLE_PUSH".into(),
                    ));
                }
                _ => {}
            }
        }
        frame::encode_settings_ack(&mut self.write_buf);
        self.send_pending_data();
        self.open_queued();
        Ok(())
    }

    fn on_goaway(&mut self, last_stream_id: u32, code: u32) {
        tracing::debug!(session = self.shared.id, last_stream_id, code, "GOAWAY received");
        self.goaway = Some(code);
        self.shared.going_away.store(true, Ordering::Release);

        let unprocessed: Vec<u32> = self
            .streams
            .keys()
            .copied()
            .filter(|id| *id > last_stream_id)
            .collect();
        for id in unprocessed {
            if let Some(stream) = self.streams.remove(&id) {
                self.keys.remove(&stream.key);
                stream.fail(NetError::Http2GoAway(code));
            }
        }
        for req in self.queued.drain(..) {
            let _ = req.reply.send(Err(NetError::Http2GoAway(code)));
        }
        self.update_active();
    }

    fn on_window_update(&mut self, id: u32, increment: u32) -> Result<(), NetError> {
        if id == 0 {
            if increment == 0 {
                return Err(NetError::Http2ProtocolError(
                    "zero connection WINDOW_UPDATE".into(),
                ));
            }
            self.conn_send_window += i64::from(increment);
            if self.conn_send_window > MAX_WINDOW {
                return Err(NetError::Http2FlowControlError);
            }
        } else if let Some(stream) = self.streams.get_mut(&id) {
            stream.send_window += i64::from(increment);
            if stream.send_window > MAX_WINDOW {
                self.reset_stream(id, reason::FLOW_CONTROL_ERROR, NetError::Http2FlowControlError);
                return Ok(());
            }
        }
        self.send_pending_data();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::duplex;

    fn fields(path: &str) -> Fields {
        vec![
            (":method".into(), "GET".into()),
            (":authority".into(), "example.test".into()),
            (":scheme".into(), "https".into()),
            (":path".into(), path.into()),
            ("user-agent".into(), "wirenet-test".into()),
        ]
    }

    /// An `h2` server that answers every request with its path as the body.
    fn spawn_echo_server(io: tokio::io::DuplexStream) {
        tokio::spawn(async move {
            let mut conn = h2::server::handshake(io).await.unwrap();
            while let Some(Ok((req, mut respond))) = conn.accept().await {
                tokio::spawn(async move {
                    let path = req.uri().path().to_string();
                    let resp = http::Response::builder()
                        .status(200)
                        .header("x-path", path.as_str())
                        .body(())
                        .unwrap();
                    let mut send = respond.send_response(resp, false).unwrap();
                    send.send_data(Bytes::from(path), true).unwrap();
                });
            }
        });
    }

    async fn read_all(body: &mut H2Body) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next_chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let (client, server) = duplex(1 << 20);
        spawn_echo_server(server);
        let session = H2Session::handshake(client, &H2Settings::chrome(), None)
            .await
            .unwrap();

        let mut resp = session
            .send_request(fields("/hello"), Bytes::new(), &ClientTrace::new())
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.headers.get("x-path"), Some("/hello"));
        assert_eq!(read_all(&mut resp.body).await, b"/hello");
        assert!(session.is_usable());
    }

    #[tokio::test]
    async fn test_concurrent_streams_share_session() {
        let (client, server) = duplex(1 << 20);
        spawn_echo_server(server);
        let session = H2Session::handshake(client, &H2Settings::firefox(), None)
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move {
                let path = format!("/item/{i}");
                let mut resp = session
                    .send_request(fields(&path), Bytes::new(), &ClientTrace::new())
                    .await
                    .unwrap();
                assert_eq!(read_all(&mut resp.body).await, path.as_bytes());
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_request_body_is_sent() {
        let (client, server) = duplex(1 << 20);
        tokio::spawn(async move {
            let mut conn = h2::server::handshake(server).await.unwrap();
            if let Some(Ok((req, mut respond))) = conn.accept().await {
                tokio::spawn(async move {
                    let mut body = req.into_body();
                    let mut total = 0usize;
                    while let Some(chunk) = body.data().await {
                        let chunk = chunk.unwrap();
                        total += chunk.len();
                        let _ = body.flow_control().release_capacity(chunk.len());
                    }
                    let resp = http::Response::builder().status(200).body(()).unwrap();
                    let mut send = respond.send_response(resp, false).unwrap();
                    send.send_data(Bytes::from(total.to_string()), true).unwrap();
                });
                while conn.accept().await.is_some() {}
            }
        });
        let session = H2Session::handshake(client, &H2Settings::chrome(), None)
            .await
            .unwrap();
        let mut f = fields("/upload");
        f[0].1 = "POST".into();
        let body = Bytes::from(vec![7u8; 200_000]);
        let mut resp = session
            .send_request(f, body, &ClientTrace::new())
            .await
            .unwrap();
        assert_eq!(read_all(&mut resp.body).await, b"200000");
    }

    #[tokio::test]
    async fn test_peer_close_fails_pending_request() {
        let (client, server) = duplex(1 << 20);
        tokio::spawn(async move {
            let mut conn = h2::server::handshake(server).await.unwrap();
            // Accept the request, then drop the connection without answering.
            let _ = conn.accept().await;
        });
        let session = H2Session::handshake(client, &H2Settings::chrome(), None)
            .await
            .unwrap();
        let err = session
            .send_request(fields("/"), Bytes::new(), &ClientTrace::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NetError::ConnectionClosed | NetError::Http2StreamReset(_)
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!session.is_usable());
    }
}
