//! HTTP/2 frame encoding and decoding (RFC 9113 §4, §6).

use crate::base::neterror::NetError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const FRAME_HEADER_LEN: usize = 9;

/// Client connection preface.
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Largest legal window size.
pub const MAX_WINDOW: i64 = (1 << 31) - 1;

mod kind {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// Error codes (RFC 9113 §7).
pub mod reason {
    pub const NO_ERROR: u32 = 0x0;
    pub const PROTOCOL_ERROR: u32 = 0x1;
    pub const FLOW_CONTROL_ERROR: u32 = 0x3;
    pub const FRAME_SIZE_ERROR: u32 = 0x6;
    pub const REFUSED_STREAM: u32 = 0x7;
    pub const CANCEL: u32 = 0x8;
    pub const COMPRESSION_ERROR: u32 = 0x9;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: u32,
        end_stream: bool,
        data: Bytes,
        /// Payload length including padding; this is what flow control counts.
        flow_len: u32,
    },
    Headers {
        stream_id: u32,
        end_stream: bool,
        end_headers: bool,
        block: Bytes,
    },
    Continuation {
        stream_id: u32,
        end_headers: bool,
        block: Bytes,
    },
    PushPromise {
        stream_id: u32,
        promised_id: u32,
        end_headers: bool,
        block: Bytes,
    },
    RstStream {
        stream_id: u32,
        code: u32,
    },
    Settings {
        ack: bool,
        entries: Vec<(u16, u32)>,
    },
    Ping {
        ack: bool,
        payload: [u8; 8],
    },
    GoAway {
        last_stream_id: u32,
        code: u32,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    /// PRIORITY and unknown extension frames.
    Ignored,
}

fn protocol_err(msg: &str) -> NetError {
    NetError::Http2ProtocolError(msg.to_string())
}

/// Remove padding from a PADDED payload.
fn strip_padding(mut payload: Bytes, padded: bool) -> Result<Bytes, NetError> {
    if !padded {
        return Ok(payload);
    }
    if payload.is_empty() {
        return Err(protocol_err("padded frame without pad length"));
    }
    let pad = payload.get_u8() as usize;
    if pad > payload.len() {
        return Err(protocol_err("padding exceeds payload"));
    }
    payload.truncate(payload.len() - pad);
    Ok(payload)
}

/// Decode one frame from the front of `buf`. `Ok(None)` means more bytes are
/// needed.
pub fn decode(buf: &mut BytesMut, max_frame_size: u32) -> Result<Option<Frame>, NetError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let len = u32::from(buf[0]) << 16 | u32::from(buf[1]) << 8 | u32::from(buf[2]);
    if len > max_frame_size {
        return Err(NetError::Http2FrameSizeError);
    }
    if buf.len() < FRAME_HEADER_LEN + len as usize {
        return Ok(None);
    }

    let ty = buf[3];
    let fl = buf[4];
    let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
    buf.advance(FRAME_HEADER_LEN);
    let mut payload = buf.split_to(len as usize).freeze();

    let frame = match ty {
        kind::DATA => {
            if stream_id == 0 {
                return Err(protocol_err("DATA on stream 0"));
            }
            Frame::Data {
                stream_id,
                end_stream: fl & flags::END_STREAM != 0,
                data: strip_padding(payload, fl & flags::PADDED != 0)?,
                flow_len: len,
            }
        }
        kind::HEADERS => {
            if stream_id == 0 {
                return Err(protocol_err("HEADERS on stream 0"));
            }
            let mut block = strip_padding(payload, fl & flags::PADDED != 0)?;
            if fl & flags::PRIORITY != 0 {
                if block.len() < 5 {
                    return Err(NetError::Http2FrameSizeError);
                }
                block.advance(5);
            }
            Frame::Headers {
                stream_id,
                end_stream: fl & flags::END_STREAM != 0,
                end_headers: fl & flags::END_HEADERS != 0,
                block,
            }
        }
        kind::CONTINUATION => Frame::Continuation {
            stream_id,
            end_headers: fl & flags::END_HEADERS != 0,
            block: payload,
        },
        kind::PUSH_PROMISE => {
            let mut block = strip_padding(payload, fl & flags::PADDED != 0)?;
            if block.len() < 4 {
                return Err(NetError::Http2FrameSizeError);
            }
            let promised_id = block.get_u32() & 0x7fff_ffff;
            Frame::PushPromise {
                stream_id,
                promised_id,
                end_headers: fl & flags::END_HEADERS != 0,
                block,
            }
        }
        kind::RST_STREAM => {
            if len != 4 {
                return Err(NetError::Http2FrameSizeError);
            }
            Frame::RstStream {
                stream_id,
                code: payload.get_u32(),
            }
        }
        kind::SETTINGS => {
            if stream_id != 0 {
                return Err(protocol_err("SETTINGS on a stream"));
            }
            let ack = fl & flags::ACK != 0;
            if len % 6 != 0 || (ack && len != 0) {
                return Err(NetError::Http2FrameSizeError);
            }
            let mut entries = Vec::with_capacity(len as usize / 6);
            while payload.has_remaining() {
                entries.push((payload.get_u16(), payload.get_u32()));
            }
            Frame::Settings { ack, entries }
        }
        kind::PING => {
            if len != 8 {
                return Err(NetError::Http2FrameSizeError);
            }
            let mut data = [0u8; 8];
            payload.copy_to_slice(&mut data);
            Frame::Ping {
                ack: fl & flags::ACK != 0,
                payload: data,
            }
        }
        kind::GOAWAY => {
            if len < 8 {
                return Err(NetError::Http2FrameSizeError);
            }
            Frame::GoAway {
                last_stream_id: payload.get_u32() & 0x7fff_ffff,
                code: payload.get_u32(),
            }
        }
        kind::WINDOW_UPDATE => {
            if len != 4 {
                return Err(NetError::Http2FrameSizeError);
            }
            Frame::WindowUpdate {
                stream_id,
                increment: payload.get_u32() & 0x7fff_ffff,
            }
        }
        _ => Frame::Ignored,
    };
    Ok(Some(frame))
}

fn put_header(buf: &mut BytesMut, len: usize, ty: u8, fl: u8, stream_id: u32) {
    buf.put_uint(len as u64, 3);
    buf.put_u8(ty);
    buf.put_u8(fl);
    buf.put_u32(stream_id & 0x7fff_ffff);
}

/// SETTINGS with entries in the given order.
pub fn encode_settings(buf: &mut BytesMut, entries: &[(u16, u32)]) {
    put_header(buf, entries.len() * 6, kind::SETTINGS, 0, 0);
    for (id, value) in entries {
        buf.put_u16(*id);
        buf.put_u32(*value);
    }
}

pub fn encode_settings_ack(buf: &mut BytesMut) {
    put_header(buf, 0, kind::SETTINGS, flags::ACK, 0);
}

pub fn encode_window_update(buf: &mut BytesMut, stream_id: u32, increment: u32) {
    put_header(buf, 4, kind::WINDOW_UPDATE, 0, stream_id);
    buf.put_u32(increment & 0x7fff_ffff);
}

pub fn encode_ping_ack(buf: &mut BytesMut, payload: [u8; 8]) {
    put_header(buf, 8, kind::PING, flags::ACK, 0);
    buf.put_slice(&payload);
}

pub fn encode_rst_stream(buf: &mut BytesMut, stream_id: u32, code: u32) {
    put_header(buf, 4, kind::RST_STREAM, 0, stream_id);
    buf.put_u32(code);
}

pub fn encode_goaway(buf: &mut BytesMut, last_stream_id: u32, code: u32) {
    put_header(buf, 8, kind::GOAWAY, 0, 0);
    buf.put_u32(last_stream_id & 0x7fff_ffff);
    buf.put_u32(code);
}

/// HEADERS followed by as many CONTINUATION frames as `max_frame_size`
/// requires.
pub fn encode_headers(
    buf: &mut BytesMut,
    stream_id: u32,
    block: &[u8],
    end_stream: bool,
    max_frame_size: usize,
) {
    let mut chunks = block.chunks(max_frame_size.max(1)).peekable();
    let first = chunks.next().unwrap_or(&[]);
    let mut fl = if end_stream { flags::END_STREAM } else { 0 };
    if chunks.peek().is_none() {
        fl |= flags::END_HEADERS;
    }
    put_header(buf, first.len(), kind::HEADERS, fl, stream_id);
    buf.put_slice(first);

    while let Some(chunk) = chunks.next() {
        let fl = if chunks.peek().is_none() {
            flags::END_HEADERS
        } else {
            0
        };
        put_header(buf, chunk.len(), kind::CONTINUATION, fl, stream_id);
        buf.put_slice(chunk);
    }
}

pub fn encode_data(buf: &mut BytesMut, stream_id: u32, data: &[u8], end_stream: bool) {
    let fl = if end_stream { flags::END_STREAM } else { 0 };
    put_header(buf, data.len(), kind::DATA, fl, stream_id);
    buf.put_slice(data);
}
