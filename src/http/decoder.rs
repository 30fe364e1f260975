//! Content-Encoding decoding.
//!
//! A [`ContentDecoder`] is built from the `Content-Encoding` token list and
//! fed raw body chunks as they arrive. Codings are undone in reverse order of
//! application: the last listed token is decoded first. Every stage is a
//! push-style writer, so decoding never blocks on I/O and partial input is
//! decoded as far as it goes.
//!
//! An unsupported token is not an error until the first body byte is decoded,
//! so a response with an unknown coding can still be inspected.

use crate::base::neterror::NetError;
use std::io::Write;

/// Size of the brotli decoder's internal buffer.
const BROTLI_BUFFER: usize = 4096;

/// Output buffer grown per inflate/zstd step.
const OUT_CHUNK: usize = 32 * 1024;

/// A single supported coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl Coding {
    /// Parse one token. `x-gzip` is an alias of `gzip`; `identity` is `None`
    /// wrapped in `Ok`.
    fn parse(token: &str) -> Result<Option<Self>, NetError> {
        let token = token.trim();
        if token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip") {
            Ok(Some(Coding::Gzip))
        } else if token.eq_ignore_ascii_case("deflate") {
            Ok(Some(Coding::Deflate))
        } else if token.eq_ignore_ascii_case("br") {
            Ok(Some(Coding::Brotli))
        } else if token.eq_ignore_ascii_case("zstd") {
            Ok(Some(Coding::Zstd))
        } else if token.eq_ignore_ascii_case("identity") || token.is_empty() {
            Ok(None)
        } else {
            Err(NetError::UnsupportedContentEncoding(token.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Coding::Gzip => "gzip",
            Coding::Deflate => "deflate",
            Coding::Brotli => "br",
            Coding::Zstd => "zstd",
        }
    }
}

/// `deflate` is specified as zlib-wrapped, but some servers send raw
/// deflate. The first two bytes decide.
enum Deflate {
    Undecided(Vec<u8>),
    Stream(Inflate),
}

/// zlib or raw inflate that knows whether it has seen the end of stream.
struct Inflate {
    inner: flate2::Decompress,
    done: bool,
}

impl Inflate {
    fn new(zlib_header: bool) -> Self {
        Self {
            inner: flate2::Decompress::new(zlib_header),
            done: false,
        }
    }

    fn push(&mut self, input: &[u8]) -> Result<Vec<u8>, String> {
        let mut out = Vec::new();
        let mut pos = 0;
        // Bytes after the end of stream are ignored.
        while !self.done {
            if out.capacity() - out.len() < OUT_CHUNK / 4 {
                out.reserve(OUT_CHUNK);
            }
            let (in_before, out_before) = (self.inner.total_in(), self.inner.total_out());
            let status = self
                .inner
                .decompress_vec(&input[pos..], &mut out, flate2::FlushDecompress::None)
                .map_err(|e| e.to_string())?;
            pos += (self.inner.total_in() - in_before) as usize;
            if status == flate2::Status::StreamEnd {
                self.done = true;
            }
            let progressed =
                self.inner.total_in() != in_before || self.inner.total_out() != out_before;
            if !progressed || (pos == input.len() && out.len() < out.capacity()) {
                break;
            }
        }
        Ok(out)
    }
}

/// zstd frames decoded through the raw API so a cut-off frame is visible.
struct Zstd {
    inner: zstd::stream::raw::Decoder<'static>,
    /// The last `run` ended exactly on a frame boundary.
    at_boundary: bool,
}

impl Zstd {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            inner: zstd::stream::raw::Decoder::new()?,
            at_boundary: true,
        })
    }

    fn push(&mut self, input: &[u8]) -> std::io::Result<Vec<u8>> {
        use zstd::stream::raw::{InBuffer, Operation, OutBuffer};

        let mut out = Vec::new();
        let mut buf = vec![0u8; OUT_CHUNK];
        let mut src = InBuffer::around(input);
        loop {
            let consumed = src.pos();
            let (written, hint) = {
                let mut dst = OutBuffer::around(&mut buf[..]);
                let hint = self.inner.run(&mut src, &mut dst)?;
                (dst.pos(), hint)
            };
            out.extend_from_slice(&buf[..written]);
            if written > 0 || src.pos() > 0 {
                self.at_boundary = hint == 0;
            }
            let stalled = written == 0 && src.pos() == consumed;
            if stalled || (src.pos() == input.len() && written < buf.len()) {
                break;
            }
        }
        Ok(out)
    }
}

enum Stage {
    Gzip(flate2::write::GzDecoder<Vec<u8>>),
    Deflate(Deflate),
    Brotli(Box<brotli::DecompressorWriter<Vec<u8>>>),
    Zstd(Box<Zstd>),
}

fn decode_err(coding: Coding, err: impl std::fmt::Display) -> NetError {
    NetError::ContentDecodingFailed(format!("{}: {err}", coding.as_str()))
}

/// A zlib stream starts with CMF/FLG where CM is 8 and the pair is a
/// multiple of 31.
fn looks_like_zlib(head: &[u8]) -> bool {
    head[0] & 0x0f == 8 && (u16::from(head[0]) << 8 | u16::from(head[1])) % 31 == 0
}

impl Stage {
    fn new(coding: Coding) -> Result<Self, NetError> {
        Ok(match coding {
            Coding::Gzip => Stage::Gzip(flate2::write::GzDecoder::new(Vec::new())),
            Coding::Deflate => Stage::Deflate(Deflate::Undecided(Vec::new())),
            Coding::Brotli => Stage::Brotli(Box::new(brotli::DecompressorWriter::new(
                Vec::new(),
                BROTLI_BUFFER,
            ))),
            Coding::Zstd => Stage::Zstd(Box::new(Zstd::new().map_err(|e| decode_err(coding, e))?)),
        })
    }

    fn coding(&self) -> Coding {
        match self {
            Stage::Gzip(_) => Coding::Gzip,
            Stage::Deflate(_) => Coding::Deflate,
            Stage::Brotli(_) => Coding::Brotli,
            Stage::Zstd(_) => Coding::Zstd,
        }
    }

    /// Feed `input`, returning whatever output is ready.
    fn push(&mut self, input: &[u8]) -> Result<Vec<u8>, NetError> {
        let coding = self.coding();
        let err = |e: std::io::Error| decode_err(coding, e);
        match self {
            Stage::Gzip(d) => {
                d.write_all(input).map_err(err)?;
                Ok(std::mem::take(d.get_mut()))
            }
            Stage::Deflate(deflate) => {
                if let Deflate::Undecided(pending) = deflate {
                    pending.extend_from_slice(input);
                    if pending.len() < 2 {
                        return Ok(Vec::new());
                    }
                    let pending = std::mem::take(pending);
                    let mut inflate = Inflate::new(looks_like_zlib(&pending));
                    let out = inflate.push(&pending).map_err(|e| decode_err(coding, e));
                    *deflate = Deflate::Stream(inflate);
                    return out;
                }
                match deflate {
                    Deflate::Stream(inflate) => inflate.push(input).map_err(|e| decode_err(coding, e)),
                    Deflate::Undecided(_) => Ok(Vec::new()),
                }
            }
            Stage::Brotli(d) => {
                d.write_all(input).map_err(err)?;
                Ok(std::mem::take(d.get_mut()))
            }
            Stage::Zstd(d) => d.push(input).map_err(err),
        }
    }

    /// End of input: flush the tail and check the stream was complete.
    fn finish(self) -> Result<Vec<u8>, NetError> {
        let coding = self.coding();
        let err = |e: std::io::Error| decode_err(coding, e);
        match self {
            Stage::Gzip(d) => d.finish().map_err(err),
            Stage::Deflate(Deflate::Undecided(pending)) => {
                if pending.is_empty() {
                    Ok(Vec::new())
                } else {
                    Err(decode_err(coding, "truncated stream"))
                }
            }
            Stage::Deflate(Deflate::Stream(mut inflate)) => {
                let tail = inflate.push(&[]).map_err(|e| decode_err(coding, e))?;
                if inflate.done {
                    Ok(tail)
                } else {
                    Err(decode_err(coding, "truncated stream"))
                }
            }
            Stage::Brotli(d) => d
                .into_inner()
                .map_err(|_| decode_err(coding, "truncated stream")),
            Stage::Zstd(mut d) => {
                let tail = d.push(&[]).map_err(err)?;
                if d.at_boundary {
                    Ok(tail)
                } else {
                    Err(decode_err(coding, "truncated stream"))
                }
            }
        }
    }
}

/// Streaming decoder for a `Content-Encoding` list.
pub struct ContentDecoder {
    /// Stages in decode order (last applied coding first).
    stages: Vec<Stage>,
    /// Unsupported token, reported on first use.
    pending_error: Option<NetError>,
    saw_input: bool,
}

impl std::fmt::Debug for ContentDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentDecoder")
            .field(
                "stages",
                &self.stages.iter().map(|s| s.coding()).collect::<Vec<_>>(),
            )
            .field("pending_error", &self.pending_error)
            .finish()
    }
}

impl ContentDecoder {
    /// Build a decoder for a header value such as `"gzip, br"`.
    ///
    /// Returns `None` when nothing needs decoding.
    pub fn for_encoding(encoding: &str) -> Option<Self> {
        let mut stages = Vec::new();
        let mut pending_error = None;
        for token in encoding.split(',').rev() {
            match Coding::parse(token).and_then(|c| c.map(Stage::new).transpose()) {
                Ok(Some(stage)) => stages.push(stage),
                Ok(None) => {}
                Err(e) => {
                    pending_error = Some(e);
                    break;
                }
            }
        }
        if stages.is_empty() && pending_error.is_none() {
            return None;
        }
        Some(Self {
            stages,
            pending_error,
            saw_input: false,
        })
    }

    /// Codings in decode order.
    pub fn codings(&self) -> Vec<Coding> {
        self.stages.iter().map(Stage::coding).collect()
    }

    /// Decode the next raw chunk.
    pub fn push(&mut self, input: &[u8]) -> Result<Vec<u8>, NetError> {
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }
        if input.is_empty() {
            return Ok(Vec::new());
        }
        self.saw_input = true;
        let mut data = input.to_vec();
        for stage in &mut self.stages {
            if data.is_empty() {
                break;
            }
            data = stage.push(&data)?;
        }
        Ok(data)
    }

    /// Signal end of body and return any remaining output.
    ///
    /// A body that ends in the middle of a compressed stream is an error. An
    /// empty body decodes to nothing.
    pub fn finish(mut self) -> Result<Vec<u8>, NetError> {
        if let Some(e) = self.pending_error.take() {
            return Err(e);
        }
        if !self.saw_input {
            return Ok(Vec::new());
        }
        let mut carry: Vec<u8> = Vec::new();
        for mut stage in self.stages {
            if !carry.is_empty() {
                let mut out = stage.push(&carry)?;
                out.extend(stage.finish()?);
                carry = out;
            } else {
                carry = stage.finish()?;
            }
        }
        Ok(carry)
    }
}

/// Decode a complete body in one call.
pub fn decode_all(encoding: &str, data: &[u8]) -> Result<Vec<u8>, NetError> {
    let Some(mut decoder) = ContentDecoder::for_encoding(encoding) else {
        return Ok(data.to_vec());
    };
    let mut out = decoder.push(data)?;
    out.extend(decoder.finish()?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut e = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        e.write_all(data).unwrap();
        e.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut e = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        e.write_all(data).unwrap();
        e.finish().unwrap()
    }

    fn raw_deflate(data: &[u8]) -> Vec<u8> {
        let mut e = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        e.write_all(data).unwrap();
        e.finish().unwrap()
    }

    fn brotli(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut w = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            w.write_all(data).unwrap();
        }
        out
    }

    const TEXT: &[u8] = b"The quick brown fox jumps over the lazy dog. The quick brown fox.";

    #[test]
    fn test_each_coding() {
        assert_eq!(decode_all("gzip", &gzip(TEXT)).unwrap(), TEXT);
        assert_eq!(decode_all("x-gzip", &gzip(TEXT)).unwrap(), TEXT);
        assert_eq!(decode_all("deflate", &zlib(TEXT)).unwrap(), TEXT);
        assert_eq!(decode_all("br", &brotli(TEXT)).unwrap(), TEXT);
        let z = zstd::encode_all(TEXT, 3).unwrap();
        assert_eq!(decode_all("zstd", &z).unwrap(), TEXT);
    }

    #[test]
    fn test_raw_deflate_accepted() {
        assert_eq!(decode_all("deflate", &raw_deflate(TEXT)).unwrap(), TEXT);
    }

    #[test]
    fn test_stacked_codings_decode_in_reverse() {
        let body = brotli(&gzip(TEXT));
        let decoder = ContentDecoder::for_encoding("gzip, br").unwrap();
        assert_eq!(decoder.codings(), [Coding::Brotli, Coding::Gzip]);
        assert_eq!(decode_all("gzip, br", &body).unwrap(), TEXT);
    }

    #[test]
    fn test_identity_and_empty() {
        assert!(ContentDecoder::for_encoding("identity").is_none());
        assert!(ContentDecoder::for_encoding("").is_none());
        assert_eq!(decode_all("identity", b"plain").unwrap(), b"plain");
    }

    #[test]
    fn test_case_insensitive_tokens() {
        assert_eq!(decode_all(" GZIP ", &gzip(TEXT)).unwrap(), TEXT);
    }

    #[test]
    fn test_unknown_token_fails_lazily() {
        let mut decoder = ContentDecoder::for_encoding("gzip, compress").unwrap();
        let err = decoder.push(b"x").unwrap_err();
        assert_eq!(err, NetError::UnsupportedContentEncoding("compress".into()));
        assert_eq!(err.kind(), crate::base::neterror::ErrorKind::Decode);
    }

    #[test]
    fn test_chunked_feed() {
        let compressed = gzip(TEXT);
        let mut decoder = ContentDecoder::for_encoding("gzip").unwrap();
        let mut out = Vec::new();
        for piece in compressed.chunks(3) {
            out.extend(decoder.push(piece).unwrap());
        }
        out.extend(decoder.finish().unwrap());
        assert_eq!(out, TEXT);
    }

    #[test]
    fn test_truncated_input_is_error() {
        let compressed = gzip(TEXT);
        let half = &compressed[..compressed.len() / 2];
        let err = decode_all("gzip", half).unwrap_err();
        assert!(matches!(err, NetError::ContentDecodingFailed(_)));

        let br = brotli(TEXT);
        assert!(decode_all("br", &br[..br.len() / 2]).is_err());

        let z = zstd::encode_all(TEXT, 3).unwrap();
        for cut in [z.len() / 2, z.len() - 1] {
            assert_eq!(
                decode_all("zstd", &z[..cut]).unwrap_err(),
                NetError::ContentDecodingFailed("zstd: truncated stream".into())
            );
        }

        for wire in [zlib(TEXT), raw_deflate(TEXT)] {
            let err = decode_all("deflate", &wire[..wire.len() - 2]).unwrap_err();
            assert_eq!(
                err,
                NetError::ContentDecodingFailed("deflate: truncated stream".into())
            );
        }
    }

    #[test]
    fn test_truncated_zstd_in_pieces() {
        let data = TEXT.repeat(200);
        let z = zstd::encode_all(&data[..], 3).unwrap();
        let mut decoder = ContentDecoder::for_encoding("zstd").unwrap();
        for piece in z[..z.len() - 3].chunks(7) {
            decoder.push(piece).unwrap();
        }
        assert!(decoder.finish().is_err());
    }

    #[test]
    fn test_concatenated_zstd_frames() {
        let mut wire = zstd::encode_all(&b"first "[..], 3).unwrap();
        wire.extend(zstd::encode_all(&b"second"[..], 3).unwrap());
        assert_eq!(decode_all("zstd", &wire).unwrap(), b"first second");
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(decode_all("gzip", b"definitely not gzip").is_err());
    }

    #[test]
    fn test_empty_body_with_coding() {
        for coding in ["gzip", "deflate", "br", "zstd"] {
            assert_eq!(decode_all(coding, b"").unwrap(), b"");
        }
    }
}
