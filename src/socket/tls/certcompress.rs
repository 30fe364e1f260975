//! Certificate decompression callbacks (RFC 8879).
//!
//! BoringSSL calls these when the server sends a compressed Certificate
//! message. The client never compresses, so only decompression is wired.

use crate::emulation::CertCompression;
use boring_sys::{CRYPTO_BUFFER, SSL, SSL_CTX};
use std::io::Read;
use std::os::raw::c_int;

type DecompressFn =
    unsafe extern "C" fn(*mut SSL, *mut *mut CRYPTO_BUFFER, usize, *const u8, usize) -> c_int;

/// Hand `decompressed` to BoringSSL if it has the announced length.
unsafe fn emit(out: *mut *mut CRYPTO_BUFFER, decompressed: &[u8], expected: usize) -> c_int {
    if decompressed.len() != expected {
        return 0;
    }
    // CRYPTO_BUFFER_new copies the bytes.
    let buffer =
        boring_sys::CRYPTO_BUFFER_new(decompressed.as_ptr(), decompressed.len(), std::ptr::null_mut());
    if buffer.is_null() {
        return 0;
    }
    *out = buffer;
    1
}

unsafe extern "C" fn decompress_brotli(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);
    let mut decompressed = Vec::with_capacity(uncompressed_len);
    let mut decoder = brotli::Decompressor::new(compressed, 4096);
    match decoder.read_to_end(&mut decompressed) {
        Ok(_) => emit(out, &decompressed, uncompressed_len),
        Err(_) => 0,
    }
}

unsafe extern "C" fn decompress_zlib(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);
    let mut decompressed = Vec::with_capacity(uncompressed_len);
    match flate2::read::ZlibDecoder::new(compressed).read_to_end(&mut decompressed) {
        Ok(_) => emit(out, &decompressed, uncompressed_len),
        Err(_) => 0,
    }
}

unsafe extern "C" fn decompress_zstd(
    _ssl: *mut SSL,
    out: *mut *mut CRYPTO_BUFFER,
    uncompressed_len: usize,
    in_: *const u8,
    in_len: usize,
) -> c_int {
    let compressed = std::slice::from_raw_parts(in_, in_len);
    match zstd::bulk::decompress(compressed, uncompressed_len) {
        Ok(decompressed) => emit(out, &decompressed, uncompressed_len),
        Err(_) => 0,
    }
}

/// Register `alg` on `ctx`. Returns false if BoringSSL refused it.
///
/// # Safety
/// `ctx` must be a valid, not yet shared `SSL_CTX`.
pub(crate) unsafe fn register(ctx: *mut SSL_CTX, alg: CertCompression) -> bool {
    let decompress: DecompressFn = match alg {
        CertCompression::Zlib => decompress_zlib,
        CertCompression::Brotli => decompress_brotli,
        CertCompression::Zstd => decompress_zstd,
    };
    boring_sys::SSL_CTX_add_cert_compression_alg(ctx, alg as u16, None, Some(decompress)) == 1
}
