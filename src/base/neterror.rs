use thiserror::Error;

/// Coarse classification of a [`NetError`].
///
/// Callers branch on this rather than on individual variants when they only
/// need to know whether a failure was their own configuration, the peer, the
/// network, the body encoding, or a stop they requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown fingerprint profile, invalid header order, bad URL, or a
    /// fingerprint the handshake engine cannot reproduce.
    Configuration,
    /// TLS negotiation failed.
    Handshake,
    /// DNS, TCP connect or proxy tunnel failure.
    Connect,
    /// The peer violated HTTP/1.1 or HTTP/2 framing, or the connection broke
    /// mid-exchange.
    Protocol,
    /// Malformed compressed body or unsupported content coding.
    Decode,
    /// Caller-initiated cancellation or an expired deadline.
    Cancellation,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Connection to {host}:{port} failed: {reason}")]
    ConnectionFailedTo {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Could not resolve {domain}: {reason}")]
    NameNotResolvedFor { domain: String, reason: String },
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Tunnel connection failed: {0}")]
    TunnelConnectionFailed(String),
    #[error("Proxy connection failed")]
    ProxyConnectionFailed,

    // TLS Errors
    #[error("SSL protocol error: {0}")]
    SslProtocolError(String),
    #[error("SSL version or cipher mismatch")]
    SslVersionOrCipherMismatch,
    #[error("Server certificate invalid: {0}")]
    CertInvalid(String),
    #[error("ALPN negotiation failed: {0}")]
    AlpnNegotiationFailed(String),

    // Configuration Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Unknown URL scheme: {0}")]
    UnknownUrlScheme(String),
    #[error("Unsupported proxy: {0}")]
    UnsupportedProxy(String),
    #[error("Unknown fingerprint profile: {0}")]
    UnknownProfile(String),
    #[error("Invalid header order entry: {0}")]
    InvalidHeaderOrder(String),
    #[error("Fingerprint {profile} cannot be reproduced: {reason}")]
    UnsupportedFingerprint { profile: String, reason: String },
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    // HTTP Errors
    #[error("Invalid HTTP response: {0}")]
    InvalidHttpResponse(String),
    #[error("Empty response")]
    EmptyResponse,
    #[error("Response headers too big")]
    ResponseHeadersTooBig,
    #[error("Invalid chunked encoding")]
    InvalidChunkedEncoding,
    #[error("Content length mismatch")]
    ContentLengthMismatch,
    #[error("Multiple distinct Content-Length headers")]
    ResponseHeadersMultipleContentLength,
    #[error("HTTP/2 protocol error: {0}")]
    Http2ProtocolError(String),
    #[error("HTTP/2 flow control error")]
    Http2FlowControlError,
    #[error("HTTP/2 frame size error")]
    Http2FrameSizeError,
    #[error("HTTP/2 compression error")]
    Http2CompressionError,
    #[error("HTTP/2 stream reset by server (error code {0})")]
    Http2StreamReset(u32),
    #[error("HTTP/2 server refused stream")]
    Http2ServerRefusedStream,
    #[error("HTTP/2 session going away (error code {0})")]
    Http2GoAway(u32),

    // Body Errors
    #[error("Content decoding failed: {0}")]
    ContentDecodingFailed(String),
    #[error("Unsupported content encoding: {0}")]
    UnsupportedContentEncoding(String),
    #[error("Response body already consumed")]
    BodyConsumed,
    #[error("Invalid UTF-8 in response body")]
    InvalidUtf8,
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    // Cancellation
    #[error("Request aborted")]
    Aborted,
    #[error("Request timed out")]
    TimedOut,
}

impl NetError {
    /// Chromium-style numeric code. Errors without a `net_error_list.h`
    /// counterpart use the `-10000` range.
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::ConnectionFailedTo { .. } => -104,
            NetError::NameNotResolved => -105,
            NetError::NameNotResolvedFor { .. } => -105,
            NetError::SslProtocolError(_) => -107,
            NetError::AddressUnreachable => -109,
            NetError::TunnelConnectionFailed(_) => -111,
            NetError::SslVersionOrCipherMismatch => -113,
            NetError::ConnectionTimedOut => -118,
            NetError::AlpnNegotiationFailed(_) => -122,
            NetError::ProxyConnectionFailed => -130,
            NetError::CertInvalid(_) => -207,
            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme(_) => -302,
            NetError::InvalidHttpResponse(_) => -320,
            NetError::InvalidChunkedEncoding => -321,
            NetError::EmptyResponse => -324,
            NetError::ResponseHeadersTooBig => -325,
            NetError::ContentDecodingFailed(_) => -330,
            NetError::UnsupportedProxy(_) => -336,
            NetError::Http2ProtocolError(_) => -337,
            NetError::ResponseHeadersMultipleContentLength => -346,
            NetError::Http2ServerRefusedStream => -351,
            NetError::ContentLengthMismatch => -354,
            NetError::Http2FlowControlError => -361,
            NetError::Http2FrameSizeError => -362,
            NetError::Http2CompressionError => -363,
            NetError::UnsupportedContentEncoding(_) => -371,
            NetError::Aborted => -3,
            NetError::TimedOut => -7,

            // Custom errors (-10000 range)
            NetError::UnknownProfile(_) => -10001,
            NetError::InvalidHeaderOrder(_) => -10002,
            NetError::UnsupportedFingerprint { .. } => -10003,
            NetError::InvalidHeader(_) => -10004,
            NetError::Http2StreamReset(_) => -10005,
            NetError::Http2GoAway(_) => -10006,
            NetError::BodyConsumed => -10007,
            NetError::InvalidUtf8 => -10008,
            NetError::JsonParseError(_) => -10009,
            NetError::InvalidConfig(_) => -10010,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::InvalidUrl
            | NetError::UnknownUrlScheme(_)
            | NetError::UnsupportedProxy(_)
            | NetError::UnknownProfile(_)
            | NetError::InvalidHeaderOrder(_)
            | NetError::UnsupportedFingerprint { .. }
            | NetError::InvalidHeader(_)
            | NetError::InvalidConfig(_) => ErrorKind::Configuration,

            NetError::SslProtocolError(_)
            | NetError::SslVersionOrCipherMismatch
            | NetError::CertInvalid(_)
            | NetError::AlpnNegotiationFailed(_) => ErrorKind::Handshake,

            NetError::ConnectionRefused
            | NetError::ConnectionFailed
            | NetError::ConnectionFailedTo { .. }
            | NetError::NameNotResolved
            | NetError::NameNotResolvedFor { .. }
            | NetError::AddressUnreachable
            | NetError::ConnectionTimedOut
            | NetError::TunnelConnectionFailed(_)
            | NetError::ProxyConnectionFailed => ErrorKind::Connect,

            NetError::ContentDecodingFailed(_)
            | NetError::UnsupportedContentEncoding(_)
            | NetError::InvalidUtf8
            | NetError::JsonParseError(_) => ErrorKind::Decode,

            NetError::Aborted | NetError::TimedOut => ErrorKind::Cancellation,

            _ => ErrorKind::Protocol,
        }
    }

    /// True if the caller asked the request to stop or its deadline passed.
    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// True only for an expired deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetError::TimedOut | NetError::ConnectionTimedOut)
    }

    /// Connection-level failure with host/port context.
    pub fn connection_failed_to(host: &str, port: u16, err: std::io::Error) -> Self {
        NetError::ConnectionFailedTo {
            host: host.to_string(),
            port,
            reason: err.to_string(),
        }
    }

    /// DNS failure with domain context.
    pub fn dns_failed(domain: &str, err: std::io::Error) -> Self {
        NetError::NameNotResolvedFor {
            domain: domain.to_string(),
            reason: err.to_string(),
        }
    }

    /// Map an I/O error raised on an established connection.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
            std::io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::BrokenPipe => {
                NetError::ConnectionClosed
            }
            std::io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            _ => NetError::ConnectionFailed,
        }
    }
}
