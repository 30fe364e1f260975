//! TLS handshake engines.
//!
//! The engine performs the cryptographic handshake from a declarative
//! [`FingerprintSpec`]. Fingerprint data lives in [`crate::emulation`]; an
//! engine only translates it into library calls and reports what was
//! negotiated. An engine that cannot honor a parameter must say so from
//! [`HandshakeEngine::validate`] instead of silently sending something else.

use crate::base::neterror::NetError;
use crate::emulation::FingerprintSpec;
use crate::http::Protocol;
use futures::future::BoxFuture;
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

mod boringssl;
mod certcompress;
mod names;

pub use self::boringssl::BoringEngine;

/// An established TLS stream over TCP.
pub trait TlsStream: AsyncRead + AsyncWrite + Unpin + Send + Sync + fmt::Debug {
    /// The TCP socket carrying the TLS records, used for liveness checks.
    fn tcp(&self) -> &TcpStream;
}

/// What the handshake settled on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NegotiatedSession {
    /// Profile whose fingerprint was presented.
    pub profile: String,
    /// ALPN protocol the server picked, if any.
    pub alpn: Option<String>,
    /// e.g. `"TLSv1.3"`.
    pub version: Option<String>,
    /// Cipher suite name as the TLS library renders it.
    pub cipher: Option<String>,
    /// Whether the session was resumed.
    pub resumed: bool,
}

impl NegotiatedSession {
    /// HTTP protocol implied by ALPN. No ALPN means HTTP/1.1.
    pub fn protocol(&self) -> Protocol {
        match self.alpn.as_deref() {
            Some("h2") => Protocol::Http2,
            _ => Protocol::Http1,
        }
    }
}

/// Result of a successful handshake.
pub type HandshakeOutput = (Box<dyn TlsStream>, NegotiatedSession);

/// Pluggable TLS handshake capability.
pub trait HandshakeEngine: Send + Sync + fmt::Debug {
    /// Check that every parameter of `spec` can be reproduced.
    ///
    /// Called when a client is configured and before every handshake with a
    /// per-request profile; failures are configuration errors.
    fn validate(&self, spec: &FingerprintSpec) -> Result<(), NetError>;

    /// Run the handshake over `stream` presenting `spec`. `host` is used for
    /// SNI and certificate verification.
    fn handshake<'a>(
        &'a self,
        spec: &'a FingerprintSpec,
        host: &'a str,
        stream: TcpStream,
    ) -> BoxFuture<'a, Result<HandshakeOutput, NetError>>;
}

/// ALPN wire encoding: length-prefixed protocol names. `None` if a name
/// is empty or longer than 255 bytes.
pub(crate) fn alpn_wire(protos: &[String]) -> Option<Vec<u8>> {
    let mut wire = Vec::new();
    for proto in protos {
        if proto.is_empty() || proto.len() > 255 {
            return None;
        }
        wire.push(proto.len() as u8);
        wire.extend_from_slice(proto.as_bytes());
    }
    Some(wire)
}

/// Per RFC 6066, SNI must not carry a literal IP address.
pub fn should_set_sni(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<std::net::IpAddr>()
        .is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpn_wire_format() {
        let wire = alpn_wire(&["h2".to_string(), "http/1.1".to_string()]).unwrap();
        assert_eq!(wire, b"\x02h2\x08http/1.1");
    }

    #[test]
    fn test_alpn_rejects_empty_name() {
        assert!(alpn_wire(&[String::new()]).is_none());
    }

    #[test]
    fn test_sni_skipped_for_ip() {
        assert!(should_set_sni("example.com"));
        assert!(!should_set_sni("127.0.0.1"));
        assert!(!should_set_sni("[::1]"));
    }

    #[test]
    fn test_negotiated_protocol() {
        let mut session = NegotiatedSession::default();
        assert_eq!(session.protocol(), Protocol::Http1);
        session.alpn = Some("h2".into());
        assert_eq!(session.protocol(), Protocol::Http2);
    }
}
