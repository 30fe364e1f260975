//! Browser fingerprint specifications.
//!
//! A [`FingerprintSpec`] is the declarative description of everything a
//! browser reveals before the first request byte:
//! - TLS ClientHello (cipher suites, extensions, curves, signature algorithms, ALPN)
//! - HTTP/2 SETTINGS and pseudo-header order
//!
//! Specs are immutable once built and shared through `Arc`. The handshake
//! engine reads them; it never owns fingerprint data itself.

mod factory;
pub mod profiles;
mod registry;

pub use factory::FingerprintFactory;
pub use registry::{FingerprintRegistry, FingerprintRegistryBuilder};

use crate::http::h2settings::H2Settings;
use crate::http::orderedheaders::PseudoHeader;

fn is_grease_value(v: u16) -> bool {
    (v & 0x0f0f) == 0x0a0a && (v >> 8) == (v & 0xff)
}

/// TLS cipher suite code point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherSuite(pub u16);

impl CipherSuite {
    pub const GREASE: CipherSuite = CipherSuite(0x0a0a);

    pub const TLS_AES_128_GCM_SHA256: CipherSuite = CipherSuite(0x1301);
    pub const TLS_AES_256_GCM_SHA384: CipherSuite = CipherSuite(0x1302);
    pub const TLS_CHACHA20_POLY1305_SHA256: CipherSuite = CipherSuite(0x1303);

    pub const ECDHE_ECDSA_AES128_GCM_SHA256: CipherSuite = CipherSuite(0xc02b);
    pub const ECDHE_RSA_AES128_GCM_SHA256: CipherSuite = CipherSuite(0xc02f);
    pub const ECDHE_ECDSA_AES256_GCM_SHA384: CipherSuite = CipherSuite(0xc02c);
    pub const ECDHE_RSA_AES256_GCM_SHA384: CipherSuite = CipherSuite(0xc030);
    pub const ECDHE_ECDSA_CHACHA20_POLY1305: CipherSuite = CipherSuite(0xcca9);
    pub const ECDHE_RSA_CHACHA20_POLY1305: CipherSuite = CipherSuite(0xcca8);
    pub const ECDHE_ECDSA_AES128_SHA: CipherSuite = CipherSuite(0xc009);
    pub const ECDHE_ECDSA_AES256_SHA: CipherSuite = CipherSuite(0xc00a);
    pub const ECDHE_RSA_AES128_SHA: CipherSuite = CipherSuite(0xc013);
    pub const ECDHE_RSA_AES256_SHA: CipherSuite = CipherSuite(0xc014);
    pub const ECDHE_ECDSA_3DES_EDE_CBC_SHA: CipherSuite = CipherSuite(0xc008);
    pub const ECDHE_RSA_3DES_EDE_CBC_SHA: CipherSuite = CipherSuite(0xc012);
    pub const RSA_AES128_GCM_SHA256: CipherSuite = CipherSuite(0x009c);
    pub const RSA_AES256_GCM_SHA384: CipherSuite = CipherSuite(0x009d);
    pub const RSA_AES128_SHA: CipherSuite = CipherSuite(0x002f);
    pub const RSA_AES256_SHA: CipherSuite = CipherSuite(0x0035);
    pub const RSA_3DES_EDE_CBC_SHA: CipherSuite = CipherSuite(0x000a);

    pub fn is_grease(&self) -> bool {
        is_grease_value(self.0)
    }

    /// TLS 1.3 suites are negotiated independently of the cipher string.
    pub fn is_tls13(&self) -> bool {
        (0x1301..=0x1305).contains(&self.0)
    }
}

/// TLS extension code point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionType(pub u16);

impl ExtensionType {
    pub const GREASE: ExtensionType = ExtensionType(0x0a0a);

    pub const SERVER_NAME: ExtensionType = ExtensionType(0);
    pub const STATUS_REQUEST: ExtensionType = ExtensionType(5);
    pub const SUPPORTED_GROUPS: ExtensionType = ExtensionType(10);
    pub const EC_POINT_FORMATS: ExtensionType = ExtensionType(11);
    pub const SIGNATURE_ALGORITHMS: ExtensionType = ExtensionType(13);
    pub const ALPN: ExtensionType = ExtensionType(16);
    pub const SIGNED_CERT_TIMESTAMP: ExtensionType = ExtensionType(18);
    pub const PADDING: ExtensionType = ExtensionType(21);
    pub const EXTENDED_MASTER_SECRET: ExtensionType = ExtensionType(23);
    pub const COMPRESS_CERTIFICATE: ExtensionType = ExtensionType(27);
    pub const RECORD_SIZE_LIMIT: ExtensionType = ExtensionType(28);
    pub const DELEGATED_CREDENTIALS: ExtensionType = ExtensionType(34);
    pub const SESSION_TICKET: ExtensionType = ExtensionType(35);
    pub const PRE_SHARED_KEY: ExtensionType = ExtensionType(41);
    pub const EARLY_DATA: ExtensionType = ExtensionType(42);
    pub const SUPPORTED_VERSIONS: ExtensionType = ExtensionType(43);
    pub const COOKIE: ExtensionType = ExtensionType(44);
    pub const PSK_KEY_EXCHANGE_MODES: ExtensionType = ExtensionType(45);
    pub const KEY_SHARE: ExtensionType = ExtensionType(51);
    pub const APPLICATION_SETTINGS: ExtensionType = ExtensionType(17513);
    pub const ENCRYPTED_CLIENT_HELLO: ExtensionType = ExtensionType(0xfe0d);
    pub const RENEGOTIATION_INFO: ExtensionType = ExtensionType(0xff01);

    pub fn is_grease(&self) -> bool {
        is_grease_value(self.0)
    }
}

/// Supported group (curve) code point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamedGroup(pub u16);

impl NamedGroup {
    pub const GREASE: NamedGroup = NamedGroup(0x0a0a);
    pub const SECP256R1: NamedGroup = NamedGroup(23);
    pub const SECP384R1: NamedGroup = NamedGroup(24);
    pub const SECP521R1: NamedGroup = NamedGroup(25);
    pub const X25519: NamedGroup = NamedGroup(29);
    pub const FFDHE2048: NamedGroup = NamedGroup(256);
    pub const FFDHE3072: NamedGroup = NamedGroup(257);
    pub const X25519_KYBER768_DRAFT00: NamedGroup = NamedGroup(0x6399);
    pub const X25519_MLKEM768: NamedGroup = NamedGroup(0x11ec);

    pub fn is_grease(&self) -> bool {
        is_grease_value(self.0)
    }
}

/// Signature scheme code point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureScheme(pub u16);

impl SignatureScheme {
    pub const RSA_PKCS1_SHA1: SignatureScheme = SignatureScheme(0x0201);
    pub const ECDSA_SHA1: SignatureScheme = SignatureScheme(0x0203);
    pub const RSA_PKCS1_SHA256: SignatureScheme = SignatureScheme(0x0401);
    pub const ECDSA_SECP256R1_SHA256: SignatureScheme = SignatureScheme(0x0403);
    pub const RSA_PKCS1_SHA384: SignatureScheme = SignatureScheme(0x0501);
    pub const ECDSA_SECP384R1_SHA384: SignatureScheme = SignatureScheme(0x0503);
    pub const RSA_PKCS1_SHA512: SignatureScheme = SignatureScheme(0x0601);
    pub const ECDSA_SECP521R1_SHA512: SignatureScheme = SignatureScheme(0x0603);
    pub const RSA_PSS_RSAE_SHA256: SignatureScheme = SignatureScheme(0x0804);
    pub const RSA_PSS_RSAE_SHA384: SignatureScheme = SignatureScheme(0x0805);
    pub const RSA_PSS_RSAE_SHA512: SignatureScheme = SignatureScheme(0x0806);
    pub const ED25519: SignatureScheme = SignatureScheme(0x0807);
}

/// TLS protocol version bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

/// Certificate compression algorithm (RFC 8879).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CertCompression {
    Zlib = 1,
    Brotli = 2,
    Zstd = 3,
}

/// How extensions are ordered in the ClientHello.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionOrder {
    /// Exactly the order of [`FingerprintSpec::extensions`].
    Fixed,
    /// Shuffled per connection, as Chrome does since version 110.
    Permuted,
}

/// The compression method every modern client offers.
pub const COMPRESSION_NULL: u8 = 0;

/// Immutable handshake and HTTP/2 fingerprint of one browser version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintSpec {
    pub name: String,
    pub min_version: TlsVersion,
    pub max_version: TlsVersion,
    /// Cipher suites in offer order, GREASE entries included.
    pub cipher_suites: Vec<CipherSuite>,
    /// Extensions in offer order, GREASE entries included. Padding and
    /// pre_shared_key are left out: they depend on hello size and resumption.
    pub extensions: Vec<ExtensionType>,
    pub extension_order: ExtensionOrder,
    pub curves: Vec<NamedGroup>,
    pub signature_algorithms: Vec<SignatureScheme>,
    /// ALPN offer order.
    pub alpn: Vec<String>,
    pub compression_methods: Vec<u8>,
    /// Offer the session_ticket extension.
    pub session_ticket: bool,
    pub cert_compression: Vec<CertCompression>,
    /// ALPS (application_settings) protocols.
    pub alps: Vec<String>,
    pub ech_grease: bool,
    /// Pseudo-header order used when a request declares none.
    pub pseudo_order: Vec<PseudoHeader>,
    pub http2: H2Settings,
}

impl FingerprintSpec {
    pub fn builder(name: impl Into<String>) -> FingerprintSpecBuilder {
        FingerprintSpecBuilder::new(name)
    }

    /// GREASE values appear in the cipher list.
    pub fn grease(&self) -> bool {
        self.cipher_suites.iter().any(CipherSuite::is_grease)
    }

    pub fn has_extension(&self, ext: ExtensionType) -> bool {
        self.extensions.contains(&ext)
    }

    /// Copy of this spec offering only `http/1.1` over ALPN.
    ///
    /// ALPS entries for protocols no longer offered are dropped, and with
    /// them the application_settings extension.
    pub fn http1_only(&self) -> FingerprintSpec {
        let mut spec = self.clone();
        spec.alpn.retain(|p| p == "http/1.1");
        if spec.alpn.is_empty() {
            spec.alpn.push("http/1.1".to_string());
        }
        let alpn = spec.alpn.clone();
        spec.alps.retain(|p| alpn.contains(p));
        if spec.alps.is_empty() {
            spec.extensions
                .retain(|e| *e != ExtensionType::APPLICATION_SETTINGS);
        }
        spec
    }
}

/// Builder for [`FingerprintSpec`].
#[derive(Debug, Clone)]
#[must_use]
pub struct FingerprintSpecBuilder {
    spec: FingerprintSpec,
}

impl FingerprintSpecBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            spec: FingerprintSpec {
                name: name.into(),
                min_version: TlsVersion::Tls12,
                max_version: TlsVersion::Tls13,
                cipher_suites: Vec::new(),
                extensions: Vec::new(),
                extension_order: ExtensionOrder::Fixed,
                curves: Vec::new(),
                signature_algorithms: Vec::new(),
                alpn: vec!["h2".to_string(), "http/1.1".to_string()],
                compression_methods: vec![COMPRESSION_NULL],
                session_ticket: true,
                cert_compression: Vec::new(),
                alps: Vec::new(),
                ech_grease: false,
                pseudo_order: PseudoHeader::CHROME.to_vec(),
                http2: H2Settings::default(),
            },
        }
    }

    pub fn versions(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.spec.min_version = min;
        self.spec.max_version = max;
        self
    }

    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.spec.cipher_suites = suites.to_vec();
        self
    }

    pub fn extensions(mut self, order: ExtensionOrder, exts: &[ExtensionType]) -> Self {
        self.spec.extension_order = order;
        self.spec.extensions = exts.to_vec();
        self
    }

    pub fn curves(mut self, curves: &[NamedGroup]) -> Self {
        self.spec.curves = curves.to_vec();
        self
    }

    pub fn signature_algorithms(mut self, algs: &[SignatureScheme]) -> Self {
        self.spec.signature_algorithms = algs.to_vec();
        self
    }

    pub fn alpn(mut self, protos: &[&str]) -> Self {
        self.spec.alpn = protos.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn compression_methods(mut self, methods: &[u8]) -> Self {
        self.spec.compression_methods = methods.to_vec();
        self
    }

    pub fn session_ticket(mut self, enabled: bool) -> Self {
        self.spec.session_ticket = enabled;
        self
    }

    pub fn cert_compression(mut self, algs: &[CertCompression]) -> Self {
        self.spec.cert_compression = algs.to_vec();
        self
    }

    pub fn alps(mut self, protos: &[&str]) -> Self {
        self.spec.alps = protos.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn ech_grease(mut self, enabled: bool) -> Self {
        self.spec.ech_grease = enabled;
        self
    }

    pub fn pseudo_order(mut self, order: &[PseudoHeader]) -> Self {
        self.spec.pseudo_order = order.to_vec();
        self
    }

    pub fn http2(mut self, settings: H2Settings) -> Self {
        self.spec.http2 = settings;
        self
    }

    pub fn build(self) -> FingerprintSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grease_detection() {
        for v in [0x0a0a, 0x1a1a, 0xfafa] {
            assert!(CipherSuite(v).is_grease());
            assert!(ExtensionType(v).is_grease());
        }
        assert!(!CipherSuite(0x1301).is_grease());
        assert!(!CipherSuite(0x0a1a).is_grease());
    }

    #[test]
    fn test_tls13_suites() {
        assert!(CipherSuite::TLS_CHACHA20_POLY1305_SHA256.is_tls13());
        assert!(!CipherSuite::ECDHE_RSA_AES128_GCM_SHA256.is_tls13());
    }

    #[test]
    fn test_builder_defaults() {
        let spec = FingerprintSpec::builder("custom").build();
        assert_eq!(spec.alpn, vec!["h2", "http/1.1"]);
        assert_eq!(spec.compression_methods, vec![COMPRESSION_NULL]);
        assert!(spec.session_ticket);
        assert!(!spec.grease());
    }

    #[test]
    fn test_http1_only_restricts_alpn() {
        let spec = FingerprintSpec::builder("custom")
            .alpn(&["h2"])
            .alps(&["h2"])
            .extensions(
                ExtensionOrder::Fixed,
                &[ExtensionType::ALPN, ExtensionType::APPLICATION_SETTINGS],
            )
            .build();
        let h1 = spec.http1_only();
        assert_eq!(h1.alpn, vec!["http/1.1"]);
        assert!(h1.alps.is_empty());
        assert_eq!(h1.extensions, vec![ExtensionType::ALPN]);
        assert_eq!(spec.alpn, vec!["h2"]);
    }
}
