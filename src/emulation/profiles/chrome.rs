//! Chrome browser profiles.
//!
//! Chrome has shuffled its ClientHello extensions since version 110 and
//! sends GREASE in the cipher, extension and group lists.

use crate::emulation::{
    CertCompression, CipherSuite, ExtensionOrder, ExtensionType, FingerprintFactory,
    FingerprintSpec, NamedGroup, SignatureScheme, TlsVersion,
};
use crate::http::h2settings::H2Settings;
use crate::http::orderedheaders::PseudoHeader;

/// Chrome browser versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Chrome {
    /// Chrome 120
    V120,
    /// Chrome 124 (latest), first with the Kyber hybrid key share on by default
    V124,
}

impl Default for Chrome {
    fn default() -> Self {
        Chrome::V124
    }
}

impl FingerprintFactory for Chrome {
    fn profile_name(self) -> &'static str {
        match self {
            Chrome::V120 => "chrome-120",
            Chrome::V124 => "chrome-124",
        }
    }

    fn spec(self) -> FingerprintSpec {
        match self {
            Chrome::V120 => chrome_v120(),
            Chrome::V124 => chrome_v124(),
        }
    }
}

pub(crate) const CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::GREASE,
    CipherSuite::TLS_AES_128_GCM_SHA256,
    CipherSuite::TLS_AES_256_GCM_SHA384,
    CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
    CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
    CipherSuite::ECDHE_RSA_AES128_GCM_SHA256,
    CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384,
    CipherSuite::ECDHE_RSA_AES256_GCM_SHA384,
    CipherSuite::ECDHE_ECDSA_CHACHA20_POLY1305,
    CipherSuite::ECDHE_RSA_CHACHA20_POLY1305,
    CipherSuite::ECDHE_RSA_AES128_SHA,
    CipherSuite::ECDHE_RSA_AES256_SHA,
    CipherSuite::RSA_AES128_GCM_SHA256,
    CipherSuite::RSA_AES256_GCM_SHA384,
    CipherSuite::RSA_AES128_SHA,
    CipherSuite::RSA_AES256_SHA,
];

/// Extensions as observed before shuffling.
pub(crate) const EXTENSIONS: &[ExtensionType] = &[
    ExtensionType::GREASE,
    ExtensionType::SERVER_NAME,
    ExtensionType::EXTENDED_MASTER_SECRET,
    ExtensionType::RENEGOTIATION_INFO,
    ExtensionType::SUPPORTED_GROUPS,
    ExtensionType::EC_POINT_FORMATS,
    ExtensionType::SESSION_TICKET,
    ExtensionType::ALPN,
    ExtensionType::STATUS_REQUEST,
    ExtensionType::SIGNATURE_ALGORITHMS,
    ExtensionType::SIGNED_CERT_TIMESTAMP,
    ExtensionType::KEY_SHARE,
    ExtensionType::PSK_KEY_EXCHANGE_MODES,
    ExtensionType::SUPPORTED_VERSIONS,
    ExtensionType::COMPRESS_CERTIFICATE,
    ExtensionType::APPLICATION_SETTINGS,
    ExtensionType::ENCRYPTED_CLIENT_HELLO,
    ExtensionType::GREASE,
];

pub(crate) const SIGNATURE_ALGORITHMS: &[SignatureScheme] = &[
    SignatureScheme::ECDSA_SECP256R1_SHA256,
    SignatureScheme::RSA_PSS_RSAE_SHA256,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::ECDSA_SECP384R1_SHA384,
    SignatureScheme::RSA_PSS_RSAE_SHA384,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::RSA_PSS_RSAE_SHA512,
    SignatureScheme::RSA_PKCS1_SHA512,
];

const CURVES_V120: &[NamedGroup] = &[
    NamedGroup::GREASE,
    NamedGroup::X25519,
    NamedGroup::SECP256R1,
    NamedGroup::SECP384R1,
];

const CURVES_V124: &[NamedGroup] = &[
    NamedGroup::GREASE,
    NamedGroup::X25519_KYBER768_DRAFT00,
    NamedGroup::X25519,
    NamedGroup::SECP256R1,
    NamedGroup::SECP384R1,
];

/// Chrome 120.
pub fn chrome_v120() -> FingerprintSpec {
    chromium_spec("chrome-120", CURVES_V120)
}

/// Chrome 124.
pub fn chrome_v124() -> FingerprintSpec {
    chromium_spec("chrome-124", CURVES_V124)
}

/// Shared Chromium handshake. Edge reuses it under its own name.
pub(crate) fn chromium_spec(name: &str, curves: &[NamedGroup]) -> FingerprintSpec {
    FingerprintSpec::builder(name)
        .versions(TlsVersion::Tls12, TlsVersion::Tls13)
        .cipher_suites(CIPHER_SUITES)
        .extensions(ExtensionOrder::Permuted, EXTENSIONS)
        .curves(curves)
        .signature_algorithms(SIGNATURE_ALGORITHMS)
        .alpn(&["h2", "http/1.1"])
        .session_ticket(true)
        .cert_compression(&[CertCompression::Brotli])
        .alps(&["h2"])
        .ech_grease(true)
        .pseudo_order(&PseudoHeader::CHROME)
        .http2(H2Settings::chrome())
        .build()
}
