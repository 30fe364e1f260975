//! Firefox browser profiles.
//!
//! Firefox (NSS) sends a fixed extension order, no GREASE, and offers
//! `record_size_limit` and `delegated_credentials`. The TLS 1.3 suites are
//! ordered AES-128, ChaCha20, AES-256.

use crate::emulation::{
    CipherSuite, ExtensionOrder, ExtensionType, FingerprintFactory, FingerprintSpec, NamedGroup,
    SignatureScheme, TlsVersion,
};
use crate::http::h2settings::H2Settings;
use crate::http::orderedheaders::PseudoHeader;

/// Firefox browser versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Firefox {
    /// Firefox 120
    V120,
    /// Firefox 133 (latest), first with the ML-KEM hybrid key share
    V133,
}

impl Default for Firefox {
    fn default() -> Self {
        Firefox::V133
    }
}

impl FingerprintFactory for Firefox {
    fn profile_name(self) -> &'static str {
        match self {
            Firefox::V120 => "firefox-120",
            Firefox::V133 => "firefox-133",
        }
    }

    fn spec(self) -> FingerprintSpec {
        match self {
            Firefox::V120 => firefox_v120(),
            Firefox::V133 => firefox_v133(),
        }
    }
}

const CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS_AES_128_GCM_SHA256,
    CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
    CipherSuite::TLS_AES_256_GCM_SHA384,
    CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
    CipherSuite::ECDHE_RSA_AES128_GCM_SHA256,
    CipherSuite::ECDHE_ECDSA_CHACHA20_POLY1305,
    CipherSuite::ECDHE_RSA_CHACHA20_POLY1305,
    CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384,
    CipherSuite::ECDHE_RSA_AES256_GCM_SHA384,
    CipherSuite::ECDHE_ECDSA_AES256_SHA,
    CipherSuite::ECDHE_ECDSA_AES128_SHA,
    CipherSuite::ECDHE_RSA_AES128_SHA,
    CipherSuite::ECDHE_RSA_AES256_SHA,
    CipherSuite::RSA_AES128_GCM_SHA256,
    CipherSuite::RSA_AES256_GCM_SHA384,
    CipherSuite::RSA_AES128_SHA,
    CipherSuite::RSA_AES256_SHA,
];

const EXTENSIONS: &[ExtensionType] = &[
    ExtensionType::SERVER_NAME,
    ExtensionType::EXTENDED_MASTER_SECRET,
    ExtensionType::RENEGOTIATION_INFO,
    ExtensionType::SUPPORTED_GROUPS,
    ExtensionType::EC_POINT_FORMATS,
    ExtensionType::SESSION_TICKET,
    ExtensionType::ALPN,
    ExtensionType::STATUS_REQUEST,
    ExtensionType::DELEGATED_CREDENTIALS,
    ExtensionType::KEY_SHARE,
    ExtensionType::SUPPORTED_VERSIONS,
    ExtensionType::SIGNATURE_ALGORITHMS,
    ExtensionType::PSK_KEY_EXCHANGE_MODES,
    ExtensionType::RECORD_SIZE_LIMIT,
    ExtensionType::ENCRYPTED_CLIENT_HELLO,
];

const SIGNATURE_ALGORITHMS: &[SignatureScheme] = &[
    SignatureScheme::ECDSA_SECP256R1_SHA256,
    SignatureScheme::ECDSA_SECP384R1_SHA384,
    SignatureScheme::ECDSA_SECP521R1_SHA512,
    SignatureScheme::RSA_PSS_RSAE_SHA256,
    SignatureScheme::RSA_PSS_RSAE_SHA384,
    SignatureScheme::RSA_PSS_RSAE_SHA512,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::RSA_PKCS1_SHA512,
    SignatureScheme::ECDSA_SHA1,
    SignatureScheme::RSA_PKCS1_SHA1,
];

const CURVES_V120: &[NamedGroup] = &[
    NamedGroup::X25519,
    NamedGroup::SECP256R1,
    NamedGroup::SECP384R1,
    NamedGroup::SECP521R1,
    NamedGroup::FFDHE2048,
    NamedGroup::FFDHE3072,
];

const CURVES_V133: &[NamedGroup] = &[
    NamedGroup::X25519_MLKEM768,
    NamedGroup::X25519,
    NamedGroup::SECP256R1,
    NamedGroup::SECP384R1,
    NamedGroup::SECP521R1,
    NamedGroup::FFDHE2048,
    NamedGroup::FFDHE3072,
];

/// Firefox 120.
pub fn firefox_v120() -> FingerprintSpec {
    firefox_spec("firefox-120", CURVES_V120)
}

/// Firefox 133.
pub fn firefox_v133() -> FingerprintSpec {
    firefox_spec("firefox-133", CURVES_V133)
}

fn firefox_spec(name: &str, curves: &[NamedGroup]) -> FingerprintSpec {
    FingerprintSpec::builder(name)
        .versions(TlsVersion::Tls12, TlsVersion::Tls13)
        .cipher_suites(CIPHER_SUITES)
        .extensions(ExtensionOrder::Fixed, EXTENSIONS)
        .curves(curves)
        .signature_algorithms(SIGNATURE_ALGORITHMS)
        .alpn(&["h2", "http/1.1"])
        .session_ticket(true)
        .ech_grease(true)
        .pseudo_order(&PseudoHeader::FIREFOX)
        .http2(H2Settings::firefox())
        .build()
}
