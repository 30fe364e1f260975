//! Safari and iOS profiles.
//!
//! Safari on macOS and every iOS browser share the system TLS stack, so
//! both families use the same ClientHello. Safari still offers 3DES suites
//! and never sends session tickets.

use crate::emulation::{
    CertCompression, CipherSuite, ExtensionOrder, ExtensionType, FingerprintFactory,
    FingerprintSpec, NamedGroup, SignatureScheme, TlsVersion,
};
use crate::http::h2settings::H2Settings;
use crate::http::orderedheaders::PseudoHeader;

/// Safari (macOS) versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Safari {
    /// Safari 17 (latest)
    V17,
}

impl Default for Safari {
    fn default() -> Self {
        Safari::V17
    }
}

impl FingerprintFactory for Safari {
    fn profile_name(self) -> &'static str {
        match self {
            Safari::V17 => "safari-17",
        }
    }

    fn spec(self) -> FingerprintSpec {
        match self {
            Safari::V17 => safari_v17(),
        }
    }
}

/// iOS versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Ios {
    /// iOS 17 (latest)
    V17,
}

impl Default for Ios {
    fn default() -> Self {
        Ios::V17
    }
}

impl FingerprintFactory for Ios {
    fn profile_name(self) -> &'static str {
        match self {
            Ios::V17 => "ios-17",
        }
    }

    fn spec(self) -> FingerprintSpec {
        match self {
            Ios::V17 => ios_v17(),
        }
    }
}

const CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::GREASE,
    CipherSuite::TLS_AES_128_GCM_SHA256,
    CipherSuite::TLS_AES_256_GCM_SHA384,
    CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
    CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384,
    CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
    CipherSuite::ECDHE_ECDSA_CHACHA20_POLY1305,
    CipherSuite::ECDHE_RSA_AES256_GCM_SHA384,
    CipherSuite::ECDHE_RSA_AES128_GCM_SHA256,
    CipherSuite::ECDHE_RSA_CHACHA20_POLY1305,
    CipherSuite::ECDHE_ECDSA_AES256_SHA,
    CipherSuite::ECDHE_ECDSA_AES128_SHA,
    CipherSuite::ECDHE_RSA_AES256_SHA,
    CipherSuite::ECDHE_RSA_AES128_SHA,
    CipherSuite::RSA_AES256_GCM_SHA384,
    CipherSuite::RSA_AES128_GCM_SHA256,
    CipherSuite::RSA_AES256_SHA,
    CipherSuite::RSA_AES128_SHA,
    CipherSuite::ECDHE_ECDSA_3DES_EDE_CBC_SHA,
    CipherSuite::ECDHE_RSA_3DES_EDE_CBC_SHA,
    CipherSuite::RSA_3DES_EDE_CBC_SHA,
];

const EXTENSIONS: &[ExtensionType] = &[
    ExtensionType::GREASE,
    ExtensionType::SERVER_NAME,
    ExtensionType::EXTENDED_MASTER_SECRET,
    ExtensionType::RENEGOTIATION_INFO,
    ExtensionType::SUPPORTED_GROUPS,
    ExtensionType::EC_POINT_FORMATS,
    ExtensionType::ALPN,
    ExtensionType::STATUS_REQUEST,
    ExtensionType::SIGNATURE_ALGORITHMS,
    ExtensionType::SIGNED_CERT_TIMESTAMP,
    ExtensionType::KEY_SHARE,
    ExtensionType::PSK_KEY_EXCHANGE_MODES,
    ExtensionType::SUPPORTED_VERSIONS,
    ExtensionType::COMPRESS_CERTIFICATE,
    ExtensionType::GREASE,
];

const SIGNATURE_ALGORITHMS: &[SignatureScheme] = &[
    SignatureScheme::ECDSA_SECP256R1_SHA256,
    SignatureScheme::RSA_PSS_RSAE_SHA256,
    SignatureScheme::RSA_PKCS1_SHA256,
    SignatureScheme::ECDSA_SECP384R1_SHA384,
    SignatureScheme::ECDSA_SHA1,
    SignatureScheme::RSA_PSS_RSAE_SHA384,
    SignatureScheme::RSA_PSS_RSAE_SHA384,
    SignatureScheme::RSA_PKCS1_SHA384,
    SignatureScheme::RSA_PSS_RSAE_SHA512,
    SignatureScheme::RSA_PKCS1_SHA512,
    SignatureScheme::RSA_PKCS1_SHA1,
];

const CURVES: &[NamedGroup] = &[
    NamedGroup::GREASE,
    NamedGroup::X25519,
    NamedGroup::SECP256R1,
    NamedGroup::SECP384R1,
    NamedGroup::SECP521R1,
];

/// Safari 17 on macOS.
pub fn safari_v17() -> FingerprintSpec {
    apple_spec("safari-17")
}

/// Safari 17 on iOS.
pub fn ios_v17() -> FingerprintSpec {
    apple_spec("ios-17")
}

fn apple_spec(name: &str) -> FingerprintSpec {
    FingerprintSpec::builder(name)
        .versions(TlsVersion::Tls12, TlsVersion::Tls13)
        .cipher_suites(CIPHER_SUITES)
        .extensions(ExtensionOrder::Fixed, EXTENSIONS)
        .curves(CURVES)
        .signature_algorithms(SIGNATURE_ALGORITHMS)
        .alpn(&["h2", "http/1.1"])
        .session_ticket(false)
        .cert_compression(&[CertCompression::Zlib])
        .pseudo_order(&PseudoHeader::SAFARI)
        .http2(H2Settings::safari())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safari_shape() {
        let spec = safari_v17();
        assert_eq!(spec.cipher_suites.len(), 21);
        assert_eq!(spec.extensions.len(), 15);
        assert!(!spec.session_ticket);
        assert!(!spec.has_extension(ExtensionType::SESSION_TICKET));
        assert_eq!(spec.pseudo_order, PseudoHeader::SAFARI.to_vec());
    }

    #[test]
    fn test_ios_shares_safari_handshake() {
        let ios = Ios::default().spec();
        let safari = Safari::default().spec();
        assert_eq!(ios.name, "ios-17");
        assert_eq!(ios.cipher_suites, safari.cipher_suites);
        assert_eq!(ios.http2, H2Settings::safari());
    }
}
