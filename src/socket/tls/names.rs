//! Code point to BoringSSL name tables.

use crate::emulation::{CipherSuite, ExtensionType, NamedGroup, SignatureScheme};

/// Cipher string name for a TLS 1.2 suite.
pub(crate) fn cipher_name(suite: CipherSuite) -> Option<&'static str> {
    let name = match suite.0 {
        0xc02b => "ECDHE-ECDSA-AES128-GCM-SHA256",
        0xc02f => "ECDHE-RSA-AES128-GCM-SHA256",
        0xc02c => "ECDHE-ECDSA-AES256-GCM-SHA384",
        0xc030 => "ECDHE-RSA-AES256-GCM-SHA384",
        0xcca9 => "ECDHE-ECDSA-CHACHA20-POLY1305",
        0xcca8 => "ECDHE-RSA-CHACHA20-POLY1305",
        0xc009 => "ECDHE-ECDSA-AES128-SHA",
        0xc00a => "ECDHE-ECDSA-AES256-SHA",
        0xc013 => "ECDHE-RSA-AES128-SHA",
        0xc014 => "ECDHE-RSA-AES256-SHA",
        0x009c => "AES128-GCM-SHA256",
        0x009d => "AES256-GCM-SHA384",
        0x002f => "AES128-SHA",
        0x0035 => "AES256-SHA",
        0x000a => "DES-CBC3-SHA",
        _ => return None,
    };
    Some(name)
}

pub(crate) fn group_name(group: NamedGroup) -> Option<&'static str> {
    let name = match group.0 {
        23 => "P-256",
        24 => "P-384",
        25 => "P-521",
        29 => "X25519",
        0x6399 => "X25519Kyber768Draft00",
        _ => return None,
    };
    Some(name)
}

pub(crate) fn sigalg_name(scheme: SignatureScheme) -> Option<&'static str> {
    let name = match scheme.0 {
        0x0201 => "RSA+SHA1",
        0x0203 => "ECDSA+SHA1",
        0x0401 => "RSA+SHA256",
        0x0403 => "ECDSA+SHA256",
        0x0501 => "RSA+SHA384",
        0x0503 => "ECDSA+SHA384",
        0x0601 => "RSA+SHA512",
        0x0603 => "ECDSA+SHA512",
        0x0804 => "RSA-PSS+SHA256",
        0x0805 => "RSA-PSS+SHA384",
        0x0806 => "RSA-PSS+SHA512",
        0x0807 => "ed25519",
        _ => return None,
    };
    Some(name)
}

/// BoringSSL's built-in ClientHello extension order. Without permutation,
/// extensions are always written in this sequence.
pub(crate) const NATIVE_EXTENSION_ORDER: &[ExtensionType] = &[
    ExtensionType::SERVER_NAME,
    ExtensionType::ENCRYPTED_CLIENT_HELLO,
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
    ExtensionType::EARLY_DATA,
    ExtensionType::SUPPORTED_VERSIONS,
    ExtensionType::COOKIE,
    ExtensionType::COMPRESS_CERTIFICATE,
    ExtensionType::APPLICATION_SETTINGS,
    ExtensionType::PADDING,
    ExtensionType::PRE_SHARED_KEY,
];

/// TLS 1.3 suites in the order BoringSSL offers them.
pub(crate) const TLS13_SUITES: &[CipherSuite] = &[
    CipherSuite::TLS_AES_128_GCM_SHA256,
    CipherSuite::TLS_AES_256_GCM_SHA384,
    CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names() {
        assert_eq!(
            cipher_name(CipherSuite::ECDHE_RSA_AES128_GCM_SHA256),
            Some("ECDHE-RSA-AES128-GCM-SHA256")
        );
        assert_eq!(group_name(NamedGroup::X25519), Some("X25519"));
        assert_eq!(
            sigalg_name(SignatureScheme::RSA_PSS_RSAE_SHA256),
            Some("RSA-PSS+SHA256")
        );
    }

    #[test]
    fn test_unsupported_code_points() {
        assert_eq!(cipher_name(CipherSuite::ECDHE_RSA_3DES_EDE_CBC_SHA), None);
        assert_eq!(cipher_name(CipherSuite::TLS_AES_128_GCM_SHA256), None);
        assert_eq!(group_name(NamedGroup::FFDHE2048), None);
    }
}
