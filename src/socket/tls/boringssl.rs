//! BoringSSL handshake engine.
//!
//! Translates a [`FingerprintSpec`] into `SSL_CTX` / `SSL` settings. Knobs the
//! safe `boring` API does not expose are reached through `boring-sys`.

use super::names::{cipher_name, group_name, sigalg_name, NATIVE_EXTENSION_ORDER, TLS13_SUITES};
use super::{alpn_wire, certcompress, should_set_sni, HandshakeEngine, HandshakeOutput};
use super::{NegotiatedSession, TlsStream};
use crate::base::neterror::NetError;
use crate::emulation::{
    CipherSuite, ExtensionOrder, ExtensionType, FingerprintSpec, TlsVersion, COMPRESSION_NULL,
};
use ::boring::ssl::{
    ConnectConfiguration, SslConnector, SslMethod, SslOptions, SslVerifyMode, SslVersion,
};
use boring_sys::{SSL, SSL_CTX};
use foreign_types::ForeignTypeRef;
use futures::future::BoxFuture;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

extern "C" {
    fn SSL_CTX_set_grease_enabled(ctx: *mut SSL_CTX, enabled: c_int);
    fn SSL_CTX_set_permute_extensions(ctx: *mut SSL_CTX, enabled: c_int);
    fn SSL_CTX_set_strict_cipher_list(ctx: *mut SSL_CTX, str_: *const c_char) -> c_int;
    fn SSL_CTX_enable_ocsp_stapling(ctx: *mut SSL_CTX);
    fn SSL_CTX_enable_signed_cert_timestamps(ctx: *mut SSL_CTX);
    fn SSL_set_enable_ech_grease(ssl: *mut SSL, enable: c_int);
    fn SSL_add_application_settings(
        ssl: *mut SSL,
        proto: *const u8,
        proto_len: usize,
        settings: *const u8,
        settings_len: usize,
    ) -> c_int;
}

impl TlsStream for SslStream<TcpStream> {
    fn tcp(&self) -> &TcpStream {
        self.get_ref()
    }
}

/// Library settings derived from a spec.
#[derive(Debug)]
struct Plan {
    cipher_list: String,
    curves: String,
    sigalgs: String,
    alpn: Vec<u8>,
    grease: bool,
    permute: bool,
    sni: bool,
}

fn unsupported(spec: &FingerprintSpec, reason: impl Into<String>) -> NetError {
    NetError::UnsupportedFingerprint {
        profile: spec.name.clone(),
        reason: reason.into(),
    }
}

fn ssl_version(v: TlsVersion) -> SslVersion {
    match v {
        TlsVersion::Tls12 => SslVersion::TLS1_2,
        TlsVersion::Tls13 => SslVersion::TLS1_3,
    }
}

/// Extensions BoringSSL writes whenever the matching protocol range is
/// enabled; a spec that leaves one out cannot be reproduced.
fn mandatory_extensions(spec: &FingerprintSpec) -> Vec<ExtensionType> {
    let mut exts = vec![
        ExtensionType::EXTENDED_MASTER_SECRET,
        ExtensionType::SUPPORTED_GROUPS,
        ExtensionType::SIGNATURE_ALGORITHMS,
    ];
    if spec.min_version < TlsVersion::Tls13 {
        exts.push(ExtensionType::RENEGOTIATION_INFO);
        exts.push(ExtensionType::EC_POINT_FORMATS);
    }
    if spec.max_version == TlsVersion::Tls13 {
        exts.push(ExtensionType::KEY_SHARE);
        exts.push(ExtensionType::SUPPORTED_VERSIONS);
        exts.push(ExtensionType::PSK_KEY_EXCHANGE_MODES);
    }
    exts
}

fn plan(spec: &FingerprintSpec) -> Result<Plan, NetError> {
    if spec.compression_methods != [COMPRESSION_NULL] {
        return Err(unsupported(spec, "only the null compression method can be offered"));
    }
    if spec.min_version > spec.max_version {
        return Err(unsupported(spec, "minimum TLS version above maximum"));
    }

    // Ciphers: at most one leading GREASE, then the TLS 1.3 block, then the
    // configurable TLS 1.2 list.
    let grease = spec.grease();
    let mut suites = spec.cipher_suites.as_slice();
    if grease {
        if !suites.first().is_some_and(CipherSuite::is_grease)
            || suites.iter().filter(|s| s.is_grease()).count() != 1
        {
            return Err(unsupported(spec, "GREASE cipher must be a single leading entry"));
        }
        suites = &suites[1..];
    }
    let tls13: Vec<CipherSuite> = suites.iter().copied().filter(CipherSuite::is_tls13).collect();
    if spec.max_version == TlsVersion::Tls13 {
        if tls13 != TLS13_SUITES || !suites.starts_with(TLS13_SUITES) {
            return Err(unsupported(
                spec,
                "TLS 1.3 suites must be 0x1301, 0x1302, 0x1303 in that order ahead of TLS 1.2 suites",
            ));
        }
    } else if !tls13.is_empty() {
        return Err(unsupported(spec, "TLS 1.3 suites offered with TLS 1.3 disabled"));
    }
    let mut cipher_names = Vec::new();
    for suite in suites.iter().filter(|s| !s.is_tls13()) {
        let name = cipher_name(*suite)
            .ok_or_else(|| unsupported(spec, format!("cipher suite 0x{:04x}", suite.0)))?;
        cipher_names.push(name);
    }
    if cipher_names.is_empty() && spec.min_version == TlsVersion::Tls12 {
        return Err(unsupported(spec, "no TLS 1.2 cipher suites"));
    }

    // Extensions.
    let grease_exts = spec.extensions.iter().filter(|e| e.is_grease()).count();
    if (grease && grease_exts != 2) || (!grease && grease_exts != 0) {
        return Err(unsupported(
            spec,
            "GREASE extensions must appear exactly twice, together with a GREASE cipher",
        ));
    }
    let declared: Vec<ExtensionType> = spec
        .extensions
        .iter()
        .copied()
        .filter(|e| !e.is_grease())
        .collect();
    for ext in &declared {
        if !NATIVE_EXTENSION_ORDER.contains(ext) {
            return Err(unsupported(spec, format!("extension {}", ext.0)));
        }
    }
    for ext in mandatory_extensions(spec) {
        if !declared.contains(&ext) {
            return Err(unsupported(spec, format!("extension {} is always sent", ext.0)));
        }
    }
    let toggles = [
        (ExtensionType::SESSION_TICKET, spec.session_ticket, "session_ticket"),
        (ExtensionType::APPLICATION_SETTINGS, !spec.alps.is_empty(), "application_settings"),
        (ExtensionType::ENCRYPTED_CLIENT_HELLO, spec.ech_grease, "encrypted_client_hello"),
        (ExtensionType::COMPRESS_CERTIFICATE, !spec.cert_compression.is_empty(), "compress_certificate"),
        (ExtensionType::ALPN, !spec.alpn.is_empty(), "alpn"),
    ];
    for (ext, enabled, name) in toggles {
        if declared.contains(&ext) != enabled {
            return Err(unsupported(
                spec,
                format!("{name} extension does not match its setting"),
            ));
        }
    }
    if spec.extension_order == ExtensionOrder::Fixed {
        if grease
            && !(spec.extensions.first().is_some_and(ExtensionType::is_grease)
                && spec.extensions.last().is_some_and(ExtensionType::is_grease))
        {
            return Err(unsupported(spec, "GREASE extensions must be first and last"));
        }
        let mut native = NATIVE_EXTENSION_ORDER.iter();
        for ext in &declared {
            if !native.any(|n| n == ext) {
                return Err(unsupported(
                    spec,
                    format!("extension order cannot be reproduced at {}", ext.0),
                ));
            }
        }
    }

    // Groups and signature algorithms.
    let mut curves = Vec::new();
    for (i, group) in spec.curves.iter().enumerate() {
        if group.is_grease() {
            if !grease || i != 0 {
                return Err(unsupported(spec, "GREASE group must lead and match GREASE ciphers"));
            }
            continue;
        }
        curves.push(
            group_name(*group)
                .ok_or_else(|| unsupported(spec, format!("group 0x{:04x}", group.0)))?,
        );
    }
    let mut sigalgs = Vec::new();
    for scheme in &spec.signature_algorithms {
        let name = sigalg_name(*scheme)
            .ok_or_else(|| unsupported(spec, format!("signature scheme 0x{:04x}", scheme.0)))?;
        if sigalgs.contains(&name) {
            return Err(unsupported(spec, format!("duplicate signature scheme {name}")));
        }
        sigalgs.push(name);
    }

    let alpn = alpn_wire(&spec.alpn).ok_or_else(|| unsupported(spec, "malformed ALPN list"))?;
    for proto in &spec.alps {
        if !spec.alpn.contains(proto) {
            return Err(unsupported(spec, format!("ALPS protocol {proto} not offered in ALPN")));
        }
    }

    Ok(Plan {
        cipher_list: cipher_names.join(":"),
        curves: curves.join(":"),
        sigalgs: sigalgs.join(":"),
        alpn,
        grease,
        permute: spec.extension_order == ExtensionOrder::Permuted,
        sni: declared.contains(&ExtensionType::SERVER_NAME),
    })
}

/// [`HandshakeEngine`] backed by BoringSSL.
#[derive(Debug, Clone, Default)]
pub struct BoringEngine {
    accept_invalid_certs: bool,
}

impl BoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip certificate and hostname verification.
    ///
    /// Only for testing against servers with self-signed certificates.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    fn connector(&self, spec: &FingerprintSpec, plan: &Plan) -> Result<SslConnector, NetError> {
        let lib_err = |what: &str, e: ::boring::error::ErrorStack| {
            unsupported(spec, format!("{what}: {e}"))
        };

        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|e| lib_err("context", e))?;
        builder
            .set_min_proto_version(Some(ssl_version(spec.min_version)))
            .map_err(|e| lib_err("min version", e))?;
        builder
            .set_max_proto_version(Some(ssl_version(spec.max_version)))
            .map_err(|e| lib_err("max version", e))?;
        builder
            .set_curves_list(&plan.curves)
            .map_err(|e| lib_err("groups", e))?;
        builder
            .set_sigalgs_list(&plan.sigalgs)
            .map_err(|e| lib_err("signature algorithms", e))?;
        if !plan.alpn.is_empty() {
            builder
                .set_alpn_protos(&plan.alpn)
                .map_err(|e| lib_err("alpn", e))?;
        }
        if !spec.session_ticket {
            builder.set_options(SslOptions::NO_TICKET);
        }
        if self.accept_invalid_certs {
            builder.set_verify(SslVerifyMode::NONE);
        } else {
            builder.set_verify(SslVerifyMode::PEER);
        }

        let cipher_list = CString::new(plan.cipher_list.as_str())
            .map_err(|_| unsupported(spec, "cipher list contains NUL"))?;

        // SAFETY: `ctx` belongs to `builder`, which is exclusively borrowed
        // here and outlives every call below.
        unsafe {
            let ctx = builder.as_ptr();
            if !plan.cipher_list.is_empty()
                && SSL_CTX_set_strict_cipher_list(ctx, cipher_list.as_ptr()) != 1
            {
                return Err(unsupported(spec, "cipher list rejected by BoringSSL"));
            }
            SSL_CTX_set_grease_enabled(ctx, c_int::from(plan.grease));
            SSL_CTX_set_permute_extensions(ctx, c_int::from(plan.permute));
            if spec.has_extension(ExtensionType::STATUS_REQUEST) {
                SSL_CTX_enable_ocsp_stapling(ctx);
            }
            if spec.has_extension(ExtensionType::SIGNED_CERT_TIMESTAMP) {
                SSL_CTX_enable_signed_cert_timestamps(ctx);
            }
            for alg in &spec.cert_compression {
                if !certcompress::register(ctx, *alg) {
                    return Err(unsupported(
                        spec,
                        format!("certificate compression {alg:?} rejected"),
                    ));
                }
            }
        }

        Ok(builder.build())
    }

    fn configure(
        &self,
        spec: &FingerprintSpec,
        plan: &Plan,
        host: &str,
    ) -> Result<ConnectConfiguration, NetError> {
        let connector = self.connector(spec, plan)?;
        let mut config = connector
            .configure()
            .map_err(|e| NetError::SslProtocolError(e.to_string()))?;
        config.set_use_server_name_indication(plan.sni && should_set_sni(host));
        if self.accept_invalid_certs {
            config.set_verify_hostname(false);
        }

        // SAFETY: the SSL object is owned by `config` and not yet in use.
        unsafe {
            let ssl = config.as_ptr();
            if spec.ech_grease {
                SSL_set_enable_ech_grease(ssl, 1);
            }
            for proto in &spec.alps {
                if SSL_add_application_settings(
                    ssl,
                    proto.as_ptr(),
                    proto.len(),
                    std::ptr::null(),
                    0,
                ) != 1
                {
                    return Err(unsupported(spec, format!("ALPS for {proto} rejected")));
                }
            }
        }
        Ok(config)
    }
}

impl HandshakeEngine for BoringEngine {
    fn validate(&self, spec: &FingerprintSpec) -> Result<(), NetError> {
        let plan = plan(spec)?;
        self.connector(spec, &plan).map(|_| ())
    }

    fn handshake<'a>(
        &'a self,
        spec: &'a FingerprintSpec,
        host: &'a str,
        stream: TcpStream,
    ) -> BoxFuture<'a, Result<HandshakeOutput, NetError>> {
        Box::pin(async move {
            let plan = plan(spec)?;
            let config = self.configure(spec, &plan, host)?;
            let domain = host.trim_start_matches('[').trim_end_matches(']');

            tracing::debug!(profile = %spec.name, host, "starting TLS handshake");
            let tls = tokio_boring::connect(config, domain, stream)
                .await
                .map_err(|e| {
                    tracing::debug!(profile = %spec.name, host, error = %e, "TLS handshake failed");
                    NetError::SslProtocolError(e.to_string())
                })?;

            let ssl = tls.ssl();
            let session = NegotiatedSession {
                profile: spec.name.clone(),
                alpn: ssl
                    .selected_alpn_protocol()
                    .map(|p| String::from_utf8_lossy(p).into_owned()),
                version: Some(ssl.version_str().to_string()),
                cipher: ssl.current_cipher().map(|c| c.name().to_string()),
                resumed: ssl.session_reused(),
            };
            tracing::debug!(
                profile = %spec.name,
                alpn = ?session.alpn,
                version = ?session.version,
                "TLS handshake complete"
            );
            Ok((Box::new(tls) as Box<dyn TlsStream>, session))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::neterror::ErrorKind;
    use crate::emulation::profiles::{chrome, firefox, safari};
    use crate::emulation::NamedGroup;

    fn reason(err: NetError) -> String {
        match err {
            NetError::UnsupportedFingerprint { reason, .. } => reason,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_chrome_plan() {
        let plan = plan(&chrome::chrome_v124()).unwrap();
        assert!(plan.grease);
        assert!(plan.permute);
        assert!(plan.sni);
        assert!(plan.curves.starts_with("X25519Kyber768Draft00:X25519"));
        assert_eq!(plan.cipher_list.split(':').count(), 12);
        assert_eq!(plan.sigalgs.split(':').count(), 8);
    }

    #[test]
    fn test_firefox_rejected() {
        let err = plan(&firefox::firefox_v133()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(reason(err).contains("TLS 1.3"));
    }

    #[test]
    fn test_safari_3des_rejected() {
        let err = plan(&safari::safari_v17()).unwrap_err();
        assert!(reason(err).contains("0xc008"));
    }

    #[test]
    fn test_compression_methods_rejected() {
        let mut spec = chrome::chrome_v124();
        spec.compression_methods = vec![0, 1];
        assert!(reason(plan(&spec).unwrap_err()).contains("compression"));
    }

    #[test]
    fn test_fixed_order_must_follow_native() {
        let mut spec = chrome::chrome_v120();
        spec.extension_order = ExtensionOrder::Fixed;
        assert!(plan(&spec).is_err());

        spec.extensions.sort_by_key(|e| {
            NATIVE_EXTENSION_ORDER
                .iter()
                .position(|n| n == e)
                .unwrap_or(usize::MAX)
        });
        // Sorting moved both GREASE entries to the end.
        let n = spec.extensions.len();
        spec.extensions.rotate_right(1);
        assert!(spec.extensions[0].is_grease() && spec.extensions[n - 1].is_grease());
        assert!(plan(&spec).is_ok());
    }

    #[test]
    fn test_session_ticket_toggle_must_match() {
        let mut spec = chrome::chrome_v124();
        spec.session_ticket = false;
        assert!(reason(plan(&spec).unwrap_err()).contains("session_ticket"));
    }

    #[test]
    fn test_unknown_group_rejected() {
        let mut spec = chrome::chrome_v124();
        spec.curves.push(NamedGroup::FFDHE3072);
        assert!(reason(plan(&spec).unwrap_err()).contains("0x0101"));
    }

    #[test]
    fn test_missing_mandatory_extension() {
        let mut spec = chrome::chrome_v124();
        spec.extensions
            .retain(|e| *e != ExtensionType::EXTENDED_MASTER_SECRET);
        assert!(reason(plan(&spec).unwrap_err()).contains("always sent"));
    }
}
