//! ClientHello fidelity: what BoringSSL puts on the wire for each
//! reproducible profile, captured by a fake server.

mod common;

use common::capture_client_hello;
use std::collections::BTreeMap;
use wirenet::emulation::ExtensionType;
use wirenet::{Client, ErrorKind, FingerprintRegistry};

const PADDING: u16 = 21;
const PRE_SHARED_KEY: u16 = 41;

fn is_grease(v: u16) -> bool {
    v & 0x0f0f == 0x0a0a && (v >> 8) == (v & 0xff)
}

fn multiset(values: impl IntoIterator<Item = u16>) -> BTreeMap<u16, usize> {
    let mut counts = BTreeMap::new();
    for v in values {
        *counts.entry(if is_grease(v) { 0x0a0a } else { v }).or_insert(0) += 1;
    }
    counts
}

async fn check_profile(profile: &str) {
    let spec = FingerprintRegistry::global().resolve(profile).unwrap();
    let (port, hello) = capture_client_hello().await;
    let client = Client::builder().profile(profile).build().unwrap();

    // The fake server hangs up after the ClientHello.
    let err = client
        .get(format!("https://localhost:{port}/"))
        .send()
        .await
        .unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::Handshake | ErrorKind::Protocol),
        "unexpected error {err:?}"
    );

    let hello = hello.await.unwrap();

    let wanted_suites: Vec<u16> = spec.cipher_suites.iter().map(|c| c.0).collect();
    assert_eq!(hello.cipher_suites.len(), wanted_suites.len(), "{profile}");
    assert!(is_grease(hello.cipher_suites[0]), "{profile}");
    // TLS 1.3 suite order depends on AES hardware support, so compare sets.
    assert_eq!(
        multiset(hello.cipher_suites.iter().copied()),
        multiset(wanted_suites),
        "{profile}"
    );

    let sent: Vec<u16> = hello
        .extensions
        .iter()
        .copied()
        .filter(|e| *e != PADDING && *e != PRE_SHARED_KEY)
        .collect();
    let wanted: Vec<u16> = spec.extensions.iter().map(|e| e.0).collect();
    assert_eq!(sent.len(), wanted.len(), "{profile}: {sent:?}");
    assert_eq!(multiset(sent), multiset(wanted), "{profile}");
    assert!(hello.extensions.contains(&ExtensionType::SERVER_NAME.0));
}

#[tokio::test]
async fn test_chrome_client_hello() {
    check_profile("chrome-auto").await;
}

#[tokio::test]
async fn test_edge_client_hello() {
    check_profile("edge-auto").await;
}

#[tokio::test]
async fn test_no_sni_for_ip_literal() {
    let (port, hello) = capture_client_hello().await;
    let client = Client::builder().profile("chrome-auto").build().unwrap();
    let _ = client.get(format!("https://127.0.0.1:{port}/")).send().await;

    let hello = hello.await.unwrap();
    assert!(!hello.extensions.contains(&ExtensionType::SERVER_NAME.0));
}

#[test]
fn test_unreproducible_profile_is_configuration_error() {
    for profile in ["firefox-auto", "safari-auto"] {
        let err = Client::builder().profile(profile).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration, "{profile}");
    }
}
