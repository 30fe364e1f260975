//! # wirenet
//!
//! An HTTP client whose wire output looks like a browser's.
//!
//! `wirenet` sends HTTP/1.1 and HTTP/2 requests with the header order the
//! caller asks for, negotiates TLS with a browser's ClientHello through a
//! pluggable handshake engine, pools connections Chromium-style and decodes
//! compressed bodies on the fly.
//!
//! ## Features
//!
//! - **Ordered headers**: explicit field and pseudo-header order, honoured by
//!   both protocol writers
//! - **Browser fingerprints**: Chrome, Edge, Firefox, Safari and iOS profiles
//!   for the TLS handshake and HTTP/2 SETTINGS
//! - **Connection Pooling**: 6 connections per host, 256 total, shared HTTP/2
//!   sessions
//! - **Decompression**: gzip, deflate, brotli and zstd
//! - **Proxy Support**: HTTP proxies with CONNECT tunnelling and NO_PROXY
//! - **Cancellation**: per-request tokens and deadlines, observed at every
//!   await
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wirenet::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wirenet::NetError> {
//!     let client = Client::builder().profile("chrome-auto").build()?;
//!     let response = client.get("https://example.com").send().await?;
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Errors, cancellation, trace hooks
//! - [`emulation`] - Fingerprint specifications and the profile registry
//! - [`http`] - Ordered headers, protocol writers, responses
//! - [`socket`] - Connection pooling, proxies and TLS engines
//! - [`config`] - Serializable client configuration

pub mod base;
pub mod client;
pub mod config;
pub mod emulation;
pub mod http;
pub mod socket;

pub use base::cancel::CancellationToken;
pub use base::neterror::{ErrorKind, NetError};
pub use base::trace::{ClientTrace, ConnInfo};
pub use client::{Client, ClientBuilder, RequestBuilder};
pub use config::ClientConfig;
pub use emulation::{FingerprintRegistry, FingerprintSpec};
pub use http::{HttpResponse, OrderedHeaders, ResponseBody};
