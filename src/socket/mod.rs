//! Socket and connection management.
//!
//! Mirrors Chromium's `net/socket/`:
//! - [`pool`]: connection pooling (6 per host, 256 total)
//! - [`connectjob`]: DNS → TCP → proxy tunnel → TLS
//! - [`proxy`]: HTTP proxy routing with NO_PROXY bypass
//! - [`tls`]: the pluggable handshake engine and its BoringSSL implementation

pub mod client;
pub mod connectjob;
pub mod matcher;
pub mod pool;
pub mod proxy;
pub mod tls;

pub use client::{SocketType, StreamSocket, WrappedSocket};
pub use pool::{ConnectionPool, PoolConfig, PoolKey};
pub use proxy::{FnProxyResolver, ProxyResolver, ProxySettings};
pub use tls::{BoringEngine, HandshakeEngine, HandshakeOutput, NegotiatedSession, TlsStream};
