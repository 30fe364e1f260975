//! `io::Error` to `NetError` conversion at the two places I/O happens:
//! while dialing, and on an established connection.

use crate::base::neterror::NetError;
use std::io;

/// Extension trait for IO Results.
pub trait IoResultExt<T> {
    /// A TCP connect to `host:port` failed. Refusals and timeouts keep
    /// their own codes; anything else carries the address.
    fn connect_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Name lookup for `domain` failed.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;

    /// Read or write on an established connection failed.
    fn stream_context(self) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connect_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| match e.kind() {
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            _ => NetError::connection_failed_to(host, port, e),
        })
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| NetError::dns_failed(domain, e))
    }

    fn stream_context(self) -> Result<T, NetError> {
        self.map_err(|e| NetError::from_io(&e))
    }
}
