//! Request lifecycle trace hooks.
//!
//! A [`ClientTrace`] is a set of optional callbacks fired at fixed points of a
//! request. Hooks only observe; nothing they return feeds back into the
//! request.

use crate::http::Protocol;
use crate::socket::tls::NegotiatedSession;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Details about the connection a request was assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnInfo {
    /// The connection served an earlier request.
    pub reused: bool,
    /// The connection had been idle in the pool.
    pub was_idle: bool,
    pub protocol: Protocol,
}

type Hook0 = Arc<dyn Fn() + Send + Sync>;
type Hook<T> = Arc<dyn Fn(T) + Send + Sync>;
type FieldHook = Arc<dyn Fn(&str, &[String]) + Send + Sync>;

/// Optional lifecycle callbacks.
#[derive(Clone, Default)]
pub struct ClientTrace {
    get_conn: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    got_conn: Option<Arc<dyn Fn(&ConnInfo) + Send + Sync>>,
    connect_done: Option<Hook<SocketAddr>>,
    tls_handshake_start: Option<Hook0>,
    tls_handshake_done: Option<Arc<dyn Fn(&NegotiatedSession) + Send + Sync>>,
    wrote_header_field: Option<FieldHook>,
    wrote_headers: Option<Hook0>,
    wrote_request: Option<Hook0>,
    got_first_response_byte: Option<Hook0>,
}

impl ClientTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called before a connection is looked up, with the pool key rendered as
    /// `scheme://host:port`.
    pub fn on_get_conn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.get_conn = Some(Arc::new(f));
        self
    }

    pub fn on_got_conn<F>(mut self, f: F) -> Self
    where
        F: Fn(&ConnInfo) + Send + Sync + 'static,
    {
        self.got_conn = Some(Arc::new(f));
        self
    }

    pub fn on_connect_done<F>(mut self, f: F) -> Self
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        self.connect_done = Some(Arc::new(f));
        self
    }

    pub fn on_tls_handshake_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.tls_handshake_start = Some(Arc::new(f));
        self
    }

    pub fn on_tls_handshake_done<F>(mut self, f: F) -> Self
    where
        F: Fn(&NegotiatedSession) + Send + Sync + 'static,
    {
        self.tls_handshake_done = Some(Arc::new(f));
        self
    }

    /// Called once per field as it is written, in wire order, with every
    /// value of the field. Pseudo-headers are reported too.
    pub fn on_wrote_header_field<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[String]) + Send + Sync + 'static,
    {
        self.wrote_header_field = Some(Arc::new(f));
        self
    }

    pub fn on_wrote_headers<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.wrote_headers = Some(Arc::new(f));
        self
    }

    pub fn on_wrote_request<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.wrote_request = Some(Arc::new(f));
        self
    }

    pub fn on_got_first_response_byte<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.got_first_response_byte = Some(Arc::new(f));
        self
    }

    pub(crate) fn get_conn(&self, key: &str) {
        if let Some(hook) = &self.get_conn {
            hook(key);
        }
    }

    pub(crate) fn got_conn(&self, info: &ConnInfo) {
        if let Some(hook) = &self.got_conn {
            hook(info);
        }
    }

    pub(crate) fn connect_done(&self, addr: SocketAddr) {
        if let Some(hook) = &self.connect_done {
            hook(addr);
        }
    }

    pub(crate) fn tls_handshake_start(&self) {
        if let Some(hook) = &self.tls_handshake_start {
            hook();
        }
    }

    pub(crate) fn tls_handshake_done(&self, session: &NegotiatedSession) {
        if let Some(hook) = &self.tls_handshake_done {
            hook(session);
        }
    }

    pub(crate) fn wrote_header_field(&self, name: &str, values: &[String]) {
        if let Some(hook) = &self.wrote_header_field {
            hook(name, values);
        }
    }

    pub(crate) fn wrote_headers(&self) {
        if let Some(hook) = &self.wrote_headers {
            hook();
        }
    }

    pub(crate) fn wrote_request(&self) {
        if let Some(hook) = &self.wrote_request {
            hook();
        }
    }

    pub(crate) fn got_first_response_byte(&self) {
        if let Some(hook) = &self.got_first_response_byte {
            hook();
        }
    }
}

impl fmt::Debug for ClientTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTrace")
            .field("get_conn", &self.get_conn.is_some())
            .field("got_conn", &self.got_conn.is_some())
            .field("connect_done", &self.connect_done.is_some())
            .field("tls_handshake_start", &self.tls_handshake_start.is_some())
            .field("tls_handshake_done", &self.tls_handshake_done.is_some())
            .field("wrote_header_field", &self.wrote_header_field.is_some())
            .field("wrote_headers", &self.wrote_headers.is_some())
            .field("wrote_request", &self.wrote_request.is_some())
            .field(
                "got_first_response_byte",
                &self.got_first_response_byte.is_some(),
            )
            .finish()
    }
}
