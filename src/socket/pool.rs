//! Connection pool.
//!
//! Connections are grouped by [`PoolKey`]. A group holds idle HTTP/1.1
//! sockets and at most one shared HTTP/2 session. Every live connection owns
//! a [`SlotGuard`]; dropping the guard frees the slot and wakes one waiter,
//! so the per-host and total limits are enforced without any bookkeeping on
//! the error paths.

use crate::base::neterror::NetError;
use crate::http::h2::H2Session;
use crate::socket::client::WrappedSocket;
use crate::socket::proxy::ProxySettings;
use crate::socket::tls::NegotiatedSession;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Notify;
use url::Url;

/// Identifies a connection group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Proxy identity (address and user), if routed through one.
    pub proxy: Option<String>,
    /// Fingerprint profile presented on the connection.
    pub profile: String,
    pub http1_only: bool,
}

impl PoolKey {
    pub fn new(
        url: &Url,
        proxy: Option<&ProxySettings>,
        profile: &str,
        http1_only: bool,
    ) -> Result<Self, NetError> {
        Ok(PoolKey {
            scheme: url.scheme().to_string(),
            host: url.host_str().ok_or(NetError::InvalidUrl)?.to_string(),
            port: url.port_or_known_default().ok_or(NetError::InvalidUrl)?,
            proxy: proxy.map(ProxySettings::identity),
            profile: profile.to_string(),
            http1_only,
        })
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Pool limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Live connections per key (Chromium: 6).
    pub max_per_host: usize,
    /// Live connections overall (Chromium: 256).
    pub max_total: usize,
    /// Idle HTTP/1.1 connections and idle HTTP/2 sessions expire after this.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_host: 6,
            max_total: 256,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

struct IdleConn {
    socket: WrappedSocket,
    slot: SlotGuard,
    since: Instant,
    session: Option<NegotiatedSession>,
}

struct Group {
    idle: VecDeque<IdleConn>,
    h2: Option<H2Session>,
    /// Live connections, idle ones included.
    slots: usize,
    notify: Arc<Notify>,
}

impl Group {
    fn new() -> Self {
        Self {
            idle: VecDeque::new(),
            h2: None,
            slots: 0,
            notify: Arc::new(Notify::new()),
        }
    }
}

struct Inner {
    groups: DashMap<PoolKey, Group>,
    total: AtomicUsize,
    global: Notify,
    config: PoolConfig,
}

/// Holds one connection slot of a group. Dropping it frees the slot.
pub struct SlotGuard {
    inner: Weak<Inner>,
    key: PoolKey,
}

impl fmt::Debug for SlotGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotGuard").field("key", &self.key).finish()
    }
}

impl SlotGuard {
    pub fn key(&self) -> &PoolKey {
        &self.key
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut closed = None;
        let notify = match inner.groups.get_mut(&self.key) {
            Some(mut group) => {
                group.slots = group.slots.saturating_sub(1);
                if group.h2.as_ref().is_some_and(H2Session::is_closed) {
                    closed = group.h2.take();
                }
                Some(group.notify.clone())
            }
            None => None,
        };
        drop(closed);
        inner.total.fetch_sub(1, Ordering::AcqRel);
        if let Some(notify) = notify {
            notify.notify_one();
        }
        inner.global.notify_one();
    }
}

/// Outcome of [`ConnectionPool::acquire`].
#[derive(Debug)]
pub enum Acquired {
    /// A live HTTP/2 session to multiplex on.
    H2(H2Session),
    /// An idle HTTP/1.1 connection.
    Idle(PooledSocket),
    /// Permission to open a new connection.
    Slot(SlotGuard),
}

enum Attempt {
    Ready(Acquired),
    WaitGroup(Arc<Notify>),
    WaitGlobal,
}

/// Pool of connections shared by all requests of a client.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("connections", &self.connection_count())
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                groups: DashMap::new(),
                total: AtomicUsize::new(0),
                global: Notify::new(),
                config,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get a connection for `key`, waiting in FIFO order while the limits
    /// are reached.
    pub async fn acquire(&self, key: &PoolKey) -> Acquired {
        let mut waited = false;
        loop {
            let mut discarded = Vec::new();
            let attempt = self.try_acquire(key, &mut discarded);
            drop(discarded);

            match attempt {
                Attempt::Ready(acquired) => {
                    if waited {
                        if let Acquired::H2(_) = acquired {
                            // Other waiters may share the same session.
                            if let Some(group) = self.inner.groups.get(key) {
                                group.notify.notify_one();
                            }
                        }
                    }
                    return acquired;
                }
                Attempt::WaitGroup(notify) => {
                    tracing::trace!(key = %key, "per-host limit reached, waiting");
                    notify.notified().await;
                }
                Attempt::WaitGlobal => {
                    if let Some(conn) = self.evict_idle(key) {
                        tracing::debug!(key = %conn.slot.key, "evicting idle connection for global limit");
                        drop(conn);
                        continue;
                    }
                    tracing::trace!(key = %key, "global limit reached, waiting");
                    self.inner.global.notified().await;
                }
            }
            waited = true;
        }
    }

    fn try_acquire(&self, key: &PoolKey, discarded: &mut Vec<IdleConn>) -> Attempt {
        let config = &self.inner.config;
        let mut group = self
            .inner
            .groups
            .entry(key.clone())
            .or_insert_with(Group::new);

        if let Some(session) = &group.h2 {
            if session.is_usable() {
                return Attempt::Ready(Acquired::H2(session.clone()));
            }
            group.h2 = None;
        }

        while let Some(conn) = group.idle.pop_back() {
            if conn.since.elapsed() >= config.idle_timeout {
                discarded.push(conn);
                continue;
            }
            if let Err(e) = conn.socket.is_usable() {
                tracing::warn!(key = %key, error = %e, "discarding unusable idle connection");
                discarded.push(conn);
                continue;
            }
            return Attempt::Ready(Acquired::Idle(PooledSocket {
                socket: conn.socket,
                slot: conn.slot,
                reused: true,
                session: conn.session,
            }));
        }

        if group.slots >= config.max_per_host {
            return Attempt::WaitGroup(group.notify.clone());
        }
        if !self.reserve_global() {
            return Attempt::WaitGlobal;
        }
        group.slots += 1;
        Attempt::Ready(Acquired::Slot(SlotGuard {
            inner: Arc::downgrade(&self.inner),
            key: key.clone(),
        }))
    }

    fn reserve_global(&self) -> bool {
        let max = self.inner.config.max_total;
        self.inner
            .total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    /// Take the oldest idle connection of some other group.
    fn evict_idle(&self, except: &PoolKey) -> Option<IdleConn> {
        for mut entry in self.inner.groups.iter_mut() {
            if entry.key() == except {
                continue;
            }
            if let Some(conn) = entry.idle.pop_front() {
                return Some(conn);
            }
        }
        None
    }

    /// Publish a freshly negotiated HTTP/2 session for `key`.
    ///
    /// If another usable session won the race it is returned instead and
    /// `session` is left to close once the caller drops it.
    pub fn install_h2(&self, key: &PoolKey, session: H2Session) -> H2Session {
        let mut group = self
            .inner
            .groups
            .entry(key.clone())
            .or_insert_with(Group::new);
        if let Some(existing) = &group.h2 {
            if existing.is_usable() && existing.id() != session.id() {
                return existing.clone();
            }
        }
        group.h2 = Some(session.clone());
        let notify = group.notify.clone();
        drop(group);
        tracing::debug!(key = %key, session = session.id(), "http2 session pooled");
        notify.notify_waiters();
        notify.notify_one();
        session
    }

    /// Wrap a newly connected HTTP/1.1 socket.
    pub fn checkout(
        &self,
        socket: WrappedSocket,
        slot: SlotGuard,
        session: Option<NegotiatedSession>,
    ) -> PooledSocket {
        PooledSocket {
            socket,
            slot,
            reused: false,
            session,
        }
    }

    /// Drop expired idle connections, idle HTTP/2 sessions past the idle
    /// timeout and empty groups.
    pub fn cleanup_idle(&self) {
        let timeout = self.inner.config.idle_timeout;
        let mut expired = Vec::new();
        let mut sessions = Vec::new();

        for mut entry in self.inner.groups.iter_mut() {
            let group = entry.value_mut();
            let mut kept = VecDeque::with_capacity(group.idle.len());
            for conn in group.idle.drain(..) {
                if conn.since.elapsed() < timeout && conn.socket.is_usable().is_ok() {
                    kept.push_back(conn);
                } else {
                    expired.push(conn);
                }
            }
            group.idle = kept;

            let stale = group.h2.as_ref().is_some_and(|s| {
                !s.is_usable() || s.idle_for().is_some_and(|idle| idle >= timeout)
            });
            if stale {
                sessions.extend(group.h2.take());
            }
        }
        self.inner
            .groups
            .retain(|_, g| g.slots > 0 || !g.idle.is_empty() || g.h2.is_some());

        if !expired.is_empty() || !sessions.is_empty() {
            tracing::debug!(
                idle = expired.len(),
                sessions = sessions.len(),
                "expired pooled connections"
            );
        }
    }

    /// Periodically run [`cleanup_idle`](Self::cleanup_idle). The task ends
    /// when the pool is dropped.
    pub fn start_cleanup_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ConnectionPool { inner }.cleanup_idle();
            }
        })
    }

    /// Live connections, idle ones included.
    pub fn connection_count(&self) -> usize {
        self.inner.total.load(Ordering::Acquire)
    }

    /// Connections checked out or carrying HTTP/2 streams.
    pub fn active_count(&self) -> usize {
        self.connection_count().saturating_sub(self.idle_count())
    }

    pub fn idle_count(&self) -> usize {
        self.inner.groups.iter().map(|g| g.idle.len()).sum()
    }

    pub fn h2_session_count(&self) -> usize {
        self.inner
            .groups
            .iter()
            .filter(|g| g.h2.as_ref().is_some_and(H2Session::is_usable))
            .count()
    }

    fn release(&self, conn: IdleConn) {
        let key = conn.slot.key.clone();
        let rejected = match self.inner.groups.get_mut(&key) {
            Some(mut group) => {
                let notify = group.notify.clone();
                group.idle.push_back(conn);
                drop(group);
                notify.notify_one();
                self.inner.global.notify_one();
                None
            }
            None => Some(conn),
        };
        drop(rejected);
    }
}

/// An HTTP/1.1 connection checked out of the pool.
///
/// Dropping it closes the connection; [`release`](Self::release) hands it
/// back for reuse.
#[derive(Debug)]
pub struct PooledSocket {
    socket: WrappedSocket,
    slot: SlotGuard,
    reused: bool,
    session: Option<NegotiatedSession>,
}

impl PooledSocket {
    /// The connection served an earlier request.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn session(&self) -> Option<&NegotiatedSession> {
        self.session.as_ref()
    }

    pub fn key(&self) -> &PoolKey {
        &self.slot.key
    }

    /// Return a protocol-clean connection to its group's idle list.
    pub fn release(self, pool: &ConnectionPool) {
        let PooledSocket {
            mut socket,
            slot,
            session,
            ..
        } = self;
        socket.mark_used();
        tracing::trace!(key = %slot.key, "connection released to pool");
        pool.release(IdleConn {
            socket,
            slot,
            since: Instant::now(),
            session,
        });
    }
}

impl AsyncRead for PooledSocket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().socket).poll_read(cx, buf)
    }
}

impl AsyncWrite for PooledSocket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().socket).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().socket).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().socket).poll_shutdown(cx)
    }
}
