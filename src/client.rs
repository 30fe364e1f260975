//! HTTP Client with builder pattern.
//!
//! Provides a high-level, ergonomic API for making HTTP requests with
//! browser fingerprint emulation.
//!
//! # Example
//!
//! ```rust,no_run
//! use wirenet::Client;
//!
//! # async fn run() -> Result<(), wirenet::NetError> {
//! let client = Client::builder().profile("chrome-auto").build()?;
//!
//! let resp = client
//!     .get("https://example.com")
//!     .header("X-Custom", "1")
//!     .header_order(["user-agent", "accept-encoding", "x-custom"])
//!     .send()
//!     .await?;
//! println!("{} {}", resp.status(), resp.text().await?);
//! # Ok(())
//! # }
//! ```

use crate::base::cancel::{CancellationToken, Interrupt};
use crate::base::neterror::NetError;
use crate::base::trace::ClientTrace;
use crate::config::ClientConfig;
use crate::emulation::{FingerprintRegistry, FingerprintSpec};
use crate::http::transaction::{HttpNetworkSession, HttpNetworkTransaction, HttpRequestInfo};
use crate::http::{HttpResponse, OrderedHeaders, RequestBody};
use crate::socket::pool::{ConnectionPool, PoolConfig};
use crate::socket::proxy::{ProxyResolver, ProxySettings};
use crate::socket::tls::{BoringEngine, HandshakeEngine};
use http::Method;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// Value of the `Accept-Encoding` field added when a request sets none.
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br, zstd";

/// Value of the `User-Agent` field added when a request sets none.
pub const DEFAULT_USER_AGENT: &str = concat!("wirenet/", env!("CARGO_PKG_VERSION"));

const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP Client for making requests.
///
/// Cloning is cheap; clones share the connection pool.
/// Use [`Client::builder()`] to configure and create a client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientRef>,
}

struct ClientRef {
    session: Arc<HttpNetworkSession>,
    registry: Option<Arc<FingerprintRegistry>>,
    spec: Arc<FingerprintSpec>,
    trace: ClientTrace,
    timeout: Option<Duration>,
    user_agent: String,
    cleanup: Option<JoinHandle<()>>,
}

impl Drop for ClientRef {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup.take() {
            task.abort();
        }
    }
}

impl ClientRef {
    fn registry(&self) -> &FingerprintRegistry {
        match &self.registry {
            Some(r) => r,
            None => FingerprintRegistry::global(),
        }
    }

    /// Fill in the fields every request carries unless the caller set them.
    fn apply_defaults(&self, headers: &mut OrderedHeaders) {
        if self.session.decompress && !headers.contains("accept-encoding") {
            headers.add("Accept-Encoding", DEFAULT_ACCEPT_ENCODING);
        }
        if !headers.contains("user-agent") {
            headers.add("User-Agent", self.user_agent.as_str());
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("profile", &self.inner.spec.name)
            .field("session", &self.inner.session)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl Client {
    /// Client with default settings (`chrome-auto`, no proxy).
    pub fn new() -> Result<Self, NetError> {
        Self::builder().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// The fingerprint requests use unless they override it.
    pub fn profile(&self) -> &FingerprintSpec {
        &self.inner.spec
    }

    /// The connection pool, for statistics.
    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.session.pool
    }

    /// Start building a GET request.
    pub fn get<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Start building a POST request.
    pub fn post<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Start building a PUT request.
    pub fn put<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Start building a DELETE request.
    pub fn delete<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Start building a HEAD request.
    pub fn head<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// Start building a PATCH request.
    pub fn patch<U: AsRef<str>>(&self, url: U) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    /// Start building a request with custom method.
    pub fn request<U: AsRef<str>>(&self, method: Method, url: U) -> RequestBuilder {
        RequestBuilder {
            client: self.clone(),
            method,
            url: url.as_ref().to_string(),
            headers: OrderedHeaders::new(),
            body: RequestBody::Empty,
            profile: None,
            trace: None,
            cancel: None,
            timeout: None,
            error: None,
        }
    }
}

/// Builder for creating a [`Client`].
#[derive(Default)]
#[must_use]
pub struct ClientBuilder {
    config: ClientConfig,
    proxy: Option<Arc<dyn ProxyResolver>>,
    engine: Option<Arc<dyn HandshakeEngine>>,
    registry: Option<FingerprintRegistry>,
    trace: ClientTrace,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("proxy", &self.proxy)
            .field("engine", &self.engine)
            .finish()
    }
}

impl ClientBuilder {
    /// Start from a configuration record.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            config: config.clone(),
            ..Self::default()
        }
    }

    /// Select the fingerprint profile by name or alias.
    pub fn profile(mut self, name: &str) -> Self {
        self.config.profile = name.to_string();
        self
    }

    /// Route requests through a fixed HTTP proxy.
    pub fn proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(Arc::new(proxy));
        self
    }

    /// Pick the proxy per request.
    pub fn proxy_resolver<R: ProxyResolver + 'static>(mut self, resolver: R) -> Self {
        self.proxy = Some(Arc::new(resolver));
        self
    }

    /// Total time allowed per request, body included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn pool_max_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_per_host = max;
        self
    }

    pub fn pool_max_total(mut self, max: usize) -> Self {
        self.config.pool_max_total = max;
        self
    }

    pub fn http1_only(mut self, enabled: bool) -> Self {
        self.config.http1_only = enabled;
        self
    }

    pub fn http2_prior_knowledge(mut self, enabled: bool) -> Self {
        self.config.http2_prior_knowledge = enabled;
        self
    }

    /// Skip certificate verification. Only affects the built-in engine.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.config.danger_accept_invalid_certs = accept;
        self
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.config.user_agent = Some(ua.to_string());
        self
    }

    /// Leave response bodies encoded and send no default `Accept-Encoding`.
    pub fn disable_decompression(mut self, disable: bool) -> Self {
        self.config.disable_decompression = disable;
        self
    }

    /// Replace the BoringSSL handshake engine.
    pub fn handshake_engine(mut self, engine: Arc<dyn HandshakeEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Resolve profiles from `registry` instead of the built-in one.
    pub fn registry(mut self, registry: FingerprintRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Trace hooks for requests that do not bring their own.
    pub fn trace(mut self, trace: ClientTrace) -> Self {
        self.trace = trace;
        self
    }

    /// Build the client.
    ///
    /// Fails with a configuration error if the profile is unknown, the
    /// handshake engine cannot reproduce it, or the proxy is unsupported.
    pub fn build(self) -> Result<Client, NetError> {
        let config = self.config;
        if config.pool_max_per_host == 0 || config.pool_max_total == 0 {
            return Err(NetError::InvalidConfig(
                "pool limits must be at least 1".to_string(),
            ));
        }

        let registry = self.registry.map(Arc::new);
        let spec = match &registry {
            Some(r) => r.resolve(&config.profile)?,
            None => FingerprintRegistry::global().resolve(&config.profile)?,
        };

        let engine = match self.engine {
            Some(engine) => engine,
            None => Arc::new(
                BoringEngine::new().danger_accept_invalid_certs(config.danger_accept_invalid_certs),
            ),
        };
        engine.validate(&spec)?;
        if config.http1_only {
            engine.validate(&spec.http1_only())?;
        }

        let proxy = match self.proxy {
            Some(resolver) => Some(resolver),
            None => match &config.proxy {
                Some(url) => {
                    let mut settings = ProxySettings::parse(url)?;
                    if let Some(no_proxy) = &config.no_proxy {
                        settings = settings.with_bypass(no_proxy);
                    }
                    Some(Arc::new(settings) as Arc<dyn ProxyResolver>)
                }
                None => None,
            },
        };

        let pool = ConnectionPool::new(PoolConfig {
            max_per_host: config.pool_max_per_host,
            max_total: config.pool_max_total,
            idle_timeout: config.pool_idle_timeout(),
        });
        // Outside a runtime idle connections are still expired lazily on
        // checkout.
        let cleanup = tokio::runtime::Handle::try_current().ok().map(|_| {
            pool.start_cleanup_task(CLEANUP_INTERVAL.min(config.pool_idle_timeout()))
        });

        tracing::debug!(
            profile = %spec.name,
            proxy = proxy.is_some(),
            http1_only = config.http1_only,
            "client built"
        );

        let session = HttpNetworkSession {
            pool,
            engine,
            proxy,
            connect_timeout: config.connect_timeout(),
            http1_only: config.http1_only,
            http2_prior_knowledge: config.http2_prior_knowledge,
            decompress: !config.disable_decompression,
        };
        Ok(Client {
            inner: Arc::new(ClientRef {
                session: Arc::new(session),
                registry,
                spec,
                trace: self.trace,
                timeout: config.timeout(),
                user_agent: config
                    .user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
                cleanup,
            }),
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for a single request.
///
/// Header fields keep the order they are added in unless
/// [`header_order`](Self::header_order) says otherwise.
#[must_use]
pub struct RequestBuilder {
    client: Client,
    method: Method,
    url: String,
    headers: OrderedHeaders,
    body: RequestBody,
    profile: Option<String>,
    trace: Option<ClientTrace>,
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
    /// First builder error, reported by `send`.
    error: Option<NetError>,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("profile", &self.profile)
            .finish()
    }
}

impl RequestBuilder {
    /// Set a header, replacing earlier values of the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Append a value, keeping earlier ones.
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    /// Use a prepared container, order metadata included.
    pub fn headers(mut self, headers: OrderedHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Wire order of regular fields.
    pub fn header_order<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers.set_order(names);
        self
    }

    /// HTTP/2 pseudo-header order.
    pub fn pseudo_header_order<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if let Err(e) = self.headers.set_pseudo_order(names) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Set request body.
    pub fn body<B: Into<RequestBody>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Set JSON body.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize>(mut self, json: &T) -> Self {
        match serde_json::to_vec(json) {
            Ok(bytes) => {
                self.body = bytes.into();
                if !self.headers.contains("content-type") {
                    self.headers.set("Content-Type", "application/json");
                }
            }
            Err(e) => {
                self.error
                    .get_or_insert(NetError::InvalidHeader(format!("json body: {e}")));
            }
        }
        self
    }

    /// Override the fingerprint profile for this request.
    pub fn profile(mut self, name: &str) -> Self {
        self.profile = Some(name.to_string());
        self
    }

    /// Trace hooks for this request only.
    pub fn trace(mut self, trace: ClientTrace) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Abort the request, body reads included, when `token` fires.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Total time for this request, body included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send the request.
    pub async fn send(self) -> Result<HttpResponse, NetError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let url = Url::parse(&self.url).map_err(|_| NetError::InvalidUrl)?;
        let client = &self.client.inner;

        let spec = match &self.profile {
            Some(name) => {
                let spec = client.registry().resolve(name)?;
                client.session.engine.validate(&spec)?;
                spec
            }
            None => client.spec.clone(),
        };

        let mut headers = self.headers;
        client.apply_defaults(&mut headers);

        let deadline = self
            .timeout
            .or(client.timeout)
            .map(|t| tokio::time::Instant::now() + t);
        let interrupt = Interrupt::new(self.cancel, deadline);
        let trace = self.trace.unwrap_or_else(|| client.trace.clone());

        tracing::debug!(method = %self.method, url = %url, profile = %spec.name, "sending request");
        let request = HttpRequestInfo {
            method: self.method,
            url,
            headers,
            body: self.body,
        };
        let mut txn =
            HttpNetworkTransaction::new(client.session.clone(), request, spec, trace, interrupt);
        txn.start().await
    }
}
