use crate::base::cancel::Interrupt;
use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::base::trace::{ClientTrace, ConnInfo};
use crate::emulation::FingerprintSpec;
use crate::http::decoder::ContentDecoder;
use crate::http::h1::{self, Conn, H1Body};
use crate::http::h2::{self, H2Session};
use crate::http::orderedheaders::{OrderedHeaders, Protocol};
use crate::http::responsebody::BodySource;
use crate::http::writer::{url_authority, RequestHead};
use crate::http::{HttpResponse, RequestBody, ResponseBody};
use crate::socket::client::WrappedSocket;
use crate::socket::connectjob::ConnectJob;
use crate::socket::pool::{Acquired, ConnectionPool, PoolKey, PooledSocket};
use crate::socket::proxy::{ProxyResolver, ProxySettings};
use crate::socket::tls::{HandshakeEngine, NegotiatedSession};
use http::{Method, Version};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// State shared by every transaction of a client.
/// Roughly equivalent to net::HttpNetworkSession.
pub struct HttpNetworkSession {
    pub pool: ConnectionPool,
    pub engine: Arc<dyn HandshakeEngine>,
    pub proxy: Option<Arc<dyn ProxyResolver>>,
    /// Limit for each TCP connect attempt.
    pub connect_timeout: Option<Duration>,
    /// Offer only `http/1.1` over ALPN.
    pub http1_only: bool,
    /// Speak HTTP/2 without negotiation on `http://` URLs.
    pub http2_prior_knowledge: bool,
    /// Undo `Content-Encoding` while reading bodies.
    pub decompress: bool,
}

impl fmt::Debug for HttpNetworkSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpNetworkSession")
            .field("pool", &self.pool)
            .field("engine", &self.engine)
            .field("proxy", &self.proxy)
            .field("http1_only", &self.http1_only)
            .field("http2_prior_knowledge", &self.http2_prior_knowledge)
            .field("decompress", &self.decompress)
            .finish()
    }
}

/// One request as handed to the transport.
#[derive(Debug, Clone)]
pub struct HttpRequestInfo {
    pub method: Method,
    pub url: Url,
    pub headers: OrderedHeaders,
    pub body: RequestBody,
}

/// Internal state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AcquireConnection,
    Connect,
    SendRequest,
    ReadHeaders,
    Done,
}

impl State {
    /// Map internal state to public LoadState.
    fn to_load_state(self) -> LoadState {
        match self {
            State::Idle => LoadState::Idle,
            State::AcquireConnection => LoadState::WaitingForAvailableSocket,
            State::Connect => LoadState::Connecting,
            State::SendRequest => LoadState::SendingRequest,
            State::ReadHeaders => LoadState::WaitingForResponse,
            State::Done => LoadState::ReadingResponse,
        }
    }
}

/// The connection a request was assigned.
enum Stream {
    H1 {
        socket: PooledSocket,
        proxy: Option<ProxySettings>,
    },
    H2 {
        session: H2Session,
        negotiated: Option<NegotiatedSession>,
    },
}

/// Drives one request: pool → connect → write → response head.
///
/// No retries are made; every failure surfaces to the caller and the
/// connection involved is discarded.
pub struct HttpNetworkTransaction {
    session: Arc<HttpNetworkSession>,
    request: HttpRequestInfo,
    spec: Arc<FingerprintSpec>,
    trace: ClientTrace,
    interrupt: Interrupt,
    state: State,
}

impl HttpNetworkTransaction {
    pub fn new(
        session: Arc<HttpNetworkSession>,
        request: HttpRequestInfo,
        spec: Arc<FingerprintSpec>,
        trace: ClientTrace,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            session,
            request,
            spec,
            trace,
            interrupt,
            state: State::Idle,
        }
    }

    /// Get the current load state (for progress reporting).
    pub fn load_state(&self) -> LoadState {
        self.state.to_load_state()
    }

    fn set_state(&mut self, state: State) {
        self.state = state;
        tracing::trace!(url = %self.request.url, load_state = ?state.to_load_state(), "transaction state");
    }

    /// Run the request up to the response head.
    pub async fn start(&mut self) -> Result<HttpResponse, NetError> {
        self.set_state(State::AcquireConnection);
        let result = match self.create_stream().await {
            Ok(Stream::H1 { socket, proxy }) => self.send_h1(socket, proxy).await,
            Ok(Stream::H2 {
                session,
                negotiated,
            }) => self.send_h2(session, negotiated).await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(resp) => {
                tracing::debug!(url = %self.request.url, status = %resp.status(), version = ?resp.version(), "response head received");
                self.set_state(State::Done);
            }
            Err(e) => {
                tracing::debug!(url = %self.request.url, error = %e, "request failed");
                self.set_state(State::Idle);
            }
        }
        result
    }

    async fn create_stream(&mut self) -> Result<Stream, NetError> {
        let url = self.request.url.clone();
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(NetError::UnknownUrlScheme(scheme.to_string()));
        }
        let proxy = self.session.proxy.as_ref().and_then(|r| r.proxy_for(&url));
        let http1_only = self.session.http1_only;
        if http1_only {
            self.spec = Arc::new(self.spec.http1_only());
        }
        let key = PoolKey::new(&url, proxy.as_ref(), &self.spec.name, http1_only)?;
        self.trace.get_conn(&key.to_string());

        let pool = self.session.pool.clone();
        let acquired = self
            .interrupt
            .run(async { Ok(pool.acquire(&key).await) })
            .await?;

        let stream = match acquired {
            Acquired::H2(session) => {
                self.trace.got_conn(&ConnInfo {
                    reused: true,
                    was_idle: session.idle_for().is_some(),
                    protocol: Protocol::Http2,
                });
                Stream::H2 {
                    session,
                    negotiated: None,
                }
            }
            Acquired::Idle(socket) => {
                self.trace.got_conn(&ConnInfo {
                    reused: true,
                    was_idle: true,
                    protocol: Protocol::Http1,
                });
                Stream::H1 { socket, proxy }
            }
            Acquired::Slot(slot) => {
                self.set_state(State::Connect);
                let job = ConnectJob {
                    engine: self.session.engine.as_ref(),
                    trace: &self.trace,
                    connect_timeout: self.session.connect_timeout,
                };
                let connected = self
                    .interrupt
                    .run(job.connect(&url, proxy.as_ref(), &self.spec))
                    .await?;

                let protocol = match &connected.session {
                    Some(s) => s.protocol(),
                    None if self.session.http2_prior_knowledge && !http1_only => Protocol::Http2,
                    None => Protocol::Http1,
                };
                self.trace.got_conn(&ConnInfo {
                    reused: false,
                    was_idle: false,
                    protocol,
                });
                match protocol {
                    Protocol::Http2 => {
                        let session = self
                            .interrupt
                            .run(H2Session::handshake(
                                connected.socket,
                                &self.spec.http2,
                                Some(slot),
                            ))
                            .await?;
                        Stream::H2 {
                            session: pool.install_h2(&key, session),
                            negotiated: connected.session,
                        }
                    }
                    Protocol::Http1 => Stream::H1 {
                        socket: pool.checkout(
                            WrappedSocket::new(connected.socket),
                            slot,
                            connected.session,
                        ),
                        proxy,
                    },
                }
            }
        };
        Ok(stream)
    }

    async fn send_h1(
        &mut self,
        socket: PooledSocket,
        proxy: Option<ProxySettings>,
    ) -> Result<HttpResponse, NetError> {
        self.set_state(State::SendRequest);
        let req = &self.request;
        // Plain HTTP through a proxy goes in absolute-form on the proxy
        // connection itself.
        let absolute_form = proxy.is_some() && req.url.scheme() == "http";

        let mut headers = req.headers.clone();
        if !headers.contains("host") {
            headers.add("Host", url_authority(&req.url));
        }
        if needs_content_length(&req.method, &req.body, &headers) {
            headers.add("Content-Length", req.body.len().to_string());
        }
        if absolute_form && !headers.contains("proxy-authorization") {
            if let Some(auth) = proxy.as_ref().and_then(ProxySettings::auth_header) {
                headers.add("Proxy-Authorization", auth.as_str());
            }
        }

        let head = RequestHead {
            method: &req.method,
            url: &req.url,
            headers: &headers,
            absolute_form,
        };
        let bytes = h1::encode_request(&head, &req.body, &self.trace)?;
        let negotiated = socket.session().cloned();

        let mut conn = Conn::new(socket);
        self.interrupt.run(conn.write_all(&bytes)).await?;
        self.trace.wrote_request();

        self.set_state(State::ReadHeaders);
        let response = self.interrupt.run(conn.read_head(&self.trace)).await?;
        let framing = h1::framing(&self.request.method, &response)?;
        let reusable = h1::keep_alive(&headers, &response);
        let source = BodySource::H1 {
            body: H1Body::new(conn, framing, reusable),
            pool: self.session.pool.clone(),
        };
        Ok(self.response(
            response.status,
            response.version,
            response.headers,
            source,
            negotiated,
        ))
    }

    async fn send_h2(
        &mut self,
        session: H2Session,
        negotiated: Option<NegotiatedSession>,
    ) -> Result<HttpResponse, NetError> {
        self.set_state(State::SendRequest);
        let req = &self.request;
        let mut headers = req.headers.clone();
        if !req.body.is_empty() && !headers.contains("content-length") {
            headers.add("content-length", req.body.len().to_string());
        }
        let head = RequestHead {
            method: &req.method,
            url: &req.url,
            headers: &headers,
            absolute_form: false,
        };
        let fields = h2::encode_fields(&head, &self.spec.pseudo_order, &self.trace)?;
        let body = req.body.bytes();

        self.set_state(State::ReadHeaders);
        let response = self
            .interrupt
            .run(session.send_request(fields, body, &self.trace))
            .await?;
        Ok(self.response(
            response.status,
            Version::HTTP_2,
            response.headers,
            BodySource::H2(response.body),
            negotiated,
        ))
    }

    fn response(
        &self,
        status: http::StatusCode,
        version: Version,
        mut headers: OrderedHeaders,
        source: BodySource,
        negotiated: Option<NegotiatedSession>,
    ) -> HttpResponse {
        let mut encoding = None;
        let mut decoder = None;
        if self.session.decompress {
            let tokens = headers.get_all("content-encoding").join(", ");
            if let Some(d) = ContentDecoder::for_encoding(&tokens) {
                headers.delete("content-encoding");
                headers.delete("content-length");
                decoder = Some(d);
                encoding = Some(tokens);
            }
        }
        let body = ResponseBody::new(source, decoder, self.interrupt.clone());
        HttpResponse::new(status, version, self.request.url.clone(), headers, body)
            .with_content_encoding(encoding)
            .with_negotiated(negotiated)
    }
}

/// A body, or a method whose semantics expect one, gets `Content-Length`
/// unless the caller framed it otherwise.
fn needs_content_length(method: &Method, body: &RequestBody, headers: &OrderedHeaders) -> bool {
    if headers.contains("content-length") || h1::is_chunked(headers) {
        return false;
    }
    !body.is_empty() || *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}
