use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::base::trace::ClientTrace;
use crate::emulation::FingerprintSpec;
use crate::socket::client::SocketType;
use crate::socket::proxy::ProxySettings;
use crate::socket::tls::{HandshakeEngine, NegotiatedSession};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

/// Largest CONNECT response head accepted from a proxy.
const MAX_TUNNEL_HEAD: usize = 8 * 1024;

/// A connection ready for HTTP.
#[derive(Debug)]
pub struct Connected {
    pub socket: SocketType,
    /// Present for TLS connections.
    pub session: Option<NegotiatedSession>,
}

/// Manages the connection process: DNS -> TCP -> proxy tunnel -> TLS.
/// Roughly equivalent to net::ConnectJob.
#[derive(Debug)]
pub struct ConnectJob<'a> {
    pub engine: &'a dyn HandshakeEngine,
    pub trace: &'a ClientTrace,
    /// Limit for each TCP connect attempt.
    pub connect_timeout: Option<Duration>,
}

impl ConnectJob<'_> {
    /// Connect to `target`, through `proxy` when given, presenting `spec`
    /// for `https` targets.
    pub async fn connect(
        &self,
        target: &Url,
        proxy: Option<&ProxySettings>,
        spec: &FingerprintSpec,
    ) -> Result<Connected, NetError> {
        let scheme = target.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(NetError::UnknownUrlScheme(scheme.to_string()));
        }
        let host = target.host_str().ok_or(NetError::InvalidUrl)?;
        let port = target.port_or_known_default().ok_or(NetError::InvalidUrl)?;

        let mut stream = match proxy {
            Some(p) => {
                let (phost, pport) = p.host_port().ok_or(NetError::InvalidUrl)?;
                let stream = self.dial(phost, pport).await.map_err(|e| {
                    tracing::debug!(proxy = %p.identity(), error = %e, "proxy unreachable");
                    NetError::ProxyConnectionFailed
                })?;
                stream
            }
            None => self.dial(host, port).await?,
        };

        if scheme == "http" {
            return Ok(Connected {
                socket: SocketType::Tcp(stream),
                session: None,
            });
        }

        if let Some(p) = proxy {
            tunnel(&mut stream, p, host, port).await?;
            tracing::debug!(proxy = %p.identity(), target = %format!("{host}:{port}"), "tunnel established");
        }

        self.trace.tls_handshake_start();
        let (tls, session) = self.engine.handshake(spec, host, stream).await?;
        self.trace.tls_handshake_done(&session);
        Ok(Connected {
            socket: SocketType::Tls(tls),
            session: Some(session),
        })
    }

    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream, NetError> {
        let name = host.trim_start_matches('[').trim_end_matches(']');
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((name, port))
            .await
            .dns_context(host)?
            .collect();
        if addrs.is_empty() {
            return Err(NetError::NameNotResolved);
        }

        let mut last_err = None;
        for addr in addrs {
            let attempt = TcpStream::connect(addr);
            let result = match self.connect_timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::debug!(%addr, "connect attempt timed out");
                        last_err = Some(NetError::ConnectionTimedOut);
                        continue;
                    }
                },
                None => attempt.await,
            };
            let result = result.connect_context(host, port);
            match result {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    tracing::debug!(%addr, "connected");
                    self.trace.connect_done(addr);
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(NetError::ConnectionFailed))
    }
}

/// Open a `CONNECT` tunnel to `host:port` through an HTTP proxy.
async fn tunnel(
    stream: &mut TcpStream,
    proxy: &ProxySettings,
    host: &str,
    port: u16,
) -> Result<(), NetError> {
    let authority = format!("{host}:{port}");
    let mut req = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(auth) = proxy.auth_header() {
        req.push_str("Proxy-Authorization: ");
        req.push_str(&auth);
        req.push_str("\r\n");
    }
    req.push_str("\r\n");
    stream
        .write_all(req.as_bytes())
        .await
        .map_err(|e| NetError::TunnelConnectionFailed(e.to_string()))?;

    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| NetError::TunnelConnectionFailed(e.to_string()))?;
        if n == 0 {
            return Err(NetError::TunnelConnectionFailed(
                "proxy closed the connection".into(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; 64];
        let mut resp = httparse::Response::new(&mut headers);
        match resp.parse(&buf) {
            Ok(httparse::Status::Complete(len)) => {
                let code = resp.code.unwrap_or(0);
                if !(200..300).contains(&code) {
                    return Err(NetError::TunnelConnectionFailed(format!(
                        "proxy answered CONNECT with {code}"
                    )));
                }
                if len != buf.len() {
                    return Err(NetError::TunnelConnectionFailed(
                        "data after CONNECT response".into(),
                    ));
                }
                return Ok(());
            }
            Ok(httparse::Status::Partial) if buf.len() > MAX_TUNNEL_HEAD => {
                return Err(NetError::TunnelConnectionFailed(
                    "CONNECT response too large".into(),
                ));
            }
            Ok(httparse::Status::Partial) => {}
            Err(e) => return Err(NetError::TunnelConnectionFailed(e.to_string())),
        }
    }
}
