//! HTTP Response with body access.

use crate::base::neterror::NetError;
use crate::http::orderedheaders::OrderedHeaders;
use crate::http::ResponseBody;
use crate::socket::tls::NegotiatedSession;
use http::{StatusCode, Version};
use url::Url;

/// HTTP Response with accessible body.
/// This is the user-facing response type that owns the body.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    url: Url,
    headers: OrderedHeaders,
    content_encoding: Option<String>,
    negotiated: Option<NegotiatedSession>,
    body: Option<ResponseBody>,
}

impl HttpResponse {
    pub(crate) fn new(
        status: StatusCode,
        version: Version,
        url: Url,
        headers: OrderedHeaders,
        body: ResponseBody,
    ) -> Self {
        Self {
            status,
            version,
            url,
            headers,
            content_encoding: None,
            negotiated: None,
            body: Some(body),
        }
    }

    pub(crate) fn with_content_encoding(mut self, encoding: Option<String>) -> Self {
        self.content_encoding = encoding;
        self
    }

    pub(crate) fn with_negotiated(mut self, session: Option<NegotiatedSession>) -> Self {
        self.negotiated = session;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The requested URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Response fields in received order.
    ///
    /// When the body is decoded, `Content-Encoding` and `Content-Length` are
    /// removed since they no longer describe it; see
    /// [`content_encoding`](Self::content_encoding).
    pub fn headers(&self) -> &OrderedHeaders {
        &self.headers
    }

    /// The `Content-Encoding` token list that was undone while reading.
    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    /// TLS session details; `None` for plain HTTP.
    pub fn negotiated(&self) -> Option<&NegotiatedSession> {
        self.negotiated.as_ref()
    }

    /// Take the response body for consumption.
    /// Can only be called once - subsequent calls return None.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    /// Convenience method to consume body as bytes.
    pub async fn bytes(mut self) -> Result<bytes::Bytes, NetError> {
        self.body.take().ok_or(NetError::BodyConsumed)?.bytes().await
    }

    /// Convenience method to consume body as text.
    pub async fn text(mut self) -> Result<String, NetError> {
        self.body.take().ok_or(NetError::BodyConsumed)?.text().await
    }

    /// Convenience method to consume body as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(mut self) -> Result<T, NetError> {
        self.body.take().ok_or(NetError::BodyConsumed)?.json().await
    }
}
