//! Header block writing shared by the HTTP/1.1 and HTTP/2 request writers.
//!
//! Both protocols take the field sequence from [`resolve_order`] and differ
//! only in how a field is put on the wire, which is what
//! [`HeaderBlockWriter`] abstracts.

use crate::base::neterror::NetError;
use crate::base::trace::ClientTrace;
use crate::http::orderedheaders::{resolve_order, OrderedField, OrderedHeaders, Protocol, PseudoHeader};
use http::Method;
use url::Url;

/// Hop-by-hop fields that HTTP/2 forbids (RFC 9113 §8.2.2). `Host` is carried
/// by `:authority` instead.
pub const H2_EXCLUDED: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// Everything needed to write a request head.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub headers: &'a OrderedHeaders,
    /// Send the full URL as the request target (plain HTTP through a proxy).
    pub absolute_form: bool,
}

impl RequestHead<'_> {
    /// HTTP/1.1 request target.
    pub fn target(&self) -> String {
        if self.absolute_form {
            let mut url = self.url.clone();
            url.set_fragment(None);
            return url.to_string();
        }
        self.path()
    }

    /// Origin-form path with query.
    pub fn path(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }

    /// `:authority`: the caller's `Host` field when present, else the URL.
    pub fn authority(&self) -> String {
        match self.headers.get("host") {
            Some(host) => host.to_string(),
            None => url_authority(self.url),
        }
    }

    pub fn pseudo_value(&self, pseudo: PseudoHeader) -> String {
        match pseudo {
            PseudoHeader::Method => self.method.as_str().to_string(),
            PseudoHeader::Authority => self.authority(),
            PseudoHeader::Scheme => self.url.scheme().to_string(),
            PseudoHeader::Path => self.path(),
        }
    }
}

/// `host[:port]` as it appears in a `Host` header. Default ports are omitted;
/// IPv6 literals keep their brackets.
pub fn url_authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Protocol-specific sink for an ordered header block.
pub trait HeaderBlockWriter {
    fn protocol(&self) -> Protocol;

    /// Field names this writer never emits.
    fn excluded(&self) -> &'static [&'static str] {
        &[]
    }

    /// Called once before the first field.
    fn begin(&mut self, _head: &RequestHead<'_>) {}

    fn field(&mut self, name: &str, value: &str);

    /// Called once after the last field.
    fn finish(&mut self) {}
}

/// Write `head` through `writer` in resolved order.
///
/// Every field is validated before the first one is written, so an invalid
/// request never produces partial output. `trace` sees each field as it is
/// written, pseudo-headers included.
pub fn write_head<W: HeaderBlockWriter>(
    writer: &mut W,
    head: &RequestHead<'_>,
    default_pseudo: &[PseudoHeader],
    trace: &ClientTrace,
) -> Result<(), NetError> {
    head.headers.validate_order()?;
    let protocol = writer.protocol();
    let fields = resolve_order(head.headers, protocol, default_pseudo, writer.excluded());

    for field in &fields {
        match field {
            OrderedField::Regular { name, values } => {
                validate_name(name)?;
                for value in values.iter() {
                    validate_value(name, value)?;
                }
            }
            OrderedField::Pseudo(p) => validate_value(p.as_str(), &head.pseudo_value(*p))?,
        }
    }
    if protocol == Protocol::Http1 {
        validate_value("request-target", &head.target())?;
    }

    writer.begin(head);
    for field in fields {
        match field {
            OrderedField::Pseudo(p) => {
                let value = head.pseudo_value(p);
                writer.field(p.as_str(), &value);
                trace.wrote_header_field(p.as_str(), std::slice::from_ref(&value));
            }
            OrderedField::Regular { name, values } => {
                for value in values {
                    writer.field(&name, value);
                }
                trace.wrote_header_field(&name, values);
            }
        }
    }
    writer.finish();
    trace.wrote_headers();
    Ok(())
}

fn validate_name(name: &str) -> Result<(), NetError> {
    http::HeaderName::from_bytes(name.as_bytes())
        .map(|_| ())
        .map_err(|_| NetError::InvalidHeader(format!("invalid field name {name:?}")))
}

fn validate_value(name: &str, value: &str) -> Result<(), NetError> {
    http::HeaderValue::from_bytes(value.as_bytes())
        .map(|_| ())
        .map_err(|_| NetError::InvalidHeader(format!("invalid value for {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        protocol: Option<Protocol>,
        fields: Vec<(String, String)>,
        finished: bool,
    }

    impl HeaderBlockWriter for Recorder {
        fn protocol(&self) -> Protocol {
            self.protocol.unwrap_or(Protocol::Http1)
        }

        fn excluded(&self) -> &'static [&'static str] {
            match self.protocol() {
                Protocol::Http1 => &[],
                Protocol::Http2 => H2_EXCLUDED,
            }
        }

        fn field(&mut self, name: &str, value: &str) {
            self.fields.push((name.to_string(), value.to_string()));
        }

        fn finish(&mut self) {
            self.finished = true;
        }
    }

    fn url() -> Url {
        Url::parse("https://example.com:8443/a/b?q=1#frag").unwrap()
    }

    #[test]
    fn test_request_head_values() {
        let url = url();
        let headers = OrderedHeaders::new();
        let head = RequestHead {
            method: &Method::GET,
            url: &url,
            headers: &headers,
            absolute_form: false,
        };
        assert_eq!(head.target(), "/a/b?q=1");
        assert_eq!(head.authority(), "example.com:8443");
        assert_eq!(head.pseudo_value(PseudoHeader::Scheme), "https");

        let absolute = RequestHead {
            absolute_form: true,
            ..head
        };
        assert_eq!(absolute.target(), "https://example.com:8443/a/b?q=1");
    }

    #[test]
    fn test_authority_prefers_host_field() {
        let url = url();
        let mut headers = OrderedHeaders::new();
        headers.set("Host", "override.test");
        let head = RequestHead {
            method: &Method::GET,
            url: &url,
            headers: &headers,
            absolute_form: false,
        };
        assert_eq!(head.authority(), "override.test");
    }

    #[test]
    fn test_ipv6_authority_keeps_brackets() {
        let url = Url::parse("http://[::1]:8080/").unwrap();
        assert_eq!(url_authority(&url), "[::1]:8080");
        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(url_authority(&url), "example.com");
    }

    #[test]
    fn test_h2_block_excludes_connection_fields() {
        let url = url();
        let mut headers = OrderedHeaders::new();
        headers.set("Host", "example.com");
        headers.set("Connection", "keep-alive");
        headers.set("X-Test", "1");
        let head = RequestHead {
            method: &Method::GET,
            url: &url,
            headers: &headers,
            absolute_form: false,
        };
        let mut w = Recorder {
            protocol: Some(Protocol::Http2),
            ..Default::default()
        };
        write_head(&mut w, &head, &PseudoHeader::CHROME, &ClientTrace::new()).unwrap();
        let names: Vec<_> = w.fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            [":method", ":authority", ":scheme", ":path", "x-test"]
        );
        assert_eq!(w.fields[1].1, "example.com");
        assert!(w.finished);
    }

    #[test]
    fn test_invalid_value_writes_nothing() {
        let url = url();
        let mut headers = OrderedHeaders::new();
        headers.set("X-Good", "ok");
        headers.set("X-Bad", "a\r\nInjected: yes");
        let head = RequestHead {
            method: &Method::GET,
            url: &url,
            headers: &headers,
            absolute_form: false,
        };
        let mut w = Recorder::default();
        let err = write_head(&mut w, &head, &[], &ClientTrace::new()).unwrap_err();
        assert!(matches!(err, NetError::InvalidHeader(_)));
        assert!(w.fields.is_empty());
        assert!(!w.finished);
    }

    #[test]
    fn test_invalid_order_entry_rejected() {
        let url = url();
        let mut headers = OrderedHeaders::new();
        headers.set_order(["bad name"]);
        let head = RequestHead {
            method: &Method::GET,
            url: &url,
            headers: &headers,
            absolute_form: false,
        };
        let err = write_head(&mut Recorder::default(), &head, &[], &ClientTrace::new())
            .unwrap_err();
        assert_eq!(err, NetError::InvalidHeaderOrder("bad name".into()));
    }

    #[test]
    fn test_trace_sees_fields_in_wire_order() {
        let url = url();
        let mut headers = OrderedHeaders::new();
        headers.add("Accept", "a");
        headers.add("Accept", "b");
        headers.set("Host", "example.com");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let trace = ClientTrace::new().on_wrote_header_field(move |name, values| {
            sink.lock().unwrap().push((name.to_string(), values.to_vec()));
        });
        let head = RequestHead {
            method: &Method::GET,
            url: &url,
            headers: &headers,
            absolute_form: false,
        };
        let mut w = Recorder::default();
        write_head(&mut w, &head, &[], &trace).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "Host");
        assert_eq!(seen[1], ("Accept".to_string(), vec!["a".into(), "b".into()]));
        assert_eq!(w.fields.len(), 3);
    }
}
