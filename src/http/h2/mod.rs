//! HTTP/2 client transport.

pub mod frame;
mod session;

pub use session::H2Session;
pub(crate) use session::{Fields, H2Body, H2Response};

use crate::base::neterror::NetError;
use crate::base::trace::ClientTrace;
use crate::http::orderedheaders::{Protocol, PseudoHeader};
use crate::http::writer::{write_head, HeaderBlockWriter, RequestHead, H2_EXCLUDED};

/// Collects a request head as HPACK input: pseudo-headers first, field names
/// lowercased, connection-specific fields dropped.
#[derive(Debug, Default)]
pub(crate) struct H2HeadWriter {
    fields: Fields,
}

impl HeaderBlockWriter for H2HeadWriter {
    fn protocol(&self) -> Protocol {
        Protocol::Http2
    }

    fn excluded(&self) -> &'static [&'static str] {
        H2_EXCLUDED
    }

    fn field(&mut self, name: &str, value: &str) {
        self.fields
            .push((name.to_ascii_lowercase(), value.to_string()));
    }
}

/// Resolve `head` into the ordered HPACK field list.
pub(crate) fn encode_fields(
    head: &RequestHead<'_>,
    default_pseudo: &[PseudoHeader],
    trace: &ClientTrace,
) -> Result<Fields, NetError> {
    let mut writer = H2HeadWriter::default();
    write_head(&mut writer, head, default_pseudo, trace)?;
    Ok(writer.fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::orderedheaders::OrderedHeaders;
    use http::Method;
    use url::Url;

    #[test]
    fn test_fields_follow_pseudo_and_header_order() {
        let url = Url::parse("https://example.com/p?x=1").unwrap();
        let mut headers = OrderedHeaders::new();
        headers.set("User-Agent", "ua");
        headers.set("Accept", "*/*");
        headers.set("Connection", "keep-alive");
        headers.set_order(["accept", "user-agent"]);
        headers
            .set_pseudo_order([":method", ":path", ":authority", ":scheme"])
            .unwrap();
        let head = RequestHead {
            method: &Method::GET,
            url: &url,
            headers: &headers,
            absolute_form: false,
        };
        let fields = encode_fields(&head, &PseudoHeader::CHROME, &ClientTrace::new()).unwrap();
        let names: Vec<_> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            [":method", ":path", ":authority", ":scheme", "accept", "user-agent"]
        );
        assert_eq!(fields[1].1, "/p?x=1");
    }

    #[test]
    fn test_default_pseudo_order_applies() {
        let url = Url::parse("https://example.com/").unwrap();
        let headers = OrderedHeaders::new();
        let head = RequestHead {
            method: &Method::GET,
            url: &url,
            headers: &headers,
            absolute_form: false,
        };
        let fields = encode_fields(&head, &PseudoHeader::FIREFOX, &ClientTrace::new()).unwrap();
        let names: Vec<_> = fields.iter().map(|(n, _)| n.as_str()).collect();
        let expected: Vec<_> = PseudoHeader::FIREFOX.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, expected);
    }
}
