//! Header container with caller-controlled wire order.
//!
//! Fields keep the casing they were first stored with and their insertion
//! position. Two metadata lists ride along with the fields and are never
//! written as headers themselves:
//!
//! - the header order, naming regular fields in the order they should appear
//! - the pseudo-header order, naming HTTP/2 pseudo-headers
//!
//! [`resolve_order`] turns a container into the exact field sequence for a
//! protocol. Both request writers use it, so the ordering rule lives in one
//! place.

use crate::base::neterror::NetError;
use std::borrow::Cow;

/// Reserved key that addresses the header-order list through `set`/`add`.
pub const HEADER_ORDER_KEY: &str = "Header-Order:";
/// Reserved key that addresses the pseudo-header-order list through `set`/`add`.
pub const PSEUDO_HEADER_ORDER_KEY: &str = "PHeader-Order:";

/// Wire protocol a header block is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http1,
    Http2,
}

impl Protocol {
    /// ALPN identifier.
    pub fn alpn_id(&self) -> &'static str {
        match self {
            Protocol::Http1 => "http/1.1",
            Protocol::Http2 => "h2",
        }
    }

    pub fn as_version(&self) -> http::Version {
        match self {
            Protocol::Http1 => http::Version::HTTP_11,
            Protocol::Http2 => http::Version::HTTP_2,
        }
    }
}

/// HTTP/2 request pseudo-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoHeader {
    Method,
    Authority,
    Scheme,
    Path,
}

impl PseudoHeader {
    /// Chrome's order: `:method :authority :scheme :path`.
    pub const CHROME: [PseudoHeader; 4] = [
        PseudoHeader::Method,
        PseudoHeader::Authority,
        PseudoHeader::Scheme,
        PseudoHeader::Path,
    ];
    /// Firefox's order: `:method :path :authority :scheme`.
    pub const FIREFOX: [PseudoHeader; 4] = [
        PseudoHeader::Method,
        PseudoHeader::Path,
        PseudoHeader::Authority,
        PseudoHeader::Scheme,
    ];
    /// Safari's order: `:method :scheme :path :authority`.
    pub const SAFARI: [PseudoHeader; 4] = [
        PseudoHeader::Method,
        PseudoHeader::Scheme,
        PseudoHeader::Path,
        PseudoHeader::Authority,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PseudoHeader::Method => ":method",
            PseudoHeader::Authority => ":authority",
            PseudoHeader::Scheme => ":scheme",
            PseudoHeader::Path => ":path",
        }
    }

    /// Parse a pseudo-header name, ignoring ASCII case.
    pub fn parse(name: &str) -> Option<Self> {
        [
            PseudoHeader::Method,
            PseudoHeader::Authority,
            PseudoHeader::Scheme,
            PseudoHeader::Path,
        ]
        .into_iter()
        .find(|p| p.as_str().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    name: String,
    values: Vec<String>,
}

/// Ordered, case-insensitive header container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedHeaders {
    fields: Vec<Field>,
    order: Vec<String>,
    pseudo_order: Vec<PseudoHeader>,
    /// First bad entry routed through the pseudo-order key, reported by
    /// `validate_order`.
    pseudo_error: Option<String>,
}

impl OrderedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Replace all values of `name`.
    ///
    /// An existing field keeps its position and the casing it was first
    /// stored with. The reserved order keys replace the matching metadata
    /// list with the single given entry.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        if name.eq_ignore_ascii_case(HEADER_ORDER_KEY) {
            self.order = vec![value];
            return;
        }
        if name.eq_ignore_ascii_case(PSEUDO_HEADER_ORDER_KEY) {
            self.pseudo_order.clear();
            self.pseudo_error = None;
            self.push_pseudo(value);
            return;
        }

        match self.position(&name) {
            Some(idx) => self.fields[idx].values = vec![value],
            None => self.fields.push(Field {
                name,
                values: vec![value],
            }),
        }
    }

    /// Append a value to `name`, creating the field if needed.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        if name.eq_ignore_ascii_case(HEADER_ORDER_KEY) {
            self.order.push(value);
            return;
        }
        if name.eq_ignore_ascii_case(PSEUDO_HEADER_ORDER_KEY) {
            self.push_pseudo(value);
            return;
        }

        match self.position(&name) {
            Some(idx) => self.fields[idx].values.push(value),
            None => self.fields.push(Field {
                name,
                values: vec![value],
            }),
        }
    }

    /// Unknown and repeated names never reach the list; the first one is
    /// kept for `validate_order`.
    fn push_pseudo(&mut self, value: String) {
        match PseudoHeader::parse(&value) {
            Some(p) if !self.pseudo_order.contains(&p) => self.pseudo_order.push(p),
            _ => {
                self.pseudo_error.get_or_insert(value);
            }
        }
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|idx| self.fields[idx].values.first())
            .map(String::as_str)
    }

    /// Every value of `name`; empty when absent.
    pub fn get_all(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(idx) => &self.fields[idx].values,
            None => &[],
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove `name` entirely. Returns whether anything was removed.
    ///
    /// The reserved order keys clear the matching metadata list.
    pub fn delete(&mut self, name: &str) -> bool {
        if name.eq_ignore_ascii_case(HEADER_ORDER_KEY) {
            let had = !self.order.is_empty();
            self.order.clear();
            return had;
        }
        if name.eq_ignore_ascii_case(PSEUDO_HEADER_ORDER_KEY) {
            let had = !self.pseudo_order.is_empty() || self.pseudo_error.is_some();
            self.pseudo_order.clear();
            self.pseudo_error = None;
            return had;
        }

        match self.position(name) {
            Some(idx) => {
                self.fields.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Declare the wire order of regular fields. Names match case-insensitively.
    pub fn set_order<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = names.into_iter().map(Into::into).collect();
    }

    /// Declare the HTTP/2 pseudo-header order.
    ///
    /// Only `:method`, `:authority`, `:scheme` and `:path` are accepted.
    pub fn set_pseudo_order<I, S>(&mut self, names: I) -> Result<(), NetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for name in names {
            let name = name.as_ref();
            let p = PseudoHeader::parse(name)
                .ok_or_else(|| NetError::InvalidHeaderOrder(name.to_string()))?;
            if parsed.contains(&p) {
                return Err(NetError::InvalidHeaderOrder(name.to_string()));
            }
            parsed.push(p);
        }
        self.pseudo_order = parsed;
        self.pseudo_error = None;
        Ok(())
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn pseudo_order(&self) -> &[PseudoHeader] {
        &self.pseudo_order
    }

    /// Check that every header-order entry is a legal field name and that
    /// the pseudo-header order holds no unknown or repeated name.
    pub fn validate_order(&self) -> Result<(), NetError> {
        if let Some(name) = &self.pseudo_error {
            return Err(NetError::InvalidHeaderOrder(name.clone()));
        }
        for name in &self.order {
            if http::HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(NetError::InvalidHeaderOrder(name.clone()));
            }
        }
        Ok(())
    }

    /// Number of distinct fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in insertion order with their stored casing.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|f| (f.name.as_str(), f.values.as_slice()))
    }

    /// Regular fields as `(name, value)` pairs in wire order for `protocol`,
    /// one pair per value, skipping `excluded` names.
    pub fn serialize(&self, protocol: Protocol, excluded: &[&str]) -> Vec<(String, String)> {
        resolve_order(self, protocol, &[], excluded)
            .into_iter()
            .filter_map(|field| match field {
                OrderedField::Regular { name, values } => Some((name, values)),
                OrderedField::Pseudo(_) => None,
            })
            .flat_map(|(name, values)| {
                values
                    .iter()
                    .map(move |v| (name.clone().into_owned(), v.clone()))
            })
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for OrderedHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = OrderedHeaders::new();
        for (k, v) in iter {
            headers.add(k, v);
        }
        headers
    }
}

/// One entry of a resolved header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderedField<'a> {
    /// A pseudo-header slot; the writer supplies the value.
    Pseudo(PseudoHeader),
    /// A regular field with its wire name.
    Regular {
        name: Cow<'a, str>,
        values: &'a [String],
    },
}

/// Resolve the wire order of a header block.
///
/// 1. HTTP/1.1: `Host` first when present.
/// 2. HTTP/2: pseudo-headers in the container's pseudo order, or
///    `default_pseudo` when the container declares none. Pseudo-headers not
///    listed are not produced.
/// 3. Fields named in the header order, in that order, when present.
/// 4. Every other field in insertion order.
///
/// HTTP/2 names are lower-cased; HTTP/1.1 names keep their stored casing.
/// Names in `excluded` are skipped in every step.
pub fn resolve_order<'a>(
    headers: &'a OrderedHeaders,
    protocol: Protocol,
    default_pseudo: &[PseudoHeader],
    excluded: &[&str],
) -> Vec<OrderedField<'a>> {
    let is_excluded = |name: &str| excluded.iter().any(|e| e.eq_ignore_ascii_case(name));
    let wire_name = |field: &'a Field| -> Cow<'a, str> {
        match protocol {
            Protocol::Http1 => Cow::Borrowed(field.name.as_str()),
            Protocol::Http2 => Cow::Owned(field.name.to_ascii_lowercase()),
        }
    };

    let mut out = Vec::with_capacity(headers.fields.len() + 4);
    let mut emitted = vec![false; headers.fields.len()];

    match protocol {
        Protocol::Http1 => {
            if let Some(idx) = headers.position("host") {
                if !is_excluded("host") {
                    let field = &headers.fields[idx];
                    out.push(OrderedField::Regular {
                        name: wire_name(field),
                        values: &field.values,
                    });
                }
                emitted[idx] = true;
            }
        }
        Protocol::Http2 => {
            let pseudo = if headers.pseudo_order.is_empty() {
                default_pseudo
            } else {
                &headers.pseudo_order
            };
            out.extend(pseudo.iter().copied().map(OrderedField::Pseudo));
        }
    }

    for name in &headers.order {
        let Some(idx) = headers.position(name) else {
            continue;
        };
        if emitted[idx] {
            continue;
        }
        emitted[idx] = true;
        let field = &headers.fields[idx];
        if is_excluded(&field.name) {
            continue;
        }
        out.push(OrderedField::Regular {
            name: wire_name(field),
            values: &field.values,
        });
    }

    for (idx, field) in headers.fields.iter().enumerate() {
        if emitted[idx] || is_excluded(&field.name) {
            continue;
        }
        out.push(OrderedField::Regular {
            name: wire_name(field),
            values: &field.values,
        });
    }

    out
}
