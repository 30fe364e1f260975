//! Outgoing request payload.
//!
//! Bodies are buffered in full: the HTTP/1.1 writer needs the length for
//! `Content-Length`, and the HTTP/2 driver slices DATA frames out of one
//! shared buffer as the send window opens.

use bytes::Bytes;

/// Request body. Cloning shares the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
}

impl RequestBody {
    /// True for `Empty` and for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        match self {
            RequestBody::Empty => 0,
            RequestBody::Bytes(b) => b.len(),
        }
    }

    /// The payload as a shared buffer.
    pub fn bytes(&self) -> Bytes {
        match self {
            RequestBody::Empty => Bytes::new(),
            RequestBody::Bytes(b) => b.clone(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        Bytes::from(v).into()
    }
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        Bytes::from(s).into()
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        Bytes::copy_from_slice(s.as_bytes()).into()
    }
}

impl From<&[u8]> for RequestBody {
    fn from(b: &[u8]) -> Self {
        Bytes::copy_from_slice(b).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_forms() {
        assert!(RequestBody::Empty.is_empty());
        assert!(RequestBody::from(Vec::new()).is_empty());
        assert!(RequestBody::default().bytes().is_empty());
    }

    #[test]
    fn test_conversions_share_content() {
        let body: RequestBody = "hello".into();
        assert_eq!(body.len(), 5);
        assert_eq!(body, RequestBody::from(b"hello".as_slice()));
        assert_eq!(body.bytes(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_clone_shares_buffer() {
        let body = RequestBody::from(vec![7u8; 1024]);
        let a = body.bytes();
        let b = body.clone().bytes();
        assert_eq!(a.as_ptr(), b.as_ptr());
    }
}
