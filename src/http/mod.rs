//! HTTP layer: ordered fields, wire writers, sessions and bodies.
//!
//! - [`orderedheaders`]: field list with explicit emission order
//! - [`h2settings`]: HTTP/2 SETTINGS fingerprint values
//! - [`decoder`]: streaming `Content-Encoding` decoder
//! - [`transaction`]: one request from pool lookup to response head

pub mod decoder;
pub(crate) mod h1;
pub mod h2;
pub mod h2settings;
pub mod orderedheaders;
pub mod requestbody;
pub mod response;
pub mod responsebody;
pub mod transaction;
pub(crate) mod writer;

// Re-exports for convenience
pub use decoder::{Coding, ContentDecoder};
pub use h2settings::H2Settings;
pub use orderedheaders::{
    OrderedHeaders, Protocol, PseudoHeader, HEADER_ORDER_KEY, PSEUDO_HEADER_ORDER_KEY,
};
pub use requestbody::RequestBody;
pub use response::HttpResponse;
pub use responsebody::ResponseBody;
