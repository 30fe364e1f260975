//! Edge browser profiles.
//!
//! Edge is Chromium-based, so its TLS and HTTP/2 fingerprint match Chrome's.

use crate::emulation::profiles::chrome::chromium_spec;
use crate::emulation::{FingerprintFactory, FingerprintSpec, NamedGroup};

/// Edge browser versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Edge {
    /// Edge 124 (latest)
    V124,
}

impl Default for Edge {
    fn default() -> Self {
        Edge::V124
    }
}

impl FingerprintFactory for Edge {
    fn profile_name(self) -> &'static str {
        match self {
            Edge::V124 => "edge-124",
        }
    }

    fn spec(self) -> FingerprintSpec {
        match self {
            Edge::V124 => edge_v124(),
        }
    }
}

/// Edge 124.
pub fn edge_v124() -> FingerprintSpec {
    chromium_spec(
        "edge-124",
        &[
            NamedGroup::GREASE,
            NamedGroup::X25519_KYBER768_DRAFT00,
            NamedGroup::X25519,
            NamedGroup::SECP256R1,
            NamedGroup::SECP384R1,
        ],
    )
}
