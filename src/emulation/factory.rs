//! Fingerprint factory trait.

use crate::emulation::FingerprintSpec;

/// Factory trait for producing fingerprint specifications.
///
/// Implemented by the per-browser version enums so a registry can be filled
/// from any of them.
pub trait FingerprintFactory {
    /// Registry name of the produced spec, e.g. `"chrome-124"`.
    fn profile_name(self) -> &'static str;

    /// Build the [`FingerprintSpec`] for this version.
    fn spec(self) -> FingerprintSpec;
}
