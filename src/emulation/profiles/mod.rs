//! Browser profiles.
//!
//! Contains predefined fingerprints for Chrome, Edge, Firefox, Safari and iOS.

pub mod chrome;
pub mod edge;
pub mod firefox;
pub mod safari;

pub use chrome::Chrome;
pub use edge::Edge;
pub use firefox::Firefox;
pub use safari::{Ios, Safari};
