//! Presence detection.
//!
//! A detector backend turns each captured frame into zero or more bounding
//! boxes; the recording controller only consumes the derived boolean (at
//! least one object of interest present). Backends:
//! - `cpu`: block-level frame differencing (default)
//! - `stub`: scripted or hash-based presence (tests, dry runs)
//! - `tract`: ONNX object detection (feature: backend-tract)

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::{CpuBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::BackendRegistry;
pub use result::{Detection, DetectionResult, ObjectClass};
