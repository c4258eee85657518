pub mod types;
pub mod router;

pub use types::*;
pub use router::*;

use thiserror::Error;

/// Failures raised by an extraction backend.
///
/// These never cross `ConfidenceRouter::extract_with_routing`: the router
/// logs them and degrades to an empty (base) or unchanged (premium) result.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("Extraction backend unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed extraction response: {0}")]
    MalformedResponse(String),

    #[error("Extraction backend error: {0}")]
    Backend(String),
}
