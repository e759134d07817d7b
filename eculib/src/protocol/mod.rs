//! Protocol codec: framing and checksum validation.

pub mod checksum;
pub mod frame;

// Re-export common types
pub use checksum::{ChecksumStatus, checksum, validate_checksums};
pub use frame::{Response, echo_matches, format_message};
