//! Error types for eculib.

use std::io;
use thiserror::Error;

/// Result type for eculib operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for eculib operations.
///
/// Per-attempt transport failures (bad checksum, wrong echoed type, deadline
/// expiry) are not errors: the command dispatcher retries them locally and an
/// exhausted retry budget surfaces as "no answer" (`None`), which callers
/// handle as a normal outcome.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying bridge.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A write or post-write status byte with no named state.
    ///
    /// The status mappings are closed: an ECU reporting a byte outside the
    /// known set is surfaced rather than coerced to a default state.
    #[error("Unmapped ECU status byte: {status:#04x}")]
    UnmappedStatus {
        /// Raw status byte reported by the ECU.
        status: u8,
    },

    /// Memory window request larger than the transaction ceiling.
    ///
    /// Raised before any bytes are put on the wire.
    #[error("Requested window of {requested} exceeds the {max}-unit transaction maximum")]
    TransferTooLarge {
        /// Bytes (or words) requested.
        requested: usize,
        /// Maximum bytes (or words) a single transaction carries.
        max: usize,
    },
}
