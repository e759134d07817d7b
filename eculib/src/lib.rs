//! # eculib
//!
//! A library for diagnosing and reflashing Honda PGM-FI (motorcycle /
//! powersport) ECUs over their single-wire K-line diagnostic bus.
//!
//! The crate turns a noisy, half-duplex byte stream behind a USB-to-serial
//! bridge into reliable, checksummed request/response transactions, and
//! drives the multi-phase handshakes on top of them:
//!
//! - Frame construction and checksum validation
//! - Reliable command transport (deadline + retry + resynchronization)
//! - ECU state detection across read, recovery, write, and post-write modes
//! - Bounded-window flash/RAM/EEPROM access and the erase / post-write
//!   status-polling handshakes
//! - Stored fault code retrieval with a DTC description table
//!
//! ## Features
//!
//! - `native` (default): serial port bridge via the `serialport` crate
//!
//! ## Example
//!
//! ```rust,no_run
//! use eculib::{EcuState, HondaEcu};
//!
//! fn main() -> eculib::Result<()> {
//!     let mut ecu = HondaEcu::open("/dev/ttyUSB0")?;
//!     match ecu.detect_state()? {
//!         EcuState::Ok => {
//!             let faults = ecu.read_faults();
//!             for code in &faults.current {
//!                 let text = eculib::dtc::describe(code).unwrap_or("unknown");
//!                 println!("{code}: {text}");
//!             }
//!         }
//!         state => println!("ECU state: {state}"),
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod dtc;
pub mod ecu;
pub mod error;
pub mod port;
pub mod protocol;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker consulted by long-running library
/// loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in an embedding application). It is
/// only consulted between transactions, never mid-frame: aborting a
/// half-sent frame would desynchronize the link.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupt_requested() -> bool {
    INTERRUPT_CHECKER.get().is_some_and(|checker| checker())
}

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use port::NativeBridge;
pub use {
    ecu::{DebugSink, Direction, EcuState, FaultReport, HondaEcu},
    error::{Error, Result},
    port::{KLINE_BAUD, KlineBridge, SerialConfig},
    protocol::{ChecksumStatus, Response, checksum, format_message, validate_checksums},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_unset_means_not_requested() {
        assert!(!is_interrupt_requested());
    }
}
