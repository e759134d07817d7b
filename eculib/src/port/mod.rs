//! Bridge abstraction for the K-line USB-to-serial adapter.
//!
//! The protocol engine never touches a serial handle directly: it drives a
//! `KlineBridge`, which hides the adapter behind five operations. That keeps
//! the engine hermetically testable and lets alternative adapters (FTDI
//! bit-bang, plain UART break control) plug in underneath.
//!
//! ```text
//! +-------------------+
//! |  Protocol engine  |
//! |  (ecu, memory)    |
//! +---------+---------+
//!           |
//!           v
//! +---------+---------+
//! |  KlineBridge      |
//! +---------+---------+
//!           |
//!           v
//! +---------+---------+
//! | NativeBridge      |
//! |   (serialport)    |
//! +-------------------+
//! ```
//!
//! The K-line is half duplex: every transmitted byte is also heard back on
//! the receive side, and the transport layer above this trait drains that
//! echo before it starts collecting the actual response.

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use crate::error::Result;

/// K-line signalling rate used by Honda ECUs.
pub const KLINE_BAUD: u32 = 10_400;

/// Bit-bang mode selector: drive the TX line directly.
pub const BIT_MODE_BITBANG: u8 = 0x01;

/// Bit-bang mode selector: return the line to UART operation.
pub const BIT_MODE_RESET: u8 = 0x00;

/// Serial port configuration for a K-line bridge.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Short-blocking read window for `read_available`.
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: KLINE_BAUD,
            read_timeout: Duration::from_millis(20),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration for the given port at K-line speed.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Default::default()
        }
    }

    /// Set the baud rate.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the short-blocking read window.
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

/// Transport collaborator contract consumed by the protocol engine.
///
/// Exactly one ECU session owns a bridge at a time; no two commands are ever
/// in flight concurrently on the same connection.
pub trait KlineBridge: Send {
    /// Queue bytes for transmission.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Short-blocking read of up to `max` buffered bytes; may return none.
    ///
    /// Implementations must strip any adapter status bytes (FTDI-style
    /// packet headers) so that only protocol bytes reach the caller.
    fn read_available(&mut self, max: usize) -> Result<Vec<u8>>;

    /// Discard any pending input and output.
    fn purge_buffers(&mut self) -> Result<()>;

    /// Switch the adapter between UART operation and direct line control.
    ///
    /// Used only for the physical-layer wakeup waveform; while in bit-bang
    /// mode, written bytes set the TX line level instead of framing data.
    fn set_bit_mode(&mut self, mask: u8, mode: u8) -> Result<()>;

    /// Drive a single test pulse and report whether its echo came back.
    ///
    /// Powered K-line wiring echoes the pulse within a 1 second bound even
    /// when no ECU is answering the protocol.
    fn presence_test(&mut self) -> Result<bool>;
}

// Re-export the native implementation
#[cfg(feature = "native")]
pub use native::NativeBridge;
