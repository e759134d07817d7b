//! ECU session: wakeup, reliable transport, and command dispatch.
//!
//! A [`HondaEcu`] exclusively owns its bridge for the lifetime of the
//! session. All traffic is strict request-then-full-response; nothing runs
//! concurrently on the link, and the engine never cancels mid-transaction
//! because a half-sent frame would desynchronize the half-duplex line.

pub mod faults;
pub mod memory;
pub mod state;
pub mod write;

use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::error::Result;
use crate::port::{BIT_MODE_BITBANG, BIT_MODE_RESET, KlineBridge};
use crate::protocol::frame::{Response, echo_matches, format_message};
use crate::protocol::checksum::checksum;

pub use faults::FaultReport;
pub use state::EcuState;

/// Fixed part of the response deadline.
const RESPONSE_DEADLINE_BASE: Duration = Duration::from_millis(50);

/// Per-byte part of the response deadline, scaled by the frame length.
const RESPONSE_DEADLINE_PER_BYTE: Duration = Duration::from_millis(2);

/// Wakeup pulse: how long the line is held low.
const WAKEUP_PULSE_LOW: Duration = Duration::from_millis(70);

/// Wakeup pulse: settle time after the line is released.
const WAKEUP_SETTLE: Duration = Duration::from_millis(140);

/// Diagnostic mode byte carried by the wakeup ping.
const PING_MODE: u8 = 0x72;

/// Direction of an observed transaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to ECU.
    Sent,
    /// ECU to host.
    Received,
}

/// Fire-and-forget observer for raw transaction bytes.
///
/// Called once per attempt with the request frame and, when one arrives,
/// once with the verified response frame. Purely observational: it must not
/// block, and nothing it does can fail the transaction.
pub type DebugSink = Box<dyn FnMut(Direction, &[u8]) + Send>;

/// A diagnostic session with a Honda ECU over K-line.
///
/// Generic over the bridge type `B` so the protocol engine runs identically
/// against real adapters and scripted test doubles.
pub struct HondaEcu<B: KlineBridge> {
    bridge: B,
    debug_sink: Option<DebugSink>,
    strict_handshake: bool,
}

impl<B: KlineBridge> HondaEcu<B> {
    /// Create a session that owns `bridge`.
    pub fn new(bridge: B) -> Self {
        Self {
            bridge,
            debug_sink: None,
            strict_handshake: false,
        }
    }

    /// Attach a debug sink observing every transaction attempt.
    #[must_use]
    pub fn with_debug_sink(mut self, sink: DebugSink) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    /// Abort erase/post-write handshakes on the first unanswered step.
    ///
    /// Off by default: the stock sequencing presses on past a missed beat
    /// and only the final confirming checks decide success.
    #[must_use]
    pub fn with_strict_handshake(mut self, strict: bool) -> Self {
        self.strict_handshake = strict;
        self
    }

    /// Get a reference to the underlying bridge.
    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Get a mutable reference to the underlying bridge.
    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    /// Consume the session and return the underlying bridge.
    pub fn into_bridge(self) -> B {
        self.bridge
    }

    /// Drive the physical-layer wakeup pulse.
    ///
    /// Holds the K-line low for 70 ms, releases it, and leaves the bus to
    /// settle for 140 ms before the first frame. The widths are part of the
    /// physical protocol; the ECU times them.
    pub fn wakeup(&mut self) -> Result<()> {
        self.bridge.set_bit_mode(1, BIT_MODE_BITBANG)?;
        self.bridge.write_bytes(&[0x00])?;
        thread::sleep(WAKEUP_PULSE_LOW);
        self.bridge.write_bytes(&[0x01])?;
        self.bridge.set_bit_mode(0, BIT_MODE_RESET)?;
        self.bridge.purge_buffers()?;
        thread::sleep(WAKEUP_SETTLE);
        Ok(())
    }

    /// One framed transaction: write, drain the echo, reassemble the reply.
    ///
    /// The deadline is `RESPONSE_DEADLINE_BASE` plus the per-byte allowance
    /// scaled by the frame length. Three phases run under it: drain exactly
    /// the echoed frame, collect the type echo plus length byte, then (on a
    /// fresh clock) collect the rest of the declared length. Overrunning any
    /// phase yields `Ok(None)` and no partial frame escapes; stray bytes are
    /// purged at the start of the next transaction.
    fn transact(&mut self, frame: &[u8], type_len: usize) -> Result<Option<Vec<u8>>> {
        self.bridge.purge_buffers()?;
        self.bridge.write_bytes(frame)?;

        let deadline = RESPONSE_DEADLINE_BASE
            + RESPONSE_DEADLINE_PER_BYTE * u32::try_from(frame.len()).unwrap_or(u32::MAX);

        // Half-duplex echo of our own transmission.
        let start = Instant::now();
        let mut remaining = frame.len();
        while remaining > 0 {
            remaining -= self.bridge.read_available(remaining)?.len();
            if start.elapsed() > deadline {
                return Ok(None);
            }
        }

        // Type echo plus the length byte.
        let mut buf: Vec<u8> = Vec::new();
        while buf.len() < type_len + 1 {
            let chunk = self.bridge.read_available(type_len + 1 - buf.len())?;
            buf.extend_from_slice(&chunk);
            if start.elapsed() > deadline {
                return Ok(None);
            }
        }

        // Remainder of the declared frame, on a fresh clock.
        let total = usize::from(buf[type_len]);
        let start = Instant::now();
        while buf.len() < total {
            let chunk = self.bridge.read_available(total - buf.len())?;
            buf.extend_from_slice(&chunk);
            if start.elapsed() > deadline {
                return Ok(None);
            }
        }

        Ok(Some(buf))
    }

    /// Send a command and return the first valid response.
    ///
    /// Runs up to `retries + 1` attempts. An attempt fails on transport
    /// fault, deadline expiry, bad frame checksum, or a wrong echoed type;
    /// every failure is discarded silently and the next attempt starts
    /// fresh. `None` after the last attempt means "no answer" and is a
    /// normal outcome, never a negative acknowledgement.
    pub fn send_command(&mut self, type_bytes: &[u8], data: &[u8], retries: u32) -> Option<Response> {
        let frame = format_message(type_bytes, data);
        for attempt in 0..=retries {
            self.emit_debug(Direction::Sent, &frame);
            trace!("{attempt} > [{}]", hex(&frame));
            let resp = match self.transact(&frame, type_bytes.len()) {
                Ok(Some(resp)) => resp,
                Ok(None) => {
                    trace!("{attempt} - deadline expired");
                    continue;
                }
                Err(e) => {
                    trace!("{attempt} - transport fault: {e}");
                    continue;
                }
            };
            if checksum(&resp[..resp.len() - 1]) != resp[resp.len() - 1] {
                trace!("{attempt} - checksum mismatch, discarding");
                continue;
            }
            self.emit_debug(Direction::Received, &resp);
            trace!("{attempt} < [{}]", hex(&resp));
            if echo_matches(type_bytes, &resp[..type_bytes.len()]) {
                return Some(Response::parse(&resp, type_bytes.len()));
            }
            trace!("{attempt} - echoed type mismatch, discarding");
        }
        None
    }

    /// Best-effort link probe in the given diagnostic mode.
    pub fn ping(&mut self) -> bool {
        self.send_command(&[0xFE], &[PING_MODE], 0).is_some()
    }

    /// Enter the diagnostic session.
    pub fn diag(&mut self) -> bool {
        self.send_command(&[0x72], &[0x00, 0xF0], 0).is_some()
    }

    fn emit_debug(&mut self, direction: Direction, bytes: &[u8]) {
        if let Some(sink) = self.debug_sink.as_mut() {
            sink(direction, bytes);
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(feature = "native")]
mod native_impl {
    use super::HondaEcu;
    use crate::error::Result;
    use crate::port::NativeBridge;

    impl HondaEcu<NativeBridge> {
        /// Open a session on a serial port at the standard K-line baud rate.
        pub fn open(port_name: &str) -> Result<Self> {
            Ok(Self::new(NativeBridge::open_simple(port_name)?))
        }
    }
}
