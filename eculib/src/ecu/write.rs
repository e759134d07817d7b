//! Erase and write sequencing with status polling.
//!
//! Erasing and committing flash are multi-step handshakes against the `0x7E`
//! command family. Steps are separated by fixed settle delays that the
//! bootloader's flash controller needs; the delays are part of the protocol
//! and must not be shortened. By default a step whose command goes
//! unanswered does not abort the sequence: the sequencing presses on and the
//! final confirming checks alone decide success (the stock tool's observable
//! behavior). `with_strict_handshake(true)` turns a missed beat into an
//! early failure instead.
//!
//! Nothing here rolls back. After a failed sequence the ECU is wherever the
//! last completed step left it, and only a fresh state detection tells the
//! caller where that is.

use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::ecu::HondaEcu;
use crate::is_interrupt_requested;
use crate::port::KlineBridge;

/// Settle time after the erase timing-parameter command.
const ERASE_SETTLE: Duration = Duration::from_millis(40);

/// Interval between erase progress polls.
const ERASE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on erase progress polls (about a minute).
const ERASE_WAIT_MAX_POLLS: u32 = 600;

/// Settle time after each post-write sub-command.
const POST_WRITE_SETTLE: Duration = Duration::from_millis(500);

/// Write status value that terminates a successful post-write handshake.
const POST_WRITE_DONE: u8 = 0x0F;

impl<B: KlineBridge> HondaEcu<B> {
    /// Poll the bootloader's write status byte.
    ///
    /// Idempotent: with no intervening state change the ECU reports the same
    /// value on every poll. `None` means the poll went unanswered.
    pub fn write_status(&mut self) -> Option<u8> {
        self.send_command(&[0x7E], &[0x01, 0x01, 0x00], 0)
            .and_then(|resp| resp.data.get(1).copied())
    }

    /// Run the flash erase handshake.
    ///
    /// Erase-begin, address range, a status poll, range confirm, another
    /// poll, the timing-parameter command, a settle delay, and a final
    /// confirm whose status field must read zero. Returns the success flag;
    /// on `false` nothing is rolled back.
    pub fn erase(&mut self) -> bool {
        let answered = self.send_command(&[0x7E], &[0x01, 0x02], 0).is_some();
        if self.missed_beat(answered) {
            return false;
        }
        let answered = self
            .send_command(&[0x7E], &[0x01, 0x03, 0x00, 0x00], 0)
            .is_some();
        if self.missed_beat(answered) {
            return false;
        }
        let _ = self.write_status();
        let answered = self
            .send_command(&[0x7E], &[0x01, 0x0B, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF], 0)
            .is_some();
        if self.missed_beat(answered) {
            return false;
        }
        let _ = self.write_status();
        let answered = self
            .send_command(&[0x7E], &[0x01, 0x0E, 0x01, 0x90], 0)
            .is_some();
        if self.missed_beat(answered) {
            return false;
        }
        thread::sleep(ERASE_SETTLE);
        match self.send_command(&[0x7E], &[0x01, 0x04, 0xFF], 0) {
            Some(resp) => resp.data.get(1) == Some(&0x00),
            None => false,
        }
    }

    /// Wait for a running erase to finish.
    ///
    /// Polls erase progress at a fixed interval until the status byte reads
    /// zero (confirmed with one final write-status poll), the poll itself
    /// goes unanswered (hard abort, not retried), the attempt budget runs
    /// out, or the embedding application requests interruption.
    pub fn erase_wait(&mut self) -> bool {
        for _ in 0..ERASE_WAIT_MAX_POLLS {
            if is_interrupt_requested() {
                warn!("erase wait interrupted");
                return false;
            }
            thread::sleep(ERASE_POLL_INTERVAL);
            match self.send_command(&[0x7E], &[0x01, 0x05], 0) {
                Some(resp) if resp.data.get(1) == Some(&0x00) => {
                    let _ = self.write_status();
                    return true;
                }
                Some(_) => {}
                None => {
                    warn!("erase progress poll unanswered");
                    return false;
                }
            }
        }
        warn!("erase did not finish within the poll budget");
        false
    }

    /// Run the post-write commit handshake.
    ///
    /// Four sub-commands, each followed by a settle delay and a status
    /// poll. After the fourth, the write status must read the terminal
    /// code, confirmed by one final status request whose payload field must
    /// match it.
    pub fn post_write(&mut self) -> bool {
        for step in [0x08, 0x09, 0x0A] {
            let answered = self.send_command(&[0x7E], &[0x01, step], 0).is_some();
            if self.missed_beat(answered) {
                return false;
            }
            thread::sleep(POST_WRITE_SETTLE);
            let _ = self.write_status();
        }
        let answered = self.send_command(&[0x7E], &[0x01, 0x0C], 0).is_some();
        if self.missed_beat(answered) {
            return false;
        }
        thread::sleep(POST_WRITE_SETTLE);
        if self.write_status() != Some(POST_WRITE_DONE) {
            return false;
        }
        match self.send_command(&[0x7E], &[0x01, 0x0D], 0) {
            Some(resp) => resp.data.get(1) == Some(&POST_WRITE_DONE),
            None => false,
        }
    }

    /// In strict mode an unanswered step fails the whole sequence.
    fn missed_beat(&self, answered: bool) -> bool {
        if answered {
            return false;
        }
        debug!("handshake step unanswered");
        self.strict_handshake
    }
}
