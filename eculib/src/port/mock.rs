//! Scripted bridge for hermetic protocol tests.

use std::collections::VecDeque;

use crate::error::Result;
use crate::port::KlineBridge;
use crate::protocol::checksum::checksum;

/// A bridge that echoes writes (the K-line hears itself talk) and replays a
/// queue of canned replies, one per framed write. An exhausted or `None`
/// entry leaves the ECU silent for that transaction.
pub(crate) struct MockBridge {
    rx: VecDeque<u8>,
    replies: VecDeque<Option<Vec<u8>>>,
    /// Every framed write, in order. Pulse-level writes are not recorded.
    pub writes: Vec<Vec<u8>>,
    /// Result of `presence_test`.
    pub presence: bool,
    bit_mode: u8,
}

impl MockBridge {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            replies: VecDeque::new(),
            writes: Vec::new(),
            presence: false,
            bit_mode: 0,
        }
    }

    /// Queue a raw reply delivered right after the echo of a framed write.
    pub fn push_reply(&mut self, bytes: Vec<u8>) {
        self.replies.push_back(Some(bytes));
    }

    /// Leave the ECU silent for one framed write.
    pub fn push_silence(&mut self) {
        self.replies.push_back(None);
    }
}

/// Build a well-formed reply frame for a request type, applying the
/// width-dependent echo transform.
pub(crate) fn reply_frame(request_type: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut frame: Vec<u8> = match request_type.len() {
        3 => vec![
            request_type[0] | 0x10,
            request_type[1] | 0x10,
            request_type[2],
        ],
        2 => request_type.to_vec(),
        1 => vec![request_type[0] & 0x0F],
        n => panic!("unsupported type width {n}"),
    };
    #[allow(clippy::cast_possible_truncation)]
    frame.push((2 + request_type.len() + payload.len()) as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));
    frame
}

impl KlineBridge for MockBridge {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.bit_mode != 0 {
            // Wakeup pulse levels, not frames.
            return Ok(());
        }
        self.writes.push(bytes.to_vec());
        self.rx.extend(bytes.iter().copied());
        if let Some(reply) = self.replies.pop_front().flatten() {
            self.rx.extend(reply);
        }
        Ok(())
    }

    fn read_available(&mut self, max: usize) -> Result<Vec<u8>> {
        let n = max.min(self.rx.len());
        Ok(self.rx.drain(..n).collect())
    }

    fn purge_buffers(&mut self) -> Result<()> {
        self.rx.clear();
        Ok(())
    }

    fn set_bit_mode(&mut self, _mask: u8, mode: u8) -> Result<()> {
        self.bit_mode = mode;
        Ok(())
    }

    fn presence_test(&mut self) -> Result<bool> {
        Ok(self.presence)
    }
}
