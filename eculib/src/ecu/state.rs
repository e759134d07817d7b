//! ECU state detection.
//!
//! The ECU keeps no queryable "mode" register; its resting state is inferred
//! by probing, in a fixed order, the command families that only answer in
//! particular states. Detection is a single pass with zero retries per
//! probe: fast classification is favored over reliability, and a caller who
//! needs certainty runs it again.

use std::collections::BTreeMap;
use std::fmt;

use crate::ecu::HondaEcu;
use crate::error::{Error, Result};
use crate::port::KlineBridge;

/// Diagnostic tables walked by [`HondaEcu::probe_tables`] when the caller
/// does not name its own set.
pub const DEFAULT_PROBE_TABLES: &[u8] = &[
    0x10, 0x11, 0x17, 0x20, 0x21, 0x60, 0x61, 0x67, 0x70, 0x71, 0xD0, 0xD1,
];

/// Inferred resting state of the ECU.
///
/// Recomputed fresh from live probes on every detection call; nothing is
/// persisted. The `Write`/`PostWrite` variants name the raw status byte the
/// bootloader reports during a reflash; the mapping is closed and a byte
/// outside it surfaces as [`Error::UnmappedStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)] // variant names mirror the wire status codes
pub enum EcuState {
    /// No power on the bus.
    Off,
    /// Bus is powered but the protocol is not answering.
    Unknown,
    /// Flash reads answered; normal read mode.
    Read,
    /// A bulk read is in progress (set by embedding flows, never inferred).
    Reading,
    /// Diagnostic session established and engine data present.
    Ok,
    /// Old-style recovery bootloader answering.
    RecoverOld,
    /// New-style recovery bootloader answering.
    RecoverNew,
    Write00,
    Write0D,
    Write0F,
    Write10,
    Write20,
    Write30,
    Write40,
    Write50,
    WriteFA,
    /// A flash write is in progress (set by embedding flows).
    Writing,
    /// A flash erase is in progress (set by embedding flows).
    Erasing,
    /// Write initialization handshake running (set by embedding flows).
    InitWrite,
    /// Recovery initialization handshake running (set by embedding flows).
    InitRecover,
    PostWrite00,
    PostWrite0F,
    PostWrite12,
}

impl EcuState {
    /// Map a raw write-status byte to its named state.
    ///
    /// Closed mapping: unknown bytes return `None` rather than a default.
    pub fn from_write_status(status: u8) -> Option<Self> {
        match status {
            0x00 => Some(Self::Write00),
            0x0D => Some(Self::Write0D),
            0x0F => Some(Self::Write0F),
            0x10 => Some(Self::Write10),
            0x20 => Some(Self::Write20),
            0x30 => Some(Self::Write30),
            0x40 => Some(Self::Write40),
            0x50 => Some(Self::Write50),
            0xFA => Some(Self::WriteFA),
            _ => None,
        }
    }

    /// Map a raw post-write status byte to its named state.
    pub fn from_post_write_status(status: u8) -> Option<Self> {
        match status {
            0x00 => Some(Self::PostWrite00),
            0x0F => Some(Self::PostWrite0F),
            0x12 => Some(Self::PostWrite12),
            _ => None,
        }
    }
}

impl fmt::Display for EcuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Unknown => write!(f, "unknown"),
            Self::Read => write!(f, "read"),
            Self::Reading => write!(f, "reading"),
            Self::Ok => write!(f, "ok"),
            Self::RecoverOld => write!(f, "recover (old)"),
            Self::RecoverNew => write!(f, "recover (new)"),
            Self::Write00 => write!(f, "write (status 00)"),
            Self::Write0D => write!(f, "write (status 0d)"),
            Self::Write0F => write!(f, "write (status 0f)"),
            Self::Write10 => write!(f, "write (status 10)"),
            Self::Write20 => write!(f, "write (status 20)"),
            Self::Write30 => write!(f, "write (status 30)"),
            Self::Write40 => write!(f, "write (status 40)"),
            Self::Write50 => write!(f, "write (status 50)"),
            Self::WriteFA => write!(f, "write (status fa)"),
            Self::Writing => write!(f, "writing"),
            Self::Erasing => write!(f, "erasing"),
            Self::InitWrite => write!(f, "init write"),
            Self::InitRecover => write!(f, "init recover"),
            Self::PostWrite00 => write!(f, "post-write (status 00)"),
            Self::PostWrite0F => write!(f, "post-write (status 0f)"),
            Self::PostWrite12 => write!(f, "post-write (status 12)"),
        }
    }
}

impl<B: KlineBridge> HondaEcu<B> {
    /// Classify the ECU's current resting state.
    ///
    /// A strictly ordered single-pass decision procedure; failed probes are
    /// silent and simply advance to the next step. Only an unmapped status
    /// byte (closed `Write`/`PostWrite` mappings) or a bridge fault errors
    /// out; everything else resolves to a state, `Off` at worst.
    pub fn detect_state(&mut self) -> Result<EcuState> {
        self.wakeup()?;
        let _ = self.ping();

        if self.diag() {
            if let Some(info) = self.send_command(&[0x72], &[0x71, 0x00], 0) {
                if info.data.get(5..7).is_some_and(|field| field != [0x00, 0x00]) {
                    return Ok(EcuState::Ok);
                }
            }
        }

        if self.send_command(&[0x7D], &[0x01, 0x01, 0x03], 0).is_some() {
            return Ok(EcuState::RecoverOld);
        }
        if self.send_command(&[0x7B], &[0x00, 0x01, 0x04], 0).is_some() {
            return Ok(EcuState::RecoverNew);
        }
        // Alternate probes: the signature payloads of the init sequences
        // still answer in half-initialized recovery states.
        if self
            .send_command(&[0x7D], &[0x01, 0x02, 0x50, 0x47, 0x4D], 0)
            .is_some()
        {
            return Ok(EcuState::RecoverOld);
        }
        if self
            .send_command(&[0x7B], &[0x00, 0x02, 0x76, 0x03, 0x17], 0)
            .is_some()
        {
            return Ok(EcuState::RecoverNew);
        }

        if let Some(status) = self.write_status() {
            return EcuState::from_write_status(status).ok_or(Error::UnmappedStatus { status });
        }

        if let Some(resp) = self.send_command(&[0x7E], &[0x01, 0x0D], 0) {
            if let Some(&status) = resp.data.get(1) {
                return EcuState::from_post_write_status(status)
                    .ok_or(Error::UnmappedStatus { status });
            }
        }

        for address in [0x0000, 0x4000, 0x8000] {
            if self.read_flash(address, 1)?.is_some() {
                return Ok(EcuState::Read);
            }
        }

        if self.bridge.presence_test()? {
            Ok(EcuState::Unknown)
        } else {
            Ok(EcuState::Off)
        }
    }

    /// Walk diagnostic tables and collect the payloads of those that answer
    /// with more than a header.
    ///
    /// Any unanswered probe empties the result: a partially answering ECU is
    /// indistinguishable from a link glitch, so the whole scan is discarded.
    pub fn probe_tables(&mut self, tables: Option<&[u8]>) -> BTreeMap<u8, Vec<u8>> {
        let tables = tables.unwrap_or(DEFAULT_PROBE_TABLES);
        let mut found = BTreeMap::new();
        for &table in tables {
            match self.send_command(&[0x72], &[0x71, table], 0) {
                Some(info) if info.payload_len() > 2 => {
                    found.insert(table, info.data);
                }
                Some(_) => {}
                None => return BTreeMap::new(),
            }
        }
        found
    }

    /// Run the write initialization handshake.
    ///
    /// Fire-and-forget sequence; the ECU acknowledges nothing useful until
    /// the write-status poll afterwards.
    pub fn init_write(&mut self) {
        let _ = self.send_command(&[0x7D], &[0x01, 0x01, 0x00], 0);
        let _ = self.send_command(&[0x7D], &[0x01, 0x01, 0x01], 0);
        let _ = self.send_command(&[0x7D], &[0x01, 0x01, 0x02], 0);
        let _ = self.send_command(&[0x7D], &[0x01, 0x01, 0x03], 0);
        let _ = self.send_command(&[0x7D], &[0x01, 0x02, 0x50, 0x47, 0x4D], 0);
        let _ = self.send_command(&[0x7D], &[0x01, 0x03, 0x2D, 0x46, 0x49], 0);
    }

    /// Run the recovery initialization handshake.
    pub fn init_recover(&mut self) {
        let _ = self.send_command(&[0x7B], &[0x00, 0x01, 0x01], 0);
        let _ = self.send_command(&[0x7B], &[0x00, 0x01, 0x02], 0);
        let _ = self.send_command(&[0x7B], &[0x00, 0x01, 0x03], 0);
        let _ = self.send_command(&[0x7B], &[0x00, 0x02, 0x76, 0x03, 0x17], 0);
        let _ = self.send_command(&[0x7B], &[0x00, 0x03, 0x75, 0x05, 0x13], 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{MockBridge, reply_frame};

    #[test]
    fn test_write_status_mapping_is_closed() {
        assert_eq!(EcuState::from_write_status(0x30), Some(EcuState::Write30));
        assert_eq!(EcuState::from_write_status(0xFA), Some(EcuState::WriteFA));
        assert_eq!(EcuState::from_write_status(0x31), None);
        assert_eq!(EcuState::from_post_write_status(0x12), Some(EcuState::PostWrite12));
        assert_eq!(EcuState::from_post_write_status(0x01), None);
    }

    #[test]
    fn test_detect_zeroed_info_field_is_not_ok() {
        let mut bridge = MockBridge::new();
        // ping, then diag answered.
        bridge.push_reply(reply_frame(&[0xFE], &[0x72]));
        bridge.push_reply(reply_frame(&[0x72], &[0x00]));
        // Info query answers, but the engine-data field at bytes 5..7 is zero.
        bridge.push_reply(reply_frame(
            &[0x72],
            &[0x71, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        ));
        let mut ecu = HondaEcu::new(bridge);

        let state = ecu.detect_state().expect("state");
        assert_ne!(state, EcuState::Ok);
        assert_eq!(state, EcuState::Off);
        // Probing continued past the info query: recover probes, status
        // queries and flash reads all went out.
        assert!(ecu.bridge().writes.len() > 3);
    }

    #[test]
    fn test_detect_ok_when_info_field_nonzero() {
        let mut bridge = MockBridge::new();
        bridge.push_reply(reply_frame(&[0xFE], &[0x72]));
        bridge.push_reply(reply_frame(&[0x72], &[0x00]));
        bridge.push_reply(reply_frame(
            &[0x72],
            &[0x71, 0x00, 0x00, 0x00, 0x00, 0x12, 0x34, 0x00],
        ));
        let mut ecu = HondaEcu::new(bridge);
        assert_eq!(ecu.detect_state().expect("state"), EcuState::Ok);
    }

    #[test]
    fn test_detect_recover_old() {
        let mut bridge = MockBridge::new();
        bridge.push_silence(); // ping
        bridge.push_silence(); // diag
        bridge.push_reply(reply_frame(&[0x7D], &[0x00]));
        let mut ecu = HondaEcu::new(bridge);
        assert_eq!(ecu.detect_state().expect("state"), EcuState::RecoverOld);
    }

    #[test]
    fn test_detect_write_state_from_status_byte() {
        let mut bridge = MockBridge::new();
        for _ in 0..6 {
            bridge.push_silence(); // ping, diag, four recover probes
        }
        bridge.push_reply(reply_frame(&[0x7E], &[0x00, 0x30]));
        let mut ecu = HondaEcu::new(bridge);
        assert_eq!(ecu.detect_state().expect("state"), EcuState::Write30);
    }

    #[test]
    fn test_detect_unmapped_write_status_errors() {
        let mut bridge = MockBridge::new();
        for _ in 0..6 {
            bridge.push_silence();
        }
        bridge.push_reply(reply_frame(&[0x7E], &[0x00, 0x77]));
        let mut ecu = HondaEcu::new(bridge);
        match ecu.detect_state() {
            Err(Error::UnmappedStatus { status }) => assert_eq!(status, 0x77),
            other => panic!("expected unmapped status, got {other:?}"),
        }
    }

    #[test]
    fn test_detect_read_from_flash_probe() {
        let mut bridge = MockBridge::new();
        for _ in 0..8 {
            bridge.push_silence(); // ping, diag, recover x4, write status, post-write
        }
        bridge.push_reply(reply_frame(&[0x82, 0x82, 0x00], &[0xAB]));
        let mut ecu = HondaEcu::new(bridge);
        assert_eq!(ecu.detect_state().expect("state"), EcuState::Read);
    }

    #[test]
    fn test_detect_unknown_vs_off_by_presence() {
        let mut bridge = MockBridge::new();
        bridge.presence = true;
        let mut ecu = HondaEcu::new(bridge);
        assert_eq!(ecu.detect_state().expect("state"), EcuState::Unknown);

        let mut ecu = HondaEcu::new(MockBridge::new());
        assert_eq!(ecu.detect_state().expect("state"), EcuState::Off);
    }

    #[test]
    fn test_probe_tables_discards_partial_scans() {
        let mut bridge = MockBridge::new();
        bridge.push_reply(reply_frame(&[0x72], &[0x71, 0x10, 0x01, 0x02, 0x03]));
        // Second table unanswered: the whole scan is discarded.
        let mut ecu = HondaEcu::new(bridge);
        assert!(ecu.probe_tables(Some(&[0x10, 0x11])).is_empty());
    }

    #[test]
    fn test_probe_tables_collects_payloads() {
        let mut bridge = MockBridge::new();
        bridge.push_reply(reply_frame(&[0x72], &[0x71, 0x10, 0x01, 0x02, 0x03]));
        // Header-only answer is skipped without emptying the scan.
        bridge.push_reply(reply_frame(&[0x72], &[0x71, 0x11]));
        let mut ecu = HondaEcu::new(bridge);
        let tables = ecu.probe_tables(Some(&[0x10, 0x11]));
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[&0x10], vec![0x71, 0x10, 0x01, 0x02, 0x03]);
    }
}
