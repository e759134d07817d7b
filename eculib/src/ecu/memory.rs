//! Bounded-window memory access: flash, RAM, and EEPROM.
//!
//! Every accessor is a single command/response round trip with a hard size
//! ceiling checked before anything touches the wire. A missing or
//! wrong-length reply yields no data at all; the protocol never hands back a
//! partial window.

use byteorder::{BigEndian, WriteBytesExt};

use crate::ecu::HondaEcu;
use crate::error::{Error, Result};
use crate::port::KlineBridge;

/// Maximum bytes carried by one flash or RAM read/write transaction.
pub const MAX_WINDOW_BYTES: usize = 12;

/// Maximum 16-bit words carried by one RAM word transaction.
pub const MAX_WINDOW_WORDS: usize = 6;

// Command tags of the memory access family. The sub-type byte selects the
// target and direction.
const READ_FLASH: [u8; 3] = [0x82, 0x82, 0x00];
const READ_RAM: [u8; 3] = [0x82, 0x82, 0x01];
const WRITE_RAM: [u8; 3] = [0x82, 0x82, 0x81];
const READ_RAM_WORDS: [u8; 3] = [0x82, 0x82, 0x02];
const WRITE_RAM_WORDS: [u8; 3] = [0x82, 0x82, 0x82];
const READ_EEPROM_WORD: [u8; 3] = [0x82, 0x82, 0x03];
const ERASE_EEPROM: [u8; 3] = [0x82, 0x82, 0x4B];

/// Pack a flash address for the read command.
///
/// The ECU wants the middle, low, and high-middle bytes of the 32-bit
/// big-endian address, in that order.
pub fn format_read(location: u32) -> [u8; 3] {
    let b = location.to_be_bytes();
    [b[1], b[3], b[2]]
}

impl<B: KlineBridge> HondaEcu<B> {
    /// Read up to [`MAX_WINDOW_BYTES`] bytes of flash at `location`.
    ///
    /// `Ok(None)` means the ECU did not answer or answered with the wrong
    /// length; the declared length byte must be exactly `size + 5`.
    pub fn read_flash(&mut self, location: u32, size: usize) -> Result<Option<Vec<u8>>> {
        let size_byte = window_byte(size, MAX_WINDOW_BYTES)?;
        let mut payload = format_read(location).to_vec();
        payload.push(size_byte);
        match self.send_command(&READ_FLASH, &payload, 0) {
            Some(resp) if usize::from(resp.length) == size + 5 => Ok(Some(resp.data)),
            _ => Ok(None),
        }
    }

    /// Read up to [`MAX_WINDOW_BYTES`] bytes of RAM at `address`.
    pub fn read_ram(&mut self, address: u16, size: usize) -> Result<Option<Vec<u8>>> {
        let size_byte = window_byte(size, MAX_WINDOW_BYTES)?;
        let mut payload = address.to_le_bytes().to_vec();
        payload.push(size_byte);
        match self.send_command(&READ_RAM, &payload, 0) {
            Some(resp) if usize::from(resp.length) == size + 5 => Ok(Some(resp.data)),
            _ => Ok(None),
        }
    }

    /// Write up to [`MAX_WINDOW_BYTES`] bytes of RAM at `address`.
    ///
    /// `Ok(false)` means the ECU did not acknowledge the write.
    pub fn write_ram(&mut self, address: u16, data: &[u8]) -> Result<bool> {
        window_byte(data.len(), MAX_WINDOW_BYTES)?;
        let mut payload = address.to_le_bytes().to_vec();
        payload.extend_from_slice(data);
        Ok(matches!(
            self.send_command(&WRITE_RAM, &payload, 0),
            Some(resp) if resp.length == 5
        ))
    }

    /// Read up to [`MAX_WINDOW_WORDS`] 16-bit RAM words at `address`.
    ///
    /// Words travel big-endian on the wire and are swapped to native order
    /// here.
    pub fn read_ram_words(&mut self, address: u16, words: usize) -> Result<Option<Vec<u16>>> {
        let count_byte = window_byte(words, MAX_WINDOW_WORDS)?;
        let mut payload = address.to_le_bytes().to_vec();
        payload.push(count_byte);
        match self.send_command(&READ_RAM_WORDS, &payload, 0) {
            Some(resp) if usize::from(resp.length) == 2 * words + 5 => Ok(Some(
                resp.data
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect(),
            )),
            _ => Ok(None),
        }
    }

    /// Write up to [`MAX_WINDOW_WORDS`] 16-bit RAM words at `address`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn write_ram_words(&mut self, address: u16, words: &[u16]) -> Result<bool> {
        window_byte(words.len(), MAX_WINDOW_WORDS)?;
        let mut payload = address.to_le_bytes().to_vec();
        for &word in words {
            payload.write_u16::<BigEndian>(word).unwrap();
        }
        Ok(matches!(
            self.send_command(&WRITE_RAM_WORDS, &payload, 0),
            Some(resp) if resp.length == 5
        ))
    }

    /// Read the single EEPROM word at `address`.
    pub fn read_eeprom_word(&mut self, address: u16) -> Result<Option<u16>> {
        let payload = address.to_le_bytes();
        match self.send_command(&READ_EEPROM_WORD, &payload, 0) {
            Some(resp) if resp.length == 7 => Ok(Some(u16::from_be_bytes([
                resp.data[0],
                resp.data[1],
            ]))),
            _ => Ok(None),
        }
    }

    /// Erase the whole EEPROM.
    ///
    /// Fire-and-forget: the ECU offers no status confirmation for this
    /// command, so there is nothing to return.
    pub fn erase_eeprom(&mut self) {
        let _ = self.send_command(&ERASE_EEPROM, &[], 0);
    }
}

/// Check a window size against its ceiling and narrow it to the wire byte.
#[allow(clippy::cast_possible_truncation)] // bounded by the window ceilings
fn window_byte(requested: usize, max: usize) -> Result<u8> {
    if requested > max {
        return Err(Error::TransferTooLarge { requested, max });
    }
    Ok(requested as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::{MockBridge, reply_frame};

    #[test]
    fn test_format_read_reorders_address_bytes() {
        assert_eq!(format_read(0x0000), [0x00, 0x00, 0x00]);
        assert_eq!(format_read(0x4000), [0x00, 0x00, 0x40]);
        assert_eq!(format_read(0x012345), [0x01, 0x45, 0x23]);
    }

    #[test]
    fn test_read_flash_window() {
        let mut bridge = MockBridge::new();
        bridge.push_reply(reply_frame(&READ_FLASH, &[1, 2, 3, 4, 5, 6, 7, 8]));
        let mut ecu = HondaEcu::new(bridge);
        let data = ecu.read_flash(0x4000, 8).expect("size ok").expect("data");
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        // Request payload: reordered address then the window size.
        assert_eq!(ecu.bridge().writes[0][4..8], [0x00, 0x00, 0x40, 0x08]);
    }

    #[test]
    fn test_read_flash_wrong_length_yields_no_data() {
        let mut bridge = MockBridge::new();
        // Four bytes back for an eight-byte request: length byte is 9, not 13.
        bridge.push_reply(reply_frame(&READ_FLASH, &[1, 2, 3, 4]));
        let mut ecu = HondaEcu::new(bridge);
        assert_eq!(ecu.read_flash(0x4000, 8).expect("size ok"), None);
    }

    #[test]
    fn test_oversized_window_rejected_before_any_traffic() {
        let mut ecu = HondaEcu::new(MockBridge::new());
        match ecu.read_flash(0x0000, 13) {
            Err(Error::TransferTooLarge { requested, max }) => {
                assert_eq!((requested, max), (13, 12));
            }
            other => panic!("expected size rejection, got {other:?}"),
        }
        assert!(ecu.bridge().writes.is_empty());

        assert!(ecu.write_ram_words(0x0100, &[0; 7]).is_err());
        assert!(ecu.bridge().writes.is_empty());
    }

    #[test]
    fn test_ram_round_trip_addressing() {
        let mut bridge = MockBridge::new();
        bridge.push_reply(reply_frame(&READ_RAM, &[0xAA, 0xBB]));
        let mut ecu = HondaEcu::new(bridge);
        let data = ecu.read_ram(0x1234, 2).expect("size ok").expect("data");
        assert_eq!(data, vec![0xAA, 0xBB]);
        // Little-endian address on the wire.
        assert_eq!(ecu.bridge().writes[0][4..7], [0x34, 0x12, 0x02]);
    }

    #[test]
    fn test_ram_words_swap_byte_order() {
        let mut bridge = MockBridge::new();
        bridge.push_reply(reply_frame(&READ_RAM_WORDS, &[0x12, 0x34, 0xAB, 0xCD]));
        let mut ecu = HondaEcu::new(bridge);
        let words = ecu
            .read_ram_words(0x0100, 2)
            .expect("size ok")
            .expect("words");
        assert_eq!(words, vec![0x1234, 0xABCD]);

        let mut bridge = MockBridge::new();
        bridge.push_reply(reply_frame(&WRITE_RAM_WORDS, &[]));
        let mut ecu = HondaEcu::new(bridge);
        assert!(ecu.write_ram_words(0x0100, &[0x1234]).expect("size ok"));
        // Word is big-endian on the wire, after the little-endian address.
        assert_eq!(ecu.bridge().writes[0][4..8], [0x00, 0x01, 0x12, 0x34]);
    }

    #[test]
    fn test_write_ram_unacknowledged() {
        let mut ecu = HondaEcu::new(MockBridge::new());
        assert!(!ecu.write_ram(0x0100, &[0x01]).expect("size ok"));
    }

    #[test]
    fn test_eeprom_word_read_is_fixed_size() {
        let mut bridge = MockBridge::new();
        bridge.push_reply(reply_frame(&READ_EEPROM_WORD, &[0xBE, 0xEF]));
        let mut ecu = HondaEcu::new(bridge);
        assert_eq!(ecu.read_eeprom_word(0x0010).expect("io"), Some(0xBEEF));
    }

    #[test]
    fn test_eeprom_erase_is_fire_and_forget() {
        let mut ecu = HondaEcu::new(MockBridge::new());
        ecu.erase_eeprom();
        assert_eq!(ecu.bridge().writes.len(), 1);
        assert_eq!(ecu.bridge().writes[0][..3], ERASE_EEPROM);
    }
}
