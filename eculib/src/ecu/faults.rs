//! Stored fault code retrieval.
//!
//! Fault codes live in two diagnostic-table buckets, current and past. Each
//! bucket is scanned row by row; a row carries up to three code/subcode
//! pairs at fixed payload offsets, and a zero in the row's first code slot
//! marks the end of the stored list.

use crate::ecu::HondaEcu;
use crate::port::KlineBridge;

/// Diagnostic table holding currently active fault codes.
const CURRENT_FAULTS_TABLE: u8 = 0x74;

/// Diagnostic table holding stored historical fault codes.
const PAST_FAULTS_TABLE: u8 = 0x73;

/// Rows scanned per bucket before giving up.
const MAX_FAULT_ROWS: u8 = 0x0B;

/// Payload offsets of the three code slots in a fault row.
const CODE_SLOTS: [usize; 3] = [3, 5, 7];

/// Stored fault codes, formatted as `"NN-NN"` code-subcode strings.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FaultReport {
    /// Currently active faults.
    pub current: Vec<String>,
    /// Historical faults retained by the ECU.
    pub past: Vec<String>,
}

impl<B: KlineBridge> HondaEcu<B> {
    /// Retrieve stored fault codes from both buckets.
    ///
    /// Rows are queried without retry; an unanswered or truncated row ends
    /// that bucket's scan where it stands.
    pub fn read_faults(&mut self) -> FaultReport {
        FaultReport {
            current: self.scan_fault_bucket(CURRENT_FAULTS_TABLE),
            past: self.scan_fault_bucket(PAST_FAULTS_TABLE),
        }
    }

    fn scan_fault_bucket(&mut self, table: u8) -> Vec<String> {
        let mut codes = Vec::new();
        for row in 1..=MAX_FAULT_ROWS {
            let Some(resp) = self.send_command(&[0x72], &[table, row], 0) else {
                break;
            };
            for slot in CODE_SLOTS {
                if let (Some(&code), Some(&subcode)) =
                    (resp.data.get(slot), resp.data.get(slot + 1))
                {
                    if code != 0 {
                        codes.push(format!("{code:02}-{subcode:02}"));
                    }
                }
            }
            // Zero in the first code slot ends the stored list; a short row
            // is treated the same rather than read past its end.
            match resp.data.get(2) {
                Some(0x00) | None => break,
                Some(_) => {}
            }
        }
        codes
    }
}
