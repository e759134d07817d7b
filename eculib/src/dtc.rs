//! Diagnostic trouble code descriptions.
//!
//! Static lookup table mapping a `"NN-NN"` code-subcode string to its
//! human-readable description. Pure presentation data: the protocol engine
//! itself never consults it.

/// Fault code descriptions, sorted by code for binary search.
const DESCRIPTIONS: &[(&str, &str)] = &[
    ("01-01", "MAP sensor circuit low voltage"),
    ("01-02", "MAP sensor circuit high voltage"),
    ("02-01", "MAP sensor performance problem"),
    ("07-01", "ECT sensor circuit low voltage"),
    ("07-02", "ECT sensor circuit high voltage"),
    ("08-01", "TP sensor circuit low voltage"),
    ("08-02", "TP sensor circuit high voltage"),
    ("09-01", "IAT sensor circuit low voltage"),
    ("09-02", "IAT sensor circuit high voltage"),
    ("11-01", "VS sensor no signal"),
    ("12-01", "No.1 primary injector circuit malfunction"),
    ("13-01", "No.2 primary injector circuit malfunction"),
    ("14-01", "No.3 primary injector circuit malfunction"),
    ("15-01", "No.4 primary injector circuit malfunction"),
    ("16-01", "No.1 secondary injector circuit malfunction"),
    ("17-01", "No.2 secondary injector circuit malfunction"),
    ("18-01", "CMP sensor no signal"),
    ("19-01", "CKP sensor no signal"),
    ("21-01", "O2 sensor malfunction"),
    ("23-01", "O2 sensor heater malfunction"),
    ("25-02", "Knock sensor circuit malfunction"),
    ("25-03", "Knock sensor circuit malfunction"),
    ("29-01", "IACV circuit malfunction"),
    ("33-02", "ECM EEPROM malfunction"),
    ("34-01", "ECV POT low voltage malfunction"),
    ("34-02", "ECV POT high voltage malfunction"),
    ("35-01", "EGCA malfunction"),
    ("48-01", "No.3 secondary injector circuit malfunction"),
    ("49-01", "No.4 secondary injector circuit malfunction"),
    ("51-01", "HESD linear solenoid malfunction"),
    ("54-01", "Bank angle sensor circuit low voltage"),
    ("54-02", "Bank angle sensor circuit high voltage"),
    ("56-01", "Knock sensor IC malfunction"),
    ("86-01", "Serial communication malfunction"),
];

/// Look up the description for a fault code such as `"21-01"`.
pub fn describe(code: &str) -> Option<&'static str> {
    DESCRIPTIONS
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|idx| DESCRIPTIONS[idx].1)
}
