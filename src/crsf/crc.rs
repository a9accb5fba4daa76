//! # CRC8-DVB-S2 Implementation
//!
//! CRC-8-DVB-S2 checksum calculation for CRSF protocol.
//!
//! **Polynomial**: 0xD5 (x^8 + x^7 + x^6 + x^4 + x^2 + 1)
//! **Initial Value**: 0x00
//! **Coverage**: Type + Payload (the sync and length bytes are excluded)

/// CRC-8-DVB-S2 polynomial
const CRC8_POLY: u8 = 0xD5;

/// Shift one byte through the polynomial, MSB first
const fn crc8_shift(mut crc: u8) -> u8 {
    let mut bit = 0;
    while bit < 8 {
        crc = if crc & 0x80 != 0 { (crc << 1) ^ CRC8_POLY } else { crc << 1 };
        bit += 1;
    }
    crc
}

/// Lookup table, built at compile time
const CRC8_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc8_shift(i as u8);
        i += 1;
    }
    table
};

/// Calculate CRC8-DVB-S2 checksum using lookup table
///
/// # Arguments
///
/// * `data` - Byte slice to calculate CRC for (Type + Payload)
///
/// # Examples
///
/// ```
/// use crsf_bridge::crsf::crc::crc8_dvb_s2;
///
/// assert_eq!(crc8_dvb_s2(&[0x01]), 0xD5);
/// ```
pub fn crc8_dvb_s2(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

/// Bitwise reference implementation, only used to cross-check the table.
#[cfg(test)]
fn crc8_dvb_s2_slow(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &byte| crc8_shift(crc ^ byte))
}
