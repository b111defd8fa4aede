//! CRC-8 checksums

/// Parameters of a CRC-8 variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc8Params {
    pub polynomial: u8,
    pub init: u8,
    pub xor_out: u8,
    /// Reflected (LSB-first) processing
    pub reflect: bool,
}

/// CRC-8/SMBUS: polynomial 0x07, no reflection, no final XOR.
///
/// This is the profile the peripheral firmware's CRC8 library computes.
pub const FIRMWARE_CRC8: Crc8Params =
    Crc8Params { polynomial: 0x07, init: 0x00, xor_out: 0x00, reflect: false };

/// CRC-8 with arbitrary parameters.
pub fn crc8_parameterised(data: &[u8], params: Crc8Params) -> u8 {
    let mut crc = params.init;

    if params.reflect {
        let reflected_poly = params.polynomial.reverse_bits();
        for &byte in data {
            crc ^= byte;
            for _ in 0..8 {
                if crc & 0x01 != 0 {
                    crc = (crc >> 1) ^ reflected_poly;
                } else {
                    crc >>= 1;
                }
            }
        }
    } else {
        for &byte in data {
            crc ^= byte;
            for _ in 0..8 {
                if crc & 0x80 != 0 {
                    crc = (crc << 1) ^ params.polynomial;
                } else {
                    crc <<= 1;
                }
            }
        }
    }

    crc ^ params.xor_out
}

/// CRC-8 using the firmware profile.
pub fn crc8(data: &[u8]) -> u8 {
    crc8_parameterised(data, FIRMWARE_CRC8)
}
