//! CRC16/MODBUS checksum engine.
//!
//! Reflected polynomial 0xA001, seed 0xFFFF, no final XOR. The lookup is
//! split into two 256-entry tables, one per checksum byte, so each input
//! byte costs one index and two XORs.

use serde::{Deserialize, Serialize};

/// Reflected CRC16/MODBUS polynomial.
pub const POLYNOMIAL: u16 = 0xA001;

/// Initial register value.
pub const SEED: u16 = 0xFFFF;

const fn build_tables() -> ([u8; 256], [u8; 256]) {
    let mut low = [0u8; 256];
    let mut high = [0u8; 256];
    let mut index = 0;
    while index < 256 {
        let mut crc = index as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        low[index] = crc as u8;
        high[index] = (crc >> 8) as u8;
        index += 1;
    }
    (low, high)
}

const TABLES: ([u8; 256], [u8; 256]) = build_tables();
static CRC_LOW: [u8; 256] = TABLES.0;
static CRC_HIGH: [u8; 256] = TABLES.1;

/// Compute the CRC16/MODBUS checksum of `bytes`.
pub fn checksum(bytes: &[u8]) -> u16 {
    let [mut low, mut high] = SEED.to_le_bytes();
    for &byte in bytes {
        let index = usize::from(low ^ byte);
        low = high ^ CRC_LOW[index];
        high = CRC_HIGH[index];
    }
    u16::from_le_bytes([low, high])
}

/// Verify a buffer whose last two bytes are its checksum, low byte first.
pub fn verify(bytes_including_checksum: &[u8]) -> bool {
    ChecksumOrder::LowFirst.verify(bytes_including_checksum)
}

/// Order in which the two checksum bytes appear on the wire.
///
/// Conventional RTU devices send the low byte first. `HighFirst` exists for
/// deployments that standardised on the reverse order; the checksum value
/// itself is identical either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumOrder {
    #[default]
    LowFirst,
    HighFirst,
}

impl ChecksumOrder {
    /// Wire bytes for `crc`.
    pub fn to_wire(self, crc: u16) -> [u8; 2] {
        match self {
            ChecksumOrder::LowFirst => crc.to_le_bytes(),
            ChecksumOrder::HighFirst => crc.to_be_bytes(),
        }
    }

    /// Checksum value from its wire bytes.
    pub fn from_wire(self, wire: [u8; 2]) -> u16 {
        match self {
            ChecksumOrder::LowFirst => u16::from_le_bytes(wire),
            ChecksumOrder::HighFirst => u16::from_be_bytes(wire),
        }
    }

    /// Recompute over all but the trailing two bytes and compare.
    pub fn verify(self, bytes_including_checksum: &[u8]) -> bool {
        let Some(split) = bytes_including_checksum.len().checked_sub(2) else {
            return false;
        };
        let (body, trailer) = bytes_including_checksum.split_at(split);
        checksum(body) == self.from_wire([trailer[0], trailer[1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitwise_reference(bytes: &[u8]) -> u16 {
        let mut crc = SEED;
        for &byte in bytes {
            crc ^= u16::from(byte);
            for _ in 0..8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ POLYNOMIAL
                } else {
                    crc >> 1
                };
            }
        }
        crc
    }

    fn with_checksum(body: &[u8], order: ChecksumOrder) -> Vec<u8> {
        let mut out = body.to_vec();
        out.extend_from_slice(&order.to_wire(checksum(body)));
        out
    }

    #[test]
    fn standard_check_value() {
        assert_eq!(checksum(b"123456789"), 0x4B37);
    }

    #[test]
    fn empty_input_is_seed() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn known_read_request_frames() {
        let single = hex::decode("010300000001").unwrap();
        assert_eq!(ChecksumOrder::LowFirst.to_wire(checksum(&single)), [0x84, 0x0A]);

        let ten = hex::decode("01030000000a").unwrap();
        assert_eq!(ChecksumOrder::LowFirst.to_wire(checksum(&ten)), [0xC5, 0xCD]);
    }

    #[test]
    fn split_tables_match_bitwise_register() {
        let mut state = 0x1234_5678u32;
        for len in [1usize, 2, 7, 64, 253] {
            let data: Vec<u8> = (0..len)
                .map(|_| {
                    state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    (state >> 16) as u8
                })
                .collect();
            assert_eq!(checksum(&data), bitwise_reference(&data), "len={len}");
        }
    }

    #[test]
    fn order_sensitive() {
        assert_ne!(checksum(&[0x01, 0x02]), checksum(&[0x02, 0x01]));
    }

    #[test]
    fn verify_accepts_appended_checksum() {
        let framed = with_checksum(&[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03], ChecksumOrder::LowFirst);
        assert!(verify(&framed));
    }

    #[test]
    fn any_single_bit_flip_is_detected() {
        let framed = with_checksum(b"\x11\x10\x00\x01\x00\x02\x04\x00\x0a\x01\x02", ChecksumOrder::LowFirst);
        for bit in 0..framed.len() * 8 {
            let mut corrupted = framed.clone();
            corrupted[bit / 8] ^= 1 << (bit % 8);
            assert!(!verify(&corrupted), "flip of bit {bit} went unnoticed");
        }
    }

    #[test]
    fn verify_rejects_short_input() {
        assert!(!verify(&[]));
        assert!(!verify(&[0xFF]));
    }

    #[test]
    fn high_first_order_swaps_wire_bytes_only() {
        let body = hex::decode("010300000001").unwrap();
        let high_first = with_checksum(&body, ChecksumOrder::HighFirst);

        assert_eq!(&high_first[body.len()..], &[0x0A, 0x84]);
        assert!(ChecksumOrder::HighFirst.verify(&high_first));
        assert!(!ChecksumOrder::LowFirst.verify(&high_first));
    }

    #[test]
    fn order_serializes_snake_case() {
        let json = serde_json::to_string(&ChecksumOrder::HighFirst).unwrap();
        assert_eq!(json, "\"high_first\"");
    }
}
