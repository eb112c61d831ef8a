//! Line timing derived from baud rate.

use std::time::Duration;

/// Numerator of the silence formula, in microsecond-baud.
///
/// `50_000_000 / baud` µs is roughly 5.5 character times on an 11-bit
/// character frame, comfortably above the nominal 3.5 required to end a frame.
pub const SILENCE_FACTOR_US: u64 = 50 * 1_000_000;

/// Bits per character on the wire: start + 8 data + parity/stop + stop.
pub const BITS_PER_CHAR: u64 = 11;

/// Silence interval that terminates a frame at `baud`.
///
/// A zero baud rate is treated as 1 baud rather than dividing by zero.
pub fn silence_interval(baud: u32) -> Duration {
    Duration::from_micros(SILENCE_FACTOR_US / u64::from(baud.max(1)))
}

/// Transmission time of one character at `baud`.
pub fn character_time(baud: u32) -> Duration {
    Duration::from_micros(BITS_PER_CHAR * 1_000_000 / u64::from(baud.max(1)))
}

/// Time to clock `len` bytes onto the wire at `baud`.
pub fn transmission_time(len: usize, baud: u32) -> Duration {
    character_time(baud) * u32::try_from(len).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_scales_inversely_with_baud() {
        assert_eq!(silence_interval(9600), Duration::from_micros(5208));
        assert_eq!(silence_interval(19_200), Duration::from_micros(2604));
        assert_eq!(silence_interval(115_200), Duration::from_micros(434));
    }

    #[test]
    fn silence_exceeds_three_and_a_half_characters() {
        for baud in [1200, 9600, 38_400, 115_200] {
            let t35 = character_time(baud) * 7 / 2;
            assert!(silence_interval(baud) > t35, "baud={baud}");
        }
    }

    #[test]
    fn zero_baud_does_not_panic() {
        assert_eq!(silence_interval(0), Duration::from_secs(50));
    }

    #[test]
    fn transmission_time_of_full_frame() {
        assert_eq!(transmission_time(256, 9600), character_time(9600) * 256);
    }
}
