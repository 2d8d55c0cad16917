//! Tick records and their wire format.
//!
//! # Wire Layout
//!
//! One frame per tick, native byte order, no padding:
//!
//! | Field          | Type    | Offset | Size |
//! |----------------|---------|--------|------|
//! | sequence       | u64     | 0      | 8    |
//! | symbol         | [u8; 8] | 8      | 8    |
//! | bid            | f64     | 16     | 8    |
//! | ask            | f64     | 24     | 8    |
//! | timestamp_ns   | u64     | 32     | 8    |
//! | **Total**      |         |        | 40   |

use std::fmt;

use arrayvec::ArrayString;
use bytemuck::{Pod, Zeroable};
use chrono::{DateTime, Utc};

/// Fixed-width instrument identifier, NUL padded.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct Symbol(pub [u8; 8]);

impl Symbol {
    /// Build a symbol from text, truncating to 8 bytes.
    pub fn new(name: &str) -> Self {
        let mut raw = [0u8; 8];
        let bytes = name.as_bytes();
        let len = bytes.len().min(raw.len());
        raw[..len].copy_from_slice(&bytes[..len]);
        Self(raw)
    }

    /// Printable form: bytes up to the first NUL, non-ASCII bytes skipped.
    pub fn as_text(&self) -> ArrayString<8> {
        let mut out = ArrayString::new();
        for &b in self.0.iter().take_while(|&&b| b != 0) {
            if b.is_ascii() {
                out.push(b as char);
            }
        }
        out
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_text().as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text().as_str())
    }
}

/// A single top-of-book quote from the remote feed.
///
/// The in-memory layout is the wire layout; decoding is a byte copy.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Tick {
    /// Producer-assigned, monotonically increasing
    pub sequence: u64,
    pub symbol: Symbol,
    pub bid: f64,
    pub ask: f64,
    /// Nanoseconds since the Unix epoch
    pub timestamp_ns: u64,
}

// The frame size is part of the protocol
const _: () = assert!(
    std::mem::size_of::<Tick>() == Tick::WIRE_SIZE,
    "Tick must be exactly 40 bytes with no padding"
);

impl Tick {
    /// Size of one frame on the wire.
    pub const WIRE_SIZE: usize = 40;

    /// Decode one frame. Anything other than exactly [`Tick::WIRE_SIZE`]
    /// bytes is rejected.
    #[inline]
    pub fn decode(frame: &[u8]) -> Option<Self> {
        if frame.len() != Self::WIRE_SIZE {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(frame))
    }

    /// Encode into a wire frame.
    #[inline]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut frame = [0u8; Self::WIRE_SIZE];
        frame.copy_from_slice(bytemuck::bytes_of(self));
        frame
    }

    #[inline]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Exchange timestamp as a calendar time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let ns = i64::try_from(self.timestamp_ns).unwrap_or(i64::MAX);
        DateTime::from_timestamp_nanos(ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tick {
        Tick {
            sequence: 42,
            symbol: Symbol::new("ETHUSD"),
            bid: 3001.25,
            ask: 3001.75,
            timestamp_ns: 1_700_000_000_123_456_789,
        }
    }

    #[test]
    fn test_tick_size() {
        assert_eq!(std::mem::size_of::<Tick>(), 40);
    }

    #[test]
    fn test_decode_exact_frame() {
        let tick = sample();
        let frame = tick.encode();

        assert_eq!(&frame[0..8], &42u64.to_ne_bytes());
        assert_eq!(&frame[8..14], b"ETHUSD");
        assert_eq!(Tick::decode(&frame), Some(tick));
    }

    #[test]
    fn test_decode_rejects_short_and_long_frames() {
        let frame = sample().encode();

        assert_eq!(Tick::decode(&frame[..39]), None);
        assert_eq!(Tick::decode(&[]), None);

        let mut long = frame.to_vec();
        long.push(0);
        assert_eq!(Tick::decode(&long), None);
    }

    #[test]
    fn test_decode_unaligned_buffer() {
        let frame = sample().encode();
        let mut buf = vec![0u8; 41];
        buf[1..].copy_from_slice(&frame);

        assert_eq!(Tick::decode(&buf[1..]), Some(sample()));
    }

    #[test]
    fn test_symbol_text() {
        assert_eq!(Symbol::new("BTC").as_text().as_str(), "BTC");
        assert_eq!(Symbol::new("ABCDEFGHIJ").as_text().as_str(), "ABCDEFGH");
        assert_eq!(Symbol::default().to_string(), "");
    }

    #[test]
    fn test_mid_and_timestamp() {
        let tick = sample();

        assert_eq!(tick.mid(), 3001.5);
        assert_eq!(tick.timestamp().timestamp(), 1_700_000_000);
        assert_eq!(tick.timestamp().timestamp_subsec_nanos(), 123_456_789);
    }
}
