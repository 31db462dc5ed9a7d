//! 16-bit RTP sequence number arithmetic.
//!
//! Sequence numbers wrap at 2^16. A sequence number `a` is newer than `b` when the
//! forward distance from `b` to `a` is in `1..0x8000`; the ambiguous distance of
//! exactly `0x8000` is broken by the larger raw value.

/// Half of the 16-bit sequence space.
pub const UINT16_SIZE_HALF: u16 = 1 << 15;

/// Returns true if `seq` comes after `prev` in wrapping sequence order.
pub fn is_newer_sequence_number(seq: u16, prev: u16) -> bool {
    let diff = seq.wrapping_sub(prev);
    if diff == UINT16_SIZE_HALF {
        return seq > prev;
    }
    diff != 0 && diff < UINT16_SIZE_HALF
}

/// Returns whichever of the two sequence numbers is newer.
pub fn latest_sequence_number(a: u16, b: u16) -> u16 {
    if is_newer_sequence_number(a, b) { a } else { b }
}

/// Signed wrapping distance from `prev` to `seq`, in `-0x8000..0x8000`.
pub fn sequence_number_diff(seq: u16, prev: u16) -> i32 {
    seq.wrapping_sub(prev) as i16 as i32
}

/// Extends 16-bit sequence numbers into a monotonic 64-bit space.
///
/// Each value is placed at the position closest to the previously unwrapped value,
/// so reordering within half the sequence space is tolerated.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequenceUnwrapper {
    last_unwrapped: Option<i64>,
}

impl SequenceUnwrapper {
    pub fn new() -> Self {
        Self {
            last_unwrapped: None,
        }
    }

    pub fn unwrap(&mut self, seq: u16) -> i64 {
        let unwrapped = self.peek(seq);
        self.last_unwrapped = Some(unwrapped);
        unwrapped
    }

    /// Unwraps `seq` without updating the reference point.
    pub fn peek(&self, seq: u16) -> i64 {
        match self.last_unwrapped {
            None => seq as i64,
            Some(last) => {
                let last_seq = (last & 0xFFFF) as u16;
                last + sequence_number_diff(seq, last_seq) as i64
            }
        }
    }

    pub fn last_unwrapped(&self) -> Option<i64> {
        self.last_unwrapped
    }

    pub fn reset(&mut self) {
        self.last_unwrapped = None;
    }
}
