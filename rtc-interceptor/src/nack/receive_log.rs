//! Receive log for tracking received RTP packets and finding missing sequences.

use shared::error::{Error, Result};
use shared::sequence::{UINT16_SIZE_HALF, is_newer_sequence_number};

/// Tracks received RTP packets using a bitmap and identifies missing sequence numbers.
///
/// The receive log uses a circular bitmap covering the last `size` sequence numbers.
/// Anything older than that window is forgotten, so memory stays bounded no matter
/// how long the stream runs.
pub(crate) struct ReceiveLog {
    /// Bitmap for tracking received packets. Each u64 tracks 64 packets.
    packets: Vec<u64>,
    /// Size of the tracking window (power of 2, 64..=32768).
    size: u16,
    /// Highest sequence number received.
    end: u16,
    /// Whether any packet has been received yet.
    started: bool,
    /// Last consecutive sequence number (no gaps before this).
    last_consecutive: u16,
}

impl ReceiveLog {
    /// Create a new receive log with the specified size.
    ///
    /// Size must be a power of 2 between 64 and 32768 (inclusive).
    pub(crate) fn new(size: u16) -> Result<Self> {
        if !(6..=15).any(|i| size == 1 << i) {
            return Err(Error::ErrInvalidSize(size as usize));
        }

        Ok(Self {
            packets: vec![0u64; (size / 64) as usize],
            size,
            end: 0,
            started: false,
            last_consecutive: 0,
        })
    }

    /// Records a received sequence number.
    pub(crate) fn add(&mut self, seq: u16) {
        if !self.started {
            self.set_received(seq);
            self.end = seq;
            self.started = true;
            self.last_consecutive = seq;
            return;
        }

        let diff = seq.wrapping_sub(self.end);
        if diff == 0 {
            return;
        } else if diff < UINT16_SIZE_HALF {
            // the slots between the old end and seq may hold bits from a previous lap
            let mut i = self.end.wrapping_add(1);
            while i != seq {
                self.del_received(i);
                i = i.wrapping_add(1);
            }
            self.end = seq;

            if self.last_consecutive.wrapping_add(1) == seq {
                self.last_consecutive = seq;
            } else if seq.wrapping_sub(self.last_consecutive) > self.size {
                self.last_consecutive = seq.wrapping_sub(self.size);
                self.fix_last_consecutive();
            }
        } else {
            // late packet, possibly a retransmission filling a hole
            if self.end.wrapping_sub(seq) >= self.size {
                return;
            }
            if self.last_consecutive.wrapping_add(1) == seq {
                self.last_consecutive = seq;
                self.fix_last_consecutive();
            }
        }

        self.set_received(seq);
    }

    /// Check if a sequence number has been received.
    pub(crate) fn get(&self, seq: u16) -> bool {
        if !self.started {
            return false;
        }
        let diff = self.end.wrapping_sub(seq);
        if diff >= UINT16_SIZE_HALF || diff >= self.size {
            return false;
        }
        self.get_received(seq)
    }

    /// Highest sequence number received so far.
    pub(crate) fn highest(&self) -> Option<u16> {
        self.started.then_some(self.end)
    }

    /// Missing sequence numbers strictly between `low` and `high`, oldest first.
    ///
    /// Only the tracked window is inspected: numbers that fell out of the window, or
    /// that lie beyond the highest received packet, are not reported.
    pub(crate) fn missing_in_range(&self, low: u16, high: u16) -> Vec<u16> {
        if !self.started || !is_newer_sequence_number(high, low) {
            return Vec::new();
        }

        let mut missing = Vec::new();
        let mut i = low.wrapping_add(1);
        while i != high {
            let behind_end = self.end.wrapping_sub(i);
            if behind_end < UINT16_SIZE_HALF && behind_end < self.size && !self.get_received(i) {
                missing.push(i);
            }
            i = i.wrapping_add(1);
        }

        missing
    }

    /// Get missing sequence numbers, optionally skipping the last N packets.
    ///
    /// Returns the missing sequence numbers between `last_consecutive + 1`
    /// and `end - skip_last_n`, both inclusive.
    pub(crate) fn missing_seq_numbers(&self, skip_last_n: u16) -> Vec<u16> {
        if !self.started {
            return Vec::new();
        }

        let until = self.end.wrapping_sub(skip_last_n);
        if until.wrapping_sub(self.last_consecutive) >= UINT16_SIZE_HALF {
            return Vec::new();
        }

        self.missing_in_range(self.last_consecutive, until.wrapping_add(1))
    }

    fn set_received(&mut self, seq: u16) {
        let pos = seq % self.size;
        self.packets[(pos / 64) as usize] |= 1 << (pos % 64);
    }

    fn del_received(&mut self, seq: u16) {
        let pos = seq % self.size;
        self.packets[(pos / 64) as usize] &= !(1u64 << (pos % 64));
    }

    fn get_received(&self, seq: u16) -> bool {
        let pos = seq % self.size;
        (self.packets[(pos / 64) as usize] & (1 << (pos % 64))) != 0
    }

    fn fix_last_consecutive(&mut self) {
        let mut i = self.last_consecutive.wrapping_add(1);
        while i != self.end.wrapping_add(1) && self.get_received(i) {
            i = i.wrapping_add(1);
        }
        self.last_consecutive = i.wrapping_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_log_invalid_size() {
        assert_eq!(ReceiveLog::new(5).err(), Some(Error::ErrInvalidSize(5)));
        assert!(ReceiveLog::new(32).is_err());
        assert!(ReceiveLog::new(100).is_err());
        assert!(ReceiveLog::new(0).is_err());
    }

    #[test]
    fn test_receive_log_valid_sizes() {
        for size in [64u16, 128, 256, 512, 1024, 32768] {
            assert!(ReceiveLog::new(size).is_ok(), "size {size}");
        }
    }

    #[test]
    fn test_single_packet_has_nothing_missing() {
        let mut rl = ReceiveLog::new(64).unwrap();
        assert!(rl.missing_seq_numbers(0).is_empty());
        assert_eq!(rl.highest(), None);

        rl.add(2345);
        assert!(rl.missing_seq_numbers(0).is_empty());
        assert!(rl.missing_in_range(2345, 2345).is_empty());
        assert_eq!(rl.highest(), Some(2345));
    }

    #[test]
    fn test_receive_log_window_slides() {
        let mut rl = ReceiveLog::new(128).unwrap();

        rl.add(0);
        for i in 1..=127 {
            rl.add(i);
        }
        assert!(rl.missing_seq_numbers(0).is_empty());
        assert_eq!(rl.last_consecutive, 127);

        rl.add(128);
        assert!(rl.get(128));
        assert!(!rl.get(0)); // slid out of the window
        assert!(rl.missing_seq_numbers(0).is_empty());
        assert_eq!(rl.last_consecutive, 128);
    }

    #[test]
    fn test_receive_log_large_gap_is_bounded_by_window() {
        let mut rl = ReceiveLog::new(128).unwrap();

        rl.add(0);
        rl.add(1);
        rl.add(300);

        // only the last 128 numbers are tracked
        let missing = rl.missing_seq_numbers(0);
        assert_eq!(missing.len(), 127);
        assert_eq!(missing.first(), Some(&173));
        assert_eq!(missing.last(), Some(&299));
    }

    #[test]
    fn test_receive_log_skip_last_n() {
        let mut rl = ReceiveLog::new(128).unwrap();

        rl.add(0);
        rl.add(5);

        assert_eq!(rl.missing_seq_numbers(0), vec![1, 2, 3, 4]);
        // until = end(5) - skip_last_n(2) = 3, inclusive
        assert_eq!(rl.missing_seq_numbers(2), vec![1, 2, 3]);
        assert!(rl.missing_seq_numbers(6).is_empty());
    }

    #[test]
    fn test_receive_log_out_of_order() {
        let mut rl = ReceiveLog::new(128).unwrap();

        rl.add(0);
        rl.add(3);
        assert_eq!(rl.missing_seq_numbers(0), vec![1, 2]);

        rl.add(1);
        assert_eq!(rl.missing_seq_numbers(0), vec![2]);
        assert_eq!(rl.last_consecutive, 1);

        rl.add(2);
        assert!(rl.missing_seq_numbers(0).is_empty());
        assert_eq!(rl.last_consecutive, 3);
    }

    #[test]
    fn test_missing_in_range() {
        let mut rl = ReceiveLog::new(64).unwrap();
        for seq in [10u16, 11, 14, 15, 18] {
            rl.add(seq);
        }

        assert_eq!(rl.missing_in_range(10, 18), vec![12, 13, 16, 17]);
        assert_eq!(rl.missing_in_range(11, 15), vec![12, 13]);
        // bounds are exclusive
        assert!(rl.missing_in_range(13, 14).is_empty());
        // reversed range is empty
        assert!(rl.missing_in_range(18, 10).is_empty());
        // nothing past the highest received packet
        assert_eq!(rl.missing_in_range(15, 25), vec![16, 17]);
    }

    #[test]
    fn test_receive_log_wraparound() {
        let mut rl = ReceiveLog::new(128).unwrap();

        rl.add(65534);
        rl.add(65535);
        rl.add(0);
        assert_eq!(rl.last_consecutive, 0);
        // 65535 -> 0 is one step, not a 65535 packet gap
        assert!(rl.missing_seq_numbers(0).is_empty());

        rl.add(2);
        assert_eq!(rl.missing_seq_numbers(0), vec![1]);
        assert_eq!(rl.missing_in_range(65533, 3), vec![1]);
    }

    #[test]
    fn test_receive_log_various_start_points() {
        for start in [0u16, 1, 127, 128, 129, 511, 512, 513, 32767, 32768, 65534, 65535] {
            let mut rl = ReceiveLog::new(128).unwrap();

            rl.add(start);
            assert!(rl.get(start));
            assert!(rl.missing_seq_numbers(0).is_empty());
            assert_eq!(rl.last_consecutive, start);

            for i in 1..=127u16 {
                rl.add(start.wrapping_add(i));
            }
            assert!(rl.missing_seq_numbers(0).is_empty());
            assert_eq!(rl.last_consecutive, start.wrapping_add(127));

            rl.add(start.wrapping_add(128));
            assert!(rl.get(start.wrapping_add(128)));
            assert!(!rl.get(start));
            assert!(rl.missing_seq_numbers(0).is_empty());

            rl.add(start.wrapping_add(130));
            assert!(rl.get(start.wrapping_add(130)));
            assert_eq!(
                rl.missing_seq_numbers(0),
                vec![start.wrapping_add(129)],
                "start {start}"
            );
            assert_eq!(rl.last_consecutive, start.wrapping_add(128));
        }
    }

    #[test]
    fn test_late_packet_outside_window_is_ignored() {
        let mut rl = ReceiveLog::new(64).unwrap();
        rl.add(1000);
        rl.add(1100);
        rl.add(1001);
        assert!(!rl.get(1001));
        assert!(rl.get(1100));
    }
}
