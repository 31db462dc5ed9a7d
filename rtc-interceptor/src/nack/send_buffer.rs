//! Send buffer for storing RTP packets for NACK retransmission.

use shared::error::{Error, Result};
use shared::sequence::SequenceUnwrapper;

/// Largest history the buffer accepts; half the sequence space keeps lookups unambiguous.
pub(crate) const MAX_SEND_BUFFER_SIZE: u16 = 1 << 15;

/// Buffer for storing sent RTP packets to enable NACK-based retransmission.
///
/// Packets are kept in a ring keyed by their unwrapped (64-bit) sequence number, so
/// the capacity does not have to divide 65536. Only the newest `size` sequence
/// numbers are retained; anything older is evicted oldest-first.
pub(crate) struct SendBuffer {
    /// Ring of (unwrapped sequence number, packet).
    packets: Vec<Option<(i64, rtp::Packet)>>,
    size: u16,
    unwrapper: SequenceUnwrapper,
    /// Highest unwrapped sequence number added.
    highest_added: Option<i64>,
}

impl SendBuffer {
    /// Create a new send buffer holding the last `size` packets.
    ///
    /// Size must be between 1 and 32768 (inclusive).
    pub(crate) fn new(size: u16) -> Result<Self> {
        if size == 0 || size > MAX_SEND_BUFFER_SIZE {
            return Err(Error::ErrInvalidSize(size as usize));
        }

        Ok(Self {
            packets: vec![None; size as usize],
            size,
            unwrapper: SequenceUnwrapper::new(),
            highest_added: None,
        })
    }

    /// Add an RTP packet to the buffer.
    pub(crate) fn add(&mut self, packet: rtp::Packet) {
        let ext = self.unwrapper.unwrap(packet.header.sequence_number);
        let size = self.size as i64;

        match self.highest_added {
            Some(highest) if ext > highest => {
                // drop whatever the skipped slots held from the previous lap
                for skipped in (highest + 1).max(ext - size + 1)..ext {
                    let slot = self.slot(skipped);
                    self.packets[slot] = None;
                }
                self.highest_added = Some(ext);
            }
            Some(highest) if ext == highest => return,
            Some(highest) if ext <= highest - size => return,
            Some(_) => {}
            None => self.highest_added = Some(ext),
        }

        let slot = self.slot(ext);
        self.packets[slot] = Some((ext, packet));
    }

    /// Get a packet by sequence number.
    ///
    /// Returns `None` if the packet is not in the buffer (either too old,
    /// never sent, or newer than anything sent).
    pub(crate) fn get(&self, seq: u16) -> Option<&rtp::Packet> {
        let highest = self.highest_added?;
        let ext = self.unwrapper.peek(seq);
        if ext > highest || ext <= highest - self.size as i64 {
            return None;
        }

        match &self.packets[self.slot(ext)] {
            Some((stored, packet)) if *stored == ext => Some(packet),
            _ => None,
        }
    }

    pub(crate) fn size(&self) -> u16 {
        self.size
    }

    fn slot(&self, ext: i64) -> usize {
        ext.rem_euclid(self.size as i64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet(seq: u16) -> rtp::Packet {
        rtp::Packet {
            header: rtp::header::Header {
                sequence_number: seq,
                ..Default::default()
            },
            payload: vec![seq as u8].into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_send_buffer_invalid_size() {
        assert_eq!(SendBuffer::new(0).err(), Some(Error::ErrInvalidSize(0)));
        assert!(SendBuffer::new(32769).is_err());
        assert!(SendBuffer::new(u16::MAX).is_err());
    }

    #[test]
    fn test_send_buffer_valid_sizes() {
        for size in [1u16, 3, 100, 600, 1024, 32768] {
            assert!(SendBuffer::new(size).is_ok(), "size {size}");
        }
    }

    #[test]
    fn test_send_buffer_basic() {
        let mut buf = SendBuffer::new(8).unwrap();
        assert!(buf.get(0).is_none());

        buf.add(make_packet(0));
        assert_eq!(buf.get(0).unwrap().header.sequence_number, 0);

        // never sent
        assert!(buf.get(1).is_none());
    }

    #[test]
    fn test_send_buffer_overwrite() {
        let mut buf = SendBuffer::new(8).unwrap();

        for i in 0..8 {
            buf.add(make_packet(i));
        }
        for i in 0..8 {
            assert!(buf.get(i).is_some());
        }

        // seq 8 evicts seq 0
        buf.add(make_packet(8));
        assert!(buf.get(8).is_some());
        assert!(buf.get(0).is_none());
        assert!(buf.get(1).is_some());
    }

    #[test]
    fn test_send_buffer_gap_clears_packets() {
        let mut buf = SendBuffer::new(8).unwrap();

        for i in 0..8 {
            buf.add(make_packet(i));
        }
        // jump ahead by a partial lap: 8, 9 were never sent
        buf.add(make_packet(10));

        assert!(buf.get(8).is_none());
        assert!(buf.get(9).is_none());
        assert!(buf.get(10).is_some());
        assert!(buf.get(2).is_none());
        assert!(buf.get(3).is_some());
    }

    #[test]
    fn test_send_buffer_non_power_of_two_across_wrap() {
        let mut buf = SendBuffer::new(600).unwrap();

        let start = 65535u16 - 299;
        for i in 0..900u16 {
            buf.add(make_packet(start.wrapping_add(i)));
        }
        let last = start.wrapping_add(899);

        // the last 600 are available, the 300 before them are evicted
        for i in 0..300u16 {
            assert!(buf.get(start.wrapping_add(i)).is_none(), "evicted {i}");
        }
        for i in 300..900u16 {
            let seq = start.wrapping_add(i);
            assert_eq!(buf.get(seq).map(|p| p.header.sequence_number), Some(seq));
        }
        assert!(buf.get(last.wrapping_add(1)).is_none());
    }

    #[test]
    fn test_send_buffer_wraparound() {
        let mut buf = SendBuffer::new(5).unwrap();

        buf.add(make_packet(65534));
        buf.add(make_packet(65535));
        buf.add(make_packet(0));
        buf.add(make_packet(1));

        assert!(buf.get(65534).is_some());
        assert!(buf.get(65535).is_some());
        assert!(buf.get(0).is_some());
        assert!(buf.get(1).is_some());
        assert!(buf.get(2).is_none());
    }

    #[test]
    fn test_send_buffer_out_of_order() {
        let mut buf = SendBuffer::new(8).unwrap();

        buf.add(make_packet(0));
        buf.add(make_packet(2));
        buf.add(make_packet(1));

        assert!(buf.get(0).is_some());
        assert!(buf.get(1).is_some());
        assert!(buf.get(2).is_some());
    }

    #[test]
    fn test_send_buffer_ignores_too_old() {
        let mut buf = SendBuffer::new(4).unwrap();

        for i in 10..20 {
            buf.add(make_packet(i));
        }
        buf.add(make_packet(12));
        assert!(buf.get(12).is_none());
        assert!(buf.get(16).is_some());
    }
}
