use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::header::*;
use crate::packet::Packet;
use crate::util::*;

/// PacketBitmap shouldn't be used like a normal integral,
/// so it's type is masked here. Access it with packet_list().
type PacketBitmap = u16;

/// NackPair is a wire-representation of a collection of
/// Lost RTP packets
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct NackPair {
    /// ID of lost packets
    pub packet_id: u16,
    /// Bitmask of following lost packets
    pub lost_packets: PacketBitmap,
}

pub struct NackIterator {
    packet_id: u16,
    bitfield: PacketBitmap,
    has_yielded_packet_id: bool,
}

impl Iterator for NackIterator {
    type Item = u16;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_yielded_packet_id {
            self.has_yielded_packet_id = true;

            Some(self.packet_id)
        } else {
            let mut i = 0;

            while self.bitfield != 0 {
                if (self.bitfield & (1 << i)) != 0 {
                    self.bitfield &= !(1 << i);

                    return Some(self.packet_id.wrapping_add(i + 1));
                }

                i += 1;
            }

            None
        }
    }
}

impl NackPair {
    pub fn new(seq: u16) -> Self {
        Self {
            packet_id: seq,
            lost_packets: Default::default(),
        }
    }

    /// packet_list returns a list of Nack'd packets that's referenced by a NackPair
    pub fn packet_list(&self) -> Vec<u16> {
        self.into_iter().collect()
    }

    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(u16) -> bool,
    {
        for packet_id in self.into_iter() {
            if !f(packet_id) {
                return;
            }
        }
    }
}

/// Create an iterator over all the packet sequence numbers expressed by this NACK pair.
impl IntoIterator for NackPair {
    type Item = u16;

    type IntoIter = NackIterator;

    fn into_iter(self) -> Self::IntoIter {
        NackIterator {
            packet_id: self.packet_id,
            bitfield: self.lost_packets,
            has_yielded_packet_id: false,
        }
    }
}

const TLN_LENGTH: usize = 2;
const NACK_OFFSET: usize = 8;

/// The TransportLayerNack packet informs the sender about the loss of a transport packet
/// ## Specifications
///
/// * [RFC 4585 §6.2.1]
///
/// [RFC 4585 §6.2.1]: https://tools.ietf.org/html/rfc4585#section-6.2.1
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct TransportLayerNack {
    /// SSRC of sender
    pub sender_ssrc: u32,
    /// SSRC of the media source
    pub media_ssrc: u32,

    pub nacks: Vec<NackPair>,
}

impl TransportLayerNack {
    /// All sequence numbers this packet asks for, in the order they appear on the wire.
    pub fn sequence_numbers(&self) -> impl Iterator<Item = u16> + '_ {
        self.nacks.iter().flat_map(|n| n.into_iter())
    }
}

impl fmt::Display for TransportLayerNack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = format!("TransportLayerNack from {:x}\n", self.sender_ssrc);
        out += format!("\tMedia Ssrc {:x}\n", self.media_ssrc).as_str();
        out += "\tID\tLostPackets\n";
        for nack in &self.nacks {
            out += format!("\t{}\t{:b}\n", nack.packet_id, nack.lost_packets).as_str();
        }
        write!(f, "{out}")
    }
}

impl Packet for TransportLayerNack {
    /// returns the Header associated with this packet.
    fn header(&self) -> Header {
        Header {
            padding: get_padding_size(self.raw_size()) != 0,
            count: FORMAT_TLN,
            packet_type: PacketType::TransportSpecificFeedback,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    /// destination_ssrc returns an array of SSRC values that this packet refers to.
    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH + NACK_OFFSET + self.nacks.len() * 4
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &dyn Packet) -> bool {
        other
            .as_any()
            .downcast_ref::<TransportLayerNack>()
            .is_some_and(|a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet> {
        Box::new(self.clone())
    }
}

impl MarshalSize for TransportLayerNack {
    fn marshal_size(&self) -> usize {
        let l = self.raw_size();
        // align to 32-bit boundary
        l + get_padding_size(l)
    }
}

impl Marshal for TransportLayerNack {
    /// Marshal encodes the packet in binary.
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        if self.nacks.len() + TLN_LENGTH > u8::MAX as usize {
            return Err(Error::TooManyReports);
        }
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort);
        }

        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);

        for nack in &self.nacks {
            buf.put_u16(nack.packet_id);
            buf.put_u16(nack.lost_packets);
        }

        if h.padding {
            put_padding(buf, self.raw_size());
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for TransportLayerNack {
    /// Unmarshal decodes the TransportLayerNack from binary
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < (HEADER_LENGTH + SSRC_LENGTH) {
            return Err(Error::PacketTooShort);
        }

        let h = Header::unmarshal(raw_packet)?;

        if raw_packet_len < (HEADER_LENGTH + (4 * h.length as usize)) {
            return Err(Error::PacketTooShort);
        }
        if (h.length as usize) < NACK_OFFSET / 4 {
            return Err(Error::HeaderTooSmall);
        }

        if h.packet_type != PacketType::TransportSpecificFeedback || h.count != FORMAT_TLN {
            return Err(Error::WrongType);
        }

        let sender_ssrc = raw_packet.get_u32();
        let media_ssrc = raw_packet.get_u32();

        let mut nacks = vec![];
        for _ in 0..(h.length as usize - NACK_OFFSET / 4) {
            nacks.push(NackPair {
                packet_id: raw_packet.get_u16(),
                lost_packets: raw_packet.get_u16(),
            });
        }

        if raw_packet.has_remaining() {
            raw_packet.advance(raw_packet.remaining());
        }

        Ok(TransportLayerNack {
            sender_ssrc,
            media_ssrc,
            nacks,
        })
    }
}

/// Packs sequence numbers into NACK pairs.
///
/// The input is expected oldest first in RTP order, which may cross the 16-bit
/// wrap (`65534, 65535, 0, 1` packs into a single pair at 65534). A number that
/// lies more than 16 ahead of the current pair, or behind it, starts a new pair.
pub fn nack_pairs_from_sequence_numbers(seq_nos: &[u16]) -> Vec<NackPair> {
    let Some((&first, rest)) = seq_nos.split_first() else {
        return vec![];
    };

    let mut nack_pair = NackPair::new(first);
    let mut pairs = vec![];

    for &seq in rest {
        let diff = seq.wrapping_sub(nack_pair.packet_id);
        if diff == 0 {
            continue;
        }
        // anything behind the pair start wraps to >= 0x8000
        if diff > 16 {
            pairs.push(nack_pair);
            nack_pair = NackPair::new(seq);
            continue;
        }

        nack_pair.lost_packets |= 1 << (diff - 1);
    }

    pairs.push(nack_pair);

    pairs
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_transport_layer_nack_unmarshal() {
        let tests = vec![
            (
                "valid",
                Bytes::from_static(&[
                    // TransportLayerNack
                    0x81, 0xcd, 0x0, 0x3, // sender=0x902f9e2e
                    0x90, 0x2f, 0x9e, 0x2e, // media=0x902f9e2e
                    0x90, 0x2f, 0x9e, 0x2e, // nack 0xAAAA, 0x5555
                    0xaa, 0xaa, 0x55, 0x55,
                ]),
                TransportLayerNack {
                    sender_ssrc: 0x902f9e2e,
                    media_ssrc: 0x902f9e2e,
                    nacks: vec![NackPair {
                        packet_id: 0xaaaa,
                        lost_packets: 0x5555,
                    }],
                },
                None,
            ),
            (
                "short report",
                Bytes::from_static(&[
                    0x81, 0xcd, 0x0, 0x2, // ssrc=0x902f9e2e
                    0x90, 0x2f, 0x9e, 0x2e,
                    // report ends early
                ]),
                TransportLayerNack::default(),
                Some(Error::PacketTooShort),
            ),
            (
                "wrong type",
                Bytes::from_static(&[
                    // v=2, p=0, count=1, RR, len=7
                    0x81, 0xc9, 0x0, 0x7, // ssrc=0x902f9e2e
                    0x90, 0x2f, 0x9e, 0x2e, // ssrc=0xbc5e9a40
                    0xbc, 0x5e, 0x9a, 0x40, // fracLost=0, totalLost=0
                    0x0, 0x0, 0x0, 0x0, // lastSeq=0x46e1
                    0x0, 0x0, 0x46, 0xe1, // jitter=273
                    0x0, 0x0, 0x1, 0x11, // lsr=0x9f36432
                    0x9, 0xf3, 0x64, 0x32, // delay=150137
                    0x0, 0x2, 0x4a, 0x79,
                ]),
                TransportLayerNack::default(),
                Some(Error::WrongType),
            ),
            (
                "nil",
                Bytes::from_static(&[]),
                TransportLayerNack::default(),
                Some(Error::PacketTooShort),
            ),
        ];

        for (name, mut data, want, want_error) in tests {
            let got = TransportLayerNack::unmarshal(&mut data);

            match (got, want_error) {
                (Ok(tln), None) => assert_eq!(tln, want, "Unmarshal {name}"),
                (Err(err), Some(want_error)) => assert_eq!(err, want_error, "Unmarshal {name}"),
                (got, want_error) => panic!("Unmarshal {name}: got {got:?}, want {want_error:?}"),
            }
        }
    }

    #[test]
    fn test_transport_layer_nack_roundtrip() -> Result<()> {
        let want = TransportLayerNack {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
            nacks: vec![
                NackPair {
                    packet_id: 1,
                    lost_packets: 0xAA,
                },
                NackPair {
                    packet_id: 1034,
                    lost_packets: 0x05,
                },
            ],
        };

        let data = want.marshal()?;
        let got = TransportLayerNack::unmarshal(&mut data.clone())?;
        assert_eq!(got, want);

        Ok(())
    }

    #[test]
    fn test_nack_pair() {
        let test_nack = |s: Vec<u16>, n: NackPair| {
            let l = n.packet_list();
            assert_eq!(s, l, "{n:?}: expected {s:?}, got {l:?}");
        };

        test_nack(
            vec![42],
            NackPair {
                packet_id: 42,
                lost_packets: 0,
            },
        );
        test_nack(
            vec![42, 43],
            NackPair {
                packet_id: 42,
                lost_packets: 1,
            },
        );
        test_nack(
            vec![42, 44],
            NackPair {
                packet_id: 42,
                lost_packets: 2,
            },
        );
        test_nack(
            vec![42, 58],
            NackPair {
                packet_id: 42,
                lost_packets: 0x8000,
            },
        );
        test_nack(
            vec![65534, 65535, 0, 1],
            NackPair {
                packet_id: 65534,
                lost_packets: 0b111,
            },
        );
    }

    #[test]
    fn test_nack_pair_range() {
        let n = NackPair {
            packet_id: 42,
            lost_packets: 2,
        };

        let mut out = vec![];
        n.range(|s| {
            out.push(s);
            true
        });
        assert_eq!(out, vec![42, 44]);

        let mut out = vec![];
        n.range(|s| {
            out.push(s);
            false
        });
        assert_eq!(out, vec![42]);
    }

    #[test]
    fn test_nack_pairs_from_sequence_numbers() {
        assert!(nack_pairs_from_sequence_numbers(&[]).is_empty());

        assert_eq!(
            nack_pairs_from_sequence_numbers(&[2, 3, 5, 18, 19]),
            vec![
                NackPair {
                    packet_id: 2,
                    lost_packets: 0b1000_0000_0000_0101,
                },
                NackPair {
                    packet_id: 19,
                    lost_packets: 0,
                },
            ]
        );

        // duplicates fold into the current pair
        assert_eq!(
            nack_pairs_from_sequence_numbers(&[7, 7, 8]),
            vec![NackPair {
                packet_id: 7,
                lost_packets: 1,
            }]
        );

        // crossing the 16-bit wrap stays in one pair
        assert_eq!(
            nack_pairs_from_sequence_numbers(&[65533, 65535, 0, 3]),
            vec![NackPair {
                packet_id: 65533,
                lost_packets: 0b10_0110,
            }]
        );
    }

    #[test]
    fn test_sequence_numbers_expand_pairs() {
        let tln = TransportLayerNack {
            sender_ssrc: 1,
            media_ssrc: 2,
            nacks: nack_pairs_from_sequence_numbers(&[100, 101, 140]),
        };
        assert_eq!(tln.sequence_numbers().collect::<Vec<_>>(), vec![100, 101, 140]);
    }
}
