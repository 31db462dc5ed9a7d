use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::header::*;
use crate::packet::Packet;
use crate::util::*;

const RPSI_OFFSET: usize = 8;
const RPSI_FCI_HEADER_LENGTH: usize = 2;

/// The ReferencePictureSelectionIndication packet tells the encoder which picture
/// the receiver decoded correctly and may be used as a reference.
///
/// For VP8 the native bit string carries the picture id as big-endian 7-bit groups,
/// with the high bit set on every byte except the last.
///
/// ## Specifications
///
/// * [RFC 4585 §6.3.3]
///
/// [RFC 4585 §6.3.3]: https://tools.ietf.org/html/rfc4585#section-6.3.3
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct ReferencePictureSelectionIndication {
    /// SSRC of sender
    pub sender_ssrc: u32,
    /// SSRC of the media source
    pub media_ssrc: u32,
    /// RTP payload type the bit string is defined for
    pub payload_type: u8,
    /// Native RPSI bit string, without trailing padding
    pub bit_string: Bytes,
}

impl ReferencePictureSelectionIndication {
    /// Builds an RPSI carrying a VP8 picture id.
    pub fn with_picture_id(
        sender_ssrc: u32,
        media_ssrc: u32,
        payload_type: u8,
        picture_id: u64,
    ) -> Self {
        let mut groups = 1;
        while groups < 10 && (picture_id >> (7 * groups)) > 0 {
            groups += 1;
        }

        let mut bit_string = BytesMut::with_capacity(groups);
        for i in (1..groups).rev() {
            bit_string.put_u8(0x80 | ((picture_id >> (i * 7)) & 0x7F) as u8);
        }
        bit_string.put_u8((picture_id & 0x7F) as u8);

        ReferencePictureSelectionIndication {
            sender_ssrc,
            media_ssrc,
            payload_type,
            bit_string: bit_string.freeze(),
        }
    }

    /// Decodes the bit string as a VP8 picture id.
    pub fn picture_id(&self) -> Option<u64> {
        if self.bit_string.is_empty() || self.bit_string.len() > 10 {
            return None;
        }

        let mut picture_id = 0u64;
        for b in &self.bit_string {
            picture_id = (picture_id << 7) | (b & 0x7F) as u64;
        }
        Some(picture_id)
    }

    fn fci_size(&self) -> usize {
        let l = RPSI_FCI_HEADER_LENGTH + self.bit_string.len();
        l + get_padding_size(l)
    }
}

impl fmt::Display for ReferencePictureSelectionIndication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReferencePictureSelectionIndication {:x} {:x} pt={} {:?}",
            self.sender_ssrc, self.media_ssrc, self.payload_type, self.bit_string
        )
    }
}

impl Packet for ReferencePictureSelectionIndication {
    /// Header returns the Header associated with this packet.
    fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_RPSI,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: ((self.marshal_size() / 4) - 1) as u16,
        }
    }

    /// destination_ssrc returns an array of SSRC values that this packet refers to.
    fn destination_ssrc(&self) -> Vec<u32> {
        vec![self.media_ssrc]
    }

    fn raw_size(&self) -> usize {
        HEADER_LENGTH + RPSI_OFFSET + self.fci_size()
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn equal(&self, other: &dyn Packet) -> bool {
        other
            .as_any()
            .downcast_ref::<ReferencePictureSelectionIndication>()
            .is_some_and(|a| self == a)
    }

    fn cloned(&self) -> Box<dyn Packet> {
        Box::new(self.clone())
    }
}

impl MarshalSize for ReferencePictureSelectionIndication {
    fn marshal_size(&self) -> usize {
        self.raw_size()
    }
}

impl Marshal for ReferencePictureSelectionIndication {
    /// Marshal encodes the ReferencePictureSelectionIndication in binary
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |      PB       |0| Payload Type|    Native RPSI bit string     |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |   defined per codec          ...                | Padding (0) |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        if buf.remaining_mut() < self.marshal_size() {
            return Err(Error::BufferTooShort);
        }

        let h = self.header();
        let n = h.marshal_to(buf)?;
        buf = &mut buf[n..];

        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);

        let padding_bytes =
            self.fci_size() - RPSI_FCI_HEADER_LENGTH - self.bit_string.len();
        buf.put_u8((padding_bytes * 8) as u8);
        buf.put_u8(self.payload_type & 0x7F);
        buf.put_slice(&self.bit_string);
        for _ in 0..padding_bytes {
            buf.put_u8(0);
        }

        Ok(self.marshal_size())
    }
}

impl Unmarshal for ReferencePictureSelectionIndication {
    /// Unmarshal decodes the ReferencePictureSelectionIndication from binary
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < (HEADER_LENGTH + RPSI_OFFSET + 4) {
            return Err(Error::PacketTooShort);
        }

        let h = Header::unmarshal(raw_packet)?;

        let total = HEADER_LENGTH + 4 * h.length as usize;
        if raw_packet_len < total {
            return Err(Error::PacketTooShort);
        }
        if total < HEADER_LENGTH + RPSI_OFFSET + 4 {
            return Err(Error::HeaderTooSmall);
        }

        if h.packet_type != PacketType::PayloadSpecificFeedback || h.count != FORMAT_RPSI {
            return Err(Error::WrongType);
        }

        let sender_ssrc = raw_packet.get_u32();
        let media_ssrc = raw_packet.get_u32();

        let fci_len = total - HEADER_LENGTH - RPSI_OFFSET;
        let padding_bits = raw_packet.get_u8() as usize;
        let payload_type = raw_packet.get_u8() & 0x7F;
        if padding_bits % 8 != 0 || padding_bits / 8 > fci_len - RPSI_FCI_HEADER_LENGTH {
            return Err(Error::WrongPadding);
        }

        let bit_string_len = fci_len - RPSI_FCI_HEADER_LENGTH - padding_bits / 8;
        let bit_string = raw_packet.copy_to_bytes(bit_string_len);

        if raw_packet.has_remaining() {
            raw_packet.advance(raw_packet.remaining());
        }

        Ok(ReferencePictureSelectionIndication {
            sender_ssrc,
            media_ssrc,
            payload_type,
            bit_string,
        })
    }
}
