use bytes::{Buf, BufMut, Bytes};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

pub const HEADER_LENGTH: usize = 4;
pub const VERSION_SHIFT: u8 = 6;
pub const VERSION_MASK: u8 = 0x3;
pub const PADDING_SHIFT: u8 = 5;
pub const PADDING_MASK: u8 = 0x1;
pub const EXTENSION_SHIFT: u8 = 4;
pub const EXTENSION_MASK: u8 = 0x1;
pub const CC_MASK: u8 = 0xF;
pub const MARKER_SHIFT: u8 = 7;
pub const MARKER_MASK: u8 = 0x1;
pub const PT_MASK: u8 = 0x7F;
pub const CSRC_OFFSET: usize = 12;
pub const CSRC_LENGTH: usize = 4;
pub const EXTENSION_HEADER_LENGTH: usize = 4;

/// Header represents an RTP packet header.
///
/// Header extensions are carried as an opaque block of 32-bit words; nothing in
/// the loss recovery path needs to look inside them.
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension_profile: u16,
    pub extension_payload: Bytes,
}

impl Unmarshal for Header {
    /// Unmarshal parses the passed byte slice and stores the result in the Header
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let raw_packet_len = raw_packet.remaining();
        if raw_packet_len < HEADER_LENGTH {
            return Err(Error::ErrHeaderSizeInsufficient);
        }
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P|X|  CC   |M|     PT      |       sequence number         |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                           timestamp                           |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |           synchronization source (SSRC) identifier            |
         * +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
         * |            contributing source (CSRC) identifiers             |
         * |                             ....                              |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        let b0 = raw_packet.get_u8();
        let version = (b0 >> VERSION_SHIFT) & VERSION_MASK;
        let padding = ((b0 >> PADDING_SHIFT) & PADDING_MASK) > 0;
        let extension = ((b0 >> EXTENSION_SHIFT) & EXTENSION_MASK) > 0;
        let cc = (b0 & CC_MASK) as usize;

        let curr_offset = CSRC_OFFSET + (cc * CSRC_LENGTH);
        if raw_packet_len < curr_offset {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        let b1 = raw_packet.get_u8();
        let marker = ((b1 >> MARKER_SHIFT) & MARKER_MASK) > 0;
        let payload_type = b1 & PT_MASK;

        let sequence_number = raw_packet.get_u16();
        let timestamp = raw_packet.get_u32();
        let ssrc = raw_packet.get_u32();

        let mut csrc = Vec::with_capacity(cc);
        for _ in 0..cc {
            csrc.push(raw_packet.get_u32());
        }

        let (extension_profile, extension_payload) = if extension {
            if raw_packet.remaining() < EXTENSION_HEADER_LENGTH {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            let extension_profile = raw_packet.get_u16();
            let extension_length = raw_packet.get_u16() as usize * 4;
            if raw_packet.remaining() < extension_length {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            (extension_profile, raw_packet.copy_to_bytes(extension_length))
        } else {
            (0, Bytes::new())
        };

        Ok(Header {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_profile,
            extension_payload,
        })
    }
}

impl MarshalSize for Header {
    /// MarshalSize returns the size of the header once marshaled.
    fn marshal_size(&self) -> usize {
        let mut head_size = CSRC_OFFSET + (self.csrc.len() * CSRC_LENGTH);
        if self.extension {
            head_size += EXTENSION_HEADER_LENGTH + self.extension_payload.len();
        }
        head_size
    }
}

impl Marshal for Header {
    /// Marshal serializes the header and writes to the buffer.
    fn marshal_to(&self, mut buf: &mut [u8]) -> Result<usize> {
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P|X|  CC   |M|     PT      |       sequence number         |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                           timestamp                           |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |           synchronization source (SSRC) identifier            |
         * +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
         * |            contributing source (CSRC) identifiers             |
         * |                             ....                              |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        let remaining_before = buf.remaining_mut();
        if remaining_before < self.marshal_size() {
            return Err(Error::ErrBufferTooSmall);
        }
        if self.csrc.len() > CC_MASK as usize {
            return Err(Error::ErrTooManyCsrc);
        }
        if self.extension && self.extension_payload.len() % 4 != 0 {
            return Err(Error::HeaderExtensionPayloadNot32BitWords);
        }

        // The first byte contains the version, padding bit, extension bit, and csrc size
        let mut b0 = (self.version << VERSION_SHIFT) | self.csrc.len() as u8;
        if self.padding {
            b0 |= 1 << PADDING_SHIFT;
        }
        if self.extension {
            b0 |= 1 << EXTENSION_SHIFT;
        }
        buf.put_u8(b0);

        // The second byte contains the marker bit and payload type.
        let mut b1 = self.payload_type & PT_MASK;
        if self.marker {
            b1 |= 1 << MARKER_SHIFT;
        }
        buf.put_u8(b1);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if self.extension {
            buf.put_u16(self.extension_profile);
            buf.put_u16((self.extension_payload.len() / 4) as u16);
            buf.put_slice(&self.extension_payload);
        }

        Ok(remaining_before - buf.remaining_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_unmarshal() -> Result<()> {
        let mut raw = Bytes::from_static(&[
            0x90, 0xe0, 0x69, 0x8f, // V=2 X=1 M=1 PT=96 seq=27023
            0xd9, 0xc2, 0x93, 0xda, // timestamp
            0x1c, 0x64, 0x27, 0x82, // ssrc
            0x00, 0x01, 0x00, 0x01, // profile=1, length=1
            0xff, 0xff, 0xff, 0xff, // extension payload
            0x98, 0x36, 0xbe, 0x88, // payload starts here
        ]);

        let header = Header::unmarshal(&mut raw)?;
        assert_eq!(header.version, 2);
        assert!(header.marker);
        assert!(header.extension);
        assert!(!header.padding);
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.sequence_number, 27023);
        assert_eq!(header.timestamp, 3653407706);
        assert_eq!(header.ssrc, 476325762);
        assert_eq!(header.extension_profile, 1);
        assert_eq!(&header.extension_payload[..], &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(header.marshal_size(), 20);
        assert_eq!(raw.remaining(), 4);

        Ok(())
    }

    #[test]
    fn test_header_unmarshal_too_short() {
        let mut raw = Bytes::from_static(&[0x80, 0x60, 0x00]);
        assert_eq!(
            Header::unmarshal(&mut raw),
            Err(Error::ErrHeaderSizeInsufficient)
        );

        // cc=2 but no room for the CSRC list
        let mut raw = Bytes::from_static(&[
            0x82, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
        ]);
        assert_eq!(
            Header::unmarshal(&mut raw),
            Err(Error::ErrHeaderSizeInsufficient)
        );

        // extension bit without extension header
        let mut raw = Bytes::from_static(&[
            0x90, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01,
        ]);
        assert_eq!(
            Header::unmarshal(&mut raw),
            Err(Error::ErrHeaderSizeInsufficientForExtension)
        );
    }

    #[test]
    fn test_header_marshal_csrc() -> Result<()> {
        let header = Header {
            version: 2,
            marker: true,
            payload_type: 111,
            sequence_number: 0xFFFF,
            timestamp: 0x01020304,
            ssrc: 0x0a0b0c0d,
            csrc: vec![0x11111111, 0x22222222],
            ..Default::default()
        };

        let raw = header.marshal()?;
        assert_eq!(
            &raw[..],
            &[
                0x82, 0xef, 0xff, 0xff, 0x01, 0x02, 0x03, 0x04, 0x0a, 0x0b, 0x0c, 0x0d, 0x11, 0x11,
                0x11, 0x11, 0x22, 0x22, 0x22, 0x22,
            ]
        );

        let parsed = Header::unmarshal(&mut raw.clone())?;
        assert_eq!(parsed, header);

        Ok(())
    }

    #[test]
    fn test_header_marshal_rejects_unaligned_extension() {
        let header = Header {
            version: 2,
            extension: true,
            extension_profile: 0xBEDE,
            extension_payload: Bytes::from_static(&[1, 2, 3]),
            ..Default::default()
        };
        assert_eq!(
            header.marshal(),
            Err(Error::HeaderExtensionPayloadNot32BitWords)
        );
    }
}
