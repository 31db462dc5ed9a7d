use std::fmt;

use bytes::{Buf, Bytes};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::header::Header;

/// Packet represents an RTP Packet
///
/// `is_retransmission` is local bookkeeping: it is set on packets re-sent in answer
/// to a NACK and on packets recovered from an RTX stream. It never appears on the
/// wire and is false for anything produced by [`Unmarshal`].
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
    pub is_retransmission: bool,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = "RTP PACKET:\n".to_string();

        out += format!("\tVersion: {}\n", self.header.version).as_str();
        out += format!("\tMarker: {}\n", self.header.marker).as_str();
        out += format!("\tPayload Type: {}\n", self.header.payload_type).as_str();
        out += format!("\tSequence Number: {}\n", self.header.sequence_number).as_str();
        out += format!("\tTimestamp: {}\n", self.header.timestamp).as_str();
        out += format!("\tSSRC: {} ({:x})\n", self.header.ssrc, self.header.ssrc).as_str();
        out += format!("\tPayload Length: {}\n", self.payload.len()).as_str();
        if self.is_retransmission {
            out += "\tRetransmission\n";
        }

        write!(f, "{out}")
    }
}

impl Unmarshal for Packet {
    /// Unmarshal parses the passed byte slice and stores the result in the Packet.
    ///
    /// Trailing padding is stripped and the padding bit cleared, so the returned
    /// packet re-marshals without padding.
    fn unmarshal<B>(raw_packet: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut header = Header::unmarshal(raw_packet)?;
        let payload_len = raw_packet.remaining();
        let mut payload = raw_packet.copy_to_bytes(payload_len);
        if header.padding {
            if payload_len == 0 {
                return Err(Error::ErrInvalidPaddingSize);
            }
            let padding_len = payload[payload_len - 1] as usize;
            if padding_len == 0 || padding_len > payload_len {
                return Err(Error::ErrInvalidPaddingSize);
            }
            payload.truncate(payload_len - padding_len);
            header.padding = false;
        }

        Ok(Packet {
            header,
            payload,
            is_retransmission: false,
        })
    }
}

impl MarshalSize for Packet {
    /// MarshalSize returns the size of the packet once marshaled.
    fn marshal_size(&self) -> usize {
        self.header.marshal_size() + self.payload.len()
    }
}

impl Marshal for Packet {
    /// MarshalTo serializes the packet and writes to the buffer.
    fn marshal_to(&self, buf: &mut [u8]) -> Result<usize> {
        if self.header.padding {
            return Err(Error::ErrInvalidPaddingSize);
        }
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::ErrBufferTooSmall);
        }

        let n = self.header.marshal_to(buf)?;
        buf[n..size].copy_from_slice(&self.payload);

        Ok(size)
    }
}
