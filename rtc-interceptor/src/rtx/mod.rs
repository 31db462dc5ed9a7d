//! RTP retransmission payload format (RFC 4588).
//!
//! An RTX packet carries a lost packet on a separate SSRC and payload type. The
//! payload starts with the original sequence number (OSN) in network order,
//! followed by the original payload:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         RTP Header                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            OSN                |                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                               |
//! |                  Original RTP Packet Payload                  |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The RTX stream numbers its packets with its own counter; timestamp, marker,
//! CSRCs and header extensions are copied from the original.

pub(crate) mod receiver;

use bytes::{BufMut, BytesMut};
use shared::error::{Error, Result};

use crate::stream_info::StreamInfo;

/// Length of the original sequence number prefix.
pub const RTX_OSN_LENGTH: usize = 2;

/// Association between a primary stream and its retransmission stream.
///
/// A mapping is fixed for the lifetime of a stream binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtxMapping {
    pub primary_ssrc: u32,
    pub rtx_ssrc: u32,
    pub primary_payload_type: u8,
    pub rtx_payload_type: u8,
}

impl RtxMapping {
    /// Returns the mapping negotiated for a stream, if both RTX fields are set.
    pub fn from_stream_info(info: &StreamInfo) -> Option<Self> {
        match (info.ssrc_rtx, info.payload_type_rtx) {
            (Some(rtx_ssrc), Some(rtx_payload_type)) => Some(Self {
                primary_ssrc: info.ssrc,
                rtx_ssrc,
                primary_payload_type: info.payload_type,
                rtx_payload_type,
            }),
            _ => None,
        }
    }
}

/// Wraps `original` into an RTX packet with the given identity and RTX sequence number.
pub fn frame_as_rtx(
    original: &rtp::Packet,
    rtx_ssrc: u32,
    rtx_payload_type: u8,
    rtx_sequence_number: u16,
) -> rtp::Packet {
    let mut payload = BytesMut::with_capacity(RTX_OSN_LENGTH + original.payload.len());
    payload.put_u16(original.header.sequence_number);
    payload.put_slice(&original.payload);

    let mut header = original.header.clone();
    header.ssrc = rtx_ssrc;
    header.payload_type = rtx_payload_type;
    header.sequence_number = rtx_sequence_number;

    rtp::Packet {
        header,
        payload: payload.freeze(),
        is_retransmission: true,
    }
}

/// Restores the original packet carried by an RTX packet.
///
/// The returned packet is flagged as a retransmission.
pub fn unframe_rtx(
    rtx: &rtp::Packet,
    primary_ssrc: u32,
    primary_payload_type: u8,
) -> Result<rtp::Packet> {
    if rtx.payload.len() < RTX_OSN_LENGTH {
        return Err(Error::ErrRtxPayloadTooShort);
    }

    let mut header = rtx.header.clone();
    header.ssrc = primary_ssrc;
    header.payload_type = primary_payload_type;
    header.sequence_number = u16::from_be_bytes([rtx.payload[0], rtx.payload[1]]);

    Ok(rtp::Packet {
        header,
        payload: rtx.payload.slice(RTX_OSN_LENGTH..),
        is_retransmission: true,
    })
}

/// Frames and unframes packets for one primary/RTX stream pair.
///
/// Owns the RTX stream's sequence counter, which starts at a random value.
#[derive(Debug, Clone)]
pub struct RtxFramer {
    mapping: RtxMapping,
    sequencer: rtp::Sequencer,
}

impl RtxFramer {
    pub fn new(mapping: RtxMapping) -> Self {
        Self::with_sequencer(mapping, rtp::Sequencer::new_random())
    }

    pub fn with_sequencer(mapping: RtxMapping, sequencer: rtp::Sequencer) -> Self {
        Self { mapping, sequencer }
    }

    pub fn mapping(&self) -> &RtxMapping {
        &self.mapping
    }

    /// Builds the RTX copy of `original`, consuming one RTX sequence number.
    pub fn frame(&mut self, original: &rtp::Packet) -> rtp::Packet {
        frame_as_rtx(
            original,
            self.mapping.rtx_ssrc,
            self.mapping.rtx_payload_type,
            self.sequencer.next_sequence_number(),
        )
    }

    pub fn unframe(&self, rtx: &rtp::Packet) -> Result<rtp::Packet> {
        unframe_rtx(
            rtx,
            self.mapping.primary_ssrc,
            self.mapping.primary_payload_type,
        )
    }
}
