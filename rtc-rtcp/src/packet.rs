use std::any::Any;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};
use shared::marshal::{Marshal, Unmarshal};

use crate::header::*;
use crate::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use crate::payload_feedbacks::reference_picture_selection_indication::ReferencePictureSelectionIndication;
use crate::payload_feedbacks::slice_loss_indication::SliceLossIndication;
use crate::raw_packet::RawPacket;
use crate::receiver_report::ReceiverReport;
use crate::transport_feedbacks::transport_layer_nack::TransportLayerNack;

/// Packet represents an RTCP packet, a protocol used for out-of-band statistics and control information for an RTP session
pub trait Packet: Marshal + Unmarshal + fmt::Display + fmt::Debug + Send + Sync {
    fn header(&self) -> Header;
    fn destination_ssrc(&self) -> Vec<u32>;
    fn raw_size(&self) -> usize;
    fn as_any(&self) -> &(dyn Any + Send + Sync);
    fn equal(&self, other: &dyn Packet) -> bool;
    fn cloned(&self) -> Box<dyn Packet>;
}

impl PartialEq for dyn Packet {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Clone for Box<dyn Packet> {
    fn clone(&self) -> Box<dyn Packet> {
        self.cloned()
    }
}

/// marshal takes an array of Packets and serializes them to a single buffer
pub fn marshal(packets: &[Box<dyn Packet>]) -> Result<Bytes> {
    let mut out = BytesMut::new();
    for p in packets {
        let data = p.marshal()?;
        out.put(data);
    }
    Ok(out.freeze())
}

/// Unmarshal takes an entire udp datagram (which may consist of multiple RTCP packets) and
/// returns the unmarshaled packets it contains.
///
/// If this is a reduced-size RTCP packet a feedback packet (Goodbye, SliceLossIndication, etc)
/// will be returned. Otherwise, the underlying type of the returned packet will be
/// ReceiverReport or one of the feedback types. Packet types this crate does not model
/// come back as [`RawPacket`].
pub fn unmarshal<B>(raw_data: &mut B) -> Result<Vec<Box<dyn Packet>>>
where
    B: Buf,
{
    let mut packets = vec![];

    while raw_data.has_remaining() {
        let p = unmarshaller(raw_data)?;
        packets.push(p);
    }

    match packets.len() {
        // Empty packet
        0 => Err(Error::InvalidHeader),
        // Multiple packets
        _ => Ok(packets),
    }
}

/// unmarshaller is a factory which pulls the first RTCP packet from a bytestream,
/// and returns it's parsed representation, and the amount of data that was processed.
pub(crate) fn unmarshaller<B>(raw_data: &mut B) -> Result<Box<dyn Packet>>
where
    B: Buf,
{
    let h = Header::unmarshal(raw_data)?;

    let length = (h.length as usize) * 4;
    if length > raw_data.remaining() {
        return Err(Error::PacketTooShort);
    }

    let mut in_packet = h.marshal()?.chain(raw_data.take(length));

    let p: Box<dyn Packet> = match h.packet_type {
        PacketType::ReceiverReport => Box::new(ReceiverReport::unmarshal(&mut in_packet)?),
        PacketType::TransportSpecificFeedback => match h.count {
            FORMAT_TLN => Box::new(TransportLayerNack::unmarshal(&mut in_packet)?),
            _ => Box::new(RawPacket::unmarshal(&mut in_packet)?),
        },
        PacketType::PayloadSpecificFeedback => match h.count {
            FORMAT_PLI => Box::new(PictureLossIndication::unmarshal(&mut in_packet)?),
            FORMAT_SLI => Box::new(SliceLossIndication::unmarshal(&mut in_packet)?),
            FORMAT_RPSI => Box::new(ReferencePictureSelectionIndication::unmarshal(
                &mut in_packet,
            )?),
            _ => Box::new(RawPacket::unmarshal(&mut in_packet)?),
        },
        _ => Box::new(RawPacket::unmarshal(&mut in_packet)?),
    };

    // drain whatever the concrete type did not consume
    if in_packet.has_remaining() {
        in_packet.advance(in_packet.remaining());
    }

    Ok(p)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::payload_feedbacks::slice_loss_indication::SliEntry;
    use crate::reception_report::ReceptionReport;
    use crate::transport_feedbacks::transport_layer_nack::NackPair;

    #[test]
    fn test_packet_unmarshal() -> Result<()> {
        let mut data = Bytes::from_static(&[
            0x81, 0xc9, 0x0, 0x7, // v=2, p=0, count=1, RR, len=7
            0x90, 0x2f, 0x9e, 0x2e, // ssrc=0x902f9e2e
            0xbc, 0x5e, 0x9a, 0x40, // ssrc=0xbc5e9a40
            0x0, 0x0, 0x0, 0x0, // fracLost=0, totalLost=0
            0x0, 0x0, 0x46, 0xe1, // lastSeq=0x46e1
            0x0, 0x0, 0x1, 0x11, // jitter=273
            0x9, 0xf3, 0x64, 0x32, // lsr=0x9f36432
            0x0, 0x2, 0x4a, 0x79, // delay=150137
            0x81, 0xce, 0x0, 0x2, // Picture Loss Indication
            0x90, 0x2f, 0x9e, 0x2e, // sender=0x902f9e2e
            0x90, 0x2f, 0x9e, 0x2e, // media=0x902f9e2e
            0x81, 0xcd, 0x0, 0x3, // Generic NACK
            0x90, 0x2f, 0x9e, 0x2e, // sender=0x902f9e2e
            0x00, 0x00, 0x0d, 0x80, // media=3456
            0x09, 0x29, 0x00, 0x05, // pid=2345, blp=0b101
            0x82, 0xce, 0x0, 0x3, // Slice Loss Indication
            0x90, 0x2f, 0x9e, 0x2e, // sender=0x902f9e2e
            0x00, 0x00, 0x0d, 0x80, // media=3456
            0x00, 0x08, 0x00, 0x45, // first=1, number=1, picture=5
            0x81, 0xcc, 0x0, 0x1, // APP, kept raw
            0x61, 0x62, 0x63, 0x64,
        ]);

        let packets = unmarshal(&mut data)?;

        let expected: Vec<Box<dyn Packet>> = vec![
            Box::new(ReceiverReport {
                ssrc: 0x902f9e2e,
                reports: vec![ReceptionReport {
                    ssrc: 0xbc5e9a40,
                    fraction_lost: 0,
                    total_lost: 0,
                    last_sequence_number: 0x46e1,
                    jitter: 273,
                    last_sender_report: 0x9f36432,
                    delay: 150137,
                }],
                ..Default::default()
            }),
            Box::new(PictureLossIndication {
                sender_ssrc: 0x902f9e2e,
                media_ssrc: 0x902f9e2e,
            }),
            Box::new(TransportLayerNack {
                sender_ssrc: 0x902f9e2e,
                media_ssrc: 3456,
                nacks: vec![NackPair {
                    packet_id: 2345,
                    lost_packets: 0b101,
                }],
            }),
            Box::new(SliceLossIndication {
                sender_ssrc: 0x902f9e2e,
                media_ssrc: 3456,
                sli_entries: vec![SliEntry {
                    first: 1,
                    number: 1,
                    picture: 5,
                }],
            }),
            Box::new(RawPacket(Bytes::from_static(&[
                0x81, 0xcc, 0x0, 0x1, 0x61, 0x62, 0x63, 0x64,
            ]))),
        ];

        assert!(packets == expected, "Invalid packets: {packets:?}");

        let raw = marshal(&packets)?;
        let again = unmarshal(&mut raw.clone())?;
        assert!(again == expected);

        Ok(())
    }

    #[test]
    fn test_packet_unmarshal_empty() {
        let result = unmarshal(&mut Bytes::new());
        assert_eq!(result.unwrap_err(), Error::InvalidHeader);
    }

    #[test]
    fn test_packet_invalid_header_length() {
        let mut data = Bytes::from_static(&[
            // Goodbye (offset=84)
            0x81, 0xcb, 0x0, 0x64,
        ]);

        let result = unmarshal(&mut data);
        assert_eq!(result.unwrap_err(), Error::PacketTooShort);
    }
}
