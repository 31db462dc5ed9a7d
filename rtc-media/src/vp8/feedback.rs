//! RTCP payload-specific feedback for VP8 reference selection.
//!
//! Receive side: [`ReferenceFeedback::from_rtcp`] collects the RPSI, SLI and
//! PLI messages addressed to one media SSRC into the input the encoder
//! consumes on its next frame.
//!
//! Send side: [`FeedbackSender::feedback_packets`] turns decoder events into
//! the RTCP messages the far-end encoder expects.

use super::{PICTURE_ID_MASK, SLI_PICTURE_ID_MASK};
use crate::vp8::decoder::DecoderEvent;
use rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use rtcp::payload_feedbacks::reference_picture_selection_indication::ReferencePictureSelectionIndication;
use rtcp::payload_feedbacks::slice_loss_indication::{SliEntry, SliceLossIndication};

/// Slice count covering a whole picture in an SLI entry (13 bits).
const SLI_WHOLE_PICTURE: u16 = 0x1FFF;

/// Feedback gathered for one outgoing stream since the last encoded frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ReferenceFeedback {
    /// Picture id the decoder decoded cleanly and holds as a reference
    pub rpsi: Option<u16>,
    /// 6-bit id of a picture the decoder lost
    pub sli: Option<u8>,
    /// The receiver asked for a key frame
    pub key_frame_requested: bool,
}

impl ReferenceFeedback {
    /// Collect feedback for `media_ssrc`. Later messages win over earlier
    /// ones of the same kind.
    pub fn from_rtcp(packets: &[Box<dyn rtcp::Packet>], media_ssrc: u32) -> Self {
        let mut feedback = ReferenceFeedback::default();
        for p in packets {
            feedback.merge_rtcp(p.as_ref(), media_ssrc);
        }
        feedback
    }

    /// Fold one RTCP packet into the collected feedback.
    pub fn merge_rtcp(&mut self, packet: &dyn rtcp::Packet, media_ssrc: u32) {
        let any = packet.as_any();
        if let Some(rpsi) = any.downcast_ref::<ReferencePictureSelectionIndication>() {
            if rpsi.media_ssrc != media_ssrc {
                return;
            }
            match rpsi.picture_id() {
                Some(picture_id) => {
                    self.rpsi = Some((picture_id & u64::from(PICTURE_ID_MASK)) as u16)
                }
                None => log::debug!("rpsi for {media_ssrc:x} carries no vp8 picture id"),
            }
        } else if let Some(sli) = any.downcast_ref::<SliceLossIndication>() {
            if sli.media_ssrc != media_ssrc {
                return;
            }
            if let Some(entry) = sli.sli_entries.last() {
                self.sli = Some(entry.picture & SLI_PICTURE_ID_MASK);
            }
        } else if let Some(pli) = any.downcast_ref::<PictureLossIndication>() {
            if pli.media_ssrc == media_ssrc {
                self.key_frame_requested = true;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rpsi.is_none() && self.sli.is_none() && !self.key_frame_requested
    }
}

/// Builds feedback for one received VP8 stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackSender {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    /// VP8 payload type, carried in RPSI
    pub payload_type: u8,
}

impl FeedbackSender {
    pub fn new(sender_ssrc: u32, media_ssrc: u32, payload_type: u8) -> Self {
        Self {
            sender_ssrc,
            media_ssrc,
            payload_type,
        }
    }

    /// Map decoder events to RTCP feedback.
    ///
    /// - a cleanly decoded reference frame becomes an RPSI
    /// - a slice loss request becomes an SLI, or a PLI when the lost
    ///   picture id is unknown
    /// - a key frame request becomes a PLI
    ///
    /// Other events produce nothing. At most one PLI is emitted per call.
    pub fn feedback_packets(&self, events: &[DecoderEvent]) -> Vec<Box<dyn rtcp::Packet>> {
        let mut packets: Vec<Box<dyn rtcp::Packet>> = vec![];
        let mut pli = false;
        for event in events {
            match event {
                DecoderEvent::ReceivedDecodedReferenceFrame(picture_id) => {
                    packets.push(Box::new(ReferencePictureSelectionIndication::with_picture_id(
                        self.sender_ssrc,
                        self.media_ssrc,
                        self.payload_type,
                        u64::from(*picture_id),
                    )));
                }
                DecoderEvent::SliceLossRequested(Some(picture_id)) => {
                    packets.push(Box::new(SliceLossIndication {
                        sender_ssrc: self.sender_ssrc,
                        media_ssrc: self.media_ssrc,
                        sli_entries: vec![SliEntry {
                            first: 0,
                            number: SLI_WHOLE_PICTURE,
                            picture: (*picture_id as u8) & SLI_PICTURE_ID_MASK,
                        }],
                    }));
                }
                DecoderEvent::SliceLossRequested(None) | DecoderEvent::KeyFrameRequested => {
                    pli = true;
                }
                DecoderEvent::DecodedFrame(_) | DecoderEvent::ReceivedDecodedFrame(_) => {}
            }
        }
        if pli {
            packets.push(Box::new(PictureLossIndication {
                sender_ssrc: self.sender_ssrc,
                media_ssrc: self.media_ssrc,
            }));
        }
        packets
    }
}
