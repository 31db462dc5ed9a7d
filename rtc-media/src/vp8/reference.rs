use super::{PICTURE_ID_MASK, RPSI_PICTURE_ID_MASK, SLI_PICTURE_ID_MASK};
use crate::codec::EncodeFlags;
use crate::vp8::feedback::ReferenceFeedback;

/// Snapshot of what the encoder believes the far end holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReferenceState {
    /// 15-bit id of the next picture to be encoded
    pub picture_id: u16,
    /// last picture written into golden/altref (or a key frame)
    pub picture_id_last_sent_ref: u16,
    /// last reference the decoder confirmed through RPSI
    pub picture_id_last_acknowledged_ref: u16,
    pub next_ref_is_golden: bool,
    pub have_received_acknowledgement: bool,
    pub last_acknowledged_is_golden: bool,
}

/// Decides how each VP8 frame may reference earlier pictures.
///
/// Golden and altref buffers are refreshed alternately every
/// `refresh_period` pictures. Once the decoder acknowledges a refresh with an
/// RPSI, the encoder may stop predicting from the stale buffer; an SLI for a
/// picture newer than the last acknowledged reference forces a frame that
/// predicts only from the acknowledged buffer.
///
/// An SLI-triggered refresh and the periodic refresh never share a frame.
/// When both fall on the same picture the SLI refresh wins and the periodic
/// refresh runs on the next picture.
#[derive(Debug, Clone)]
pub struct ReferenceTracker {
    state: ReferenceState,
    refresh_period: u16,
    periodic_refresh_pending: bool,
}

impl ReferenceTracker {
    pub fn new(refresh_period: u16, picture_id: u16) -> Self {
        let picture_id = picture_id % PICTURE_ID_MASK;
        Self {
            state: ReferenceState {
                picture_id,
                picture_id_last_sent_ref: picture_id,
                picture_id_last_acknowledged_ref: picture_id,
                next_ref_is_golden: true,
                have_received_acknowledgement: false,
                last_acknowledged_is_golden: true,
            },
            refresh_period: refresh_period.max(1),
            periodic_refresh_pending: false,
        }
    }

    pub fn state(&self) -> &ReferenceState {
        &self.state
    }

    pub fn picture_id(&self) -> u16 {
        self.state.picture_id
    }

    /// A key frame refreshes every buffer and becomes the last sent reference.
    pub fn on_key_frame(&mut self) -> EncodeFlags {
        self.state.picture_id_last_sent_ref = self.state.picture_id;
        self.periodic_refresh_pending = false;
        EncodeFlags::FORCE_KF
    }

    /// Flags for the next delta frame given the feedback gathered since the
    /// previous one.
    pub fn on_delta_frame(&mut self, feedback: &ReferenceFeedback) -> EncodeFlags {
        let mut flags = EncodeFlags::NONE;

        let sli_refresh = feedback.sli.is_some_and(|sli| self.sli_requires_refresh(sli));
        if sli_refresh {
            log::debug!(
                "vp8 picture {}: slice loss after last acknowledged ref {}, refreshing",
                self.state.picture_id,
                self.state.picture_id_last_acknowledged_ref
            );
            flags |= EncodeFlags::NO_REF_LAST;
            if self.state.have_received_acknowledgement {
                if self.state.last_acknowledged_is_golden {
                    flags |= EncodeFlags::NO_REF_ARF;
                } else {
                    flags |= EncodeFlags::NO_REF_GF;
                }
            }
        }

        if let Some(rpsi) = feedback.rpsi {
            self.on_rpsi(rpsi);
        }

        let periodic = self.state.picture_id % self.refresh_period == 0;
        if sli_refresh {
            if periodic {
                self.periodic_refresh_pending = true;
            }
            flags |= EncodeFlags::NO_UPD_GF | EncodeFlags::NO_UPD_ARF;
        } else if periodic || self.periodic_refresh_pending {
            self.periodic_refresh_pending = false;
            flags |= self.refresh_flags();
            self.state.picture_id_last_sent_ref = self.state.picture_id;
        } else {
            flags |= EncodeFlags::NO_UPD_GF | EncodeFlags::NO_UPD_ARF;
        }

        flags
    }

    /// Move to the next picture id once a frame has actually been produced.
    pub fn advance(&mut self) -> u16 {
        let current = self.state.picture_id;
        self.state.picture_id = (current + 1) % PICTURE_ID_MASK;
        current
    }

    fn refresh_flags(&self) -> EncodeFlags {
        let mut flags = EncodeFlags::NO_REF_LAST;
        if self.state.next_ref_is_golden {
            flags |= EncodeFlags::FORCE_GF | EncodeFlags::NO_UPD_ARF;
            if self.state.have_received_acknowledgement {
                flags |= EncodeFlags::NO_REF_GF;
            }
        } else {
            flags |= EncodeFlags::FORCE_ARF | EncodeFlags::NO_UPD_GF;
            if self.state.have_received_acknowledgement {
                flags |= EncodeFlags::NO_REF_ARF;
            }
        }
        flags
    }

    fn on_rpsi(&mut self, picture_id: u16) {
        if picture_id & RPSI_PICTURE_ID_MASK
            != self.state.picture_id_last_sent_ref & RPSI_PICTURE_ID_MASK
        {
            return;
        }
        log::trace!(
            "vp8 reference {} acknowledged",
            self.state.picture_id_last_sent_ref
        );
        self.state.have_received_acknowledgement = true;
        self.state.last_acknowledged_is_golden = self.state.next_ref_is_golden;
        self.state.next_ref_is_golden = !self.state.next_ref_is_golden;
        self.state.picture_id_last_acknowledged_ref = self.state.picture_id_last_sent_ref;
    }

    /// The lost picture lies after the last acknowledged reference and before
    /// the current picture, compared on the 6 bits an SLI carries.
    fn sli_requires_refresh(&self, sli: u8) -> bool {
        let sli = u16::from(sli & SLI_PICTURE_ID_MASK);
        let acked = self.state.picture_id_last_acknowledged_ref & u16::from(SLI_PICTURE_ID_MASK);
        let current = self.state.picture_id & u16::from(SLI_PICTURE_ID_MASK);
        if acked > current {
            sli > acked || sli < current
        } else {
            sli > acked && sli < current
        }
    }
}
