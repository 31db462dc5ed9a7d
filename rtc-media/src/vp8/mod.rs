//! VP8 loss resilience.
//!
//! [`Vp8Encoder`] and [`Vp8Decoder`] wrap a codec backend and add the
//! reference-picture bookkeeping that keeps a lossy RTP video stream
//! decodable without a steady supply of key frames:
//!
//! - the encoder alternately refreshes the golden and altref buffers and,
//!   once the receiver acknowledges a refresh through RPSI, answers slice
//!   loss (SLI) with frames that only predict from the acknowledged buffer
//!   ([`ReferenceTracker`]);
//! - the decoder reports which reference frames it decoded cleanly and
//!   asks for a key frame once it has been concealing on top of corrupted
//!   references for too long ([`ErrorPropagationGuard`]).
//!
//! [`feedback`] converts between these signals and RTCP payload-specific
//! feedback.

pub mod decoder;
pub mod encoder;
pub mod feedback;
pub mod propagation;
pub mod reference;

pub use decoder::{DecodeStatus, DecoderEvent, Vp8Decoder};
pub use encoder::{EncodedFrame, Vp8CodecInfo, Vp8Encoder};
pub use feedback::{FeedbackSender, ReferenceFeedback};
pub use propagation::{DEFAULT_ERROR_PROPAGATION_THRESHOLD, ErrorPropagationGuard, PropagationState};
pub use reference::{ReferenceState, ReferenceTracker};
pub use rtcp::payload_feedbacks::slice_loss_indication::SLI_PICTURE_ID_MASK;

use serde::{Deserialize, Serialize};
use shared::error::{Error, Result};

/// Picture ids count modulo this value (15 bits, 0x7FFF itself never used).
pub const PICTURE_ID_MASK: u16 = 0x7FFF;
/// Bits of the picture id compared when matching an RPSI.
pub const RPSI_PICTURE_ID_MASK: u16 = 0x3FFF;
/// Default distance between golden/altref refreshes, in pictures.
pub const DEFAULT_REFERENCE_REFRESH_PERIOD: u16 = 64;
/// RTP video clock.
pub const VP8_CLOCK_RATE: u32 = 90000;

/// VP8 codec configuration shared by encoder and decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vp8Settings {
    pub width: u16,
    pub height: u16,
    pub start_bitrate_kbps: u32,
    /// 0 means no cap
    pub max_bitrate_kbps: u32,
    pub max_framerate: u32,
    pub number_of_cores: u32,
    /// Steer references from RPSI/SLI feedback.
    pub feedback_mode: bool,
    /// The receiver asks for key frames with PLI, so the encoder never
    /// inserts them on its own.
    pub picture_loss_indication: bool,
    pub error_propagation_threshold: u32,
    pub reference_refresh_period: u16,
}

impl Default for Vp8Settings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            start_bitrate_kbps: 300,
            max_bitrate_kbps: 0,
            max_framerate: 30,
            number_of_cores: 1,
            feedback_mode: false,
            picture_loss_indication: false,
            error_propagation_threshold: DEFAULT_ERROR_PROPAGATION_THRESHOLD,
            reference_refresh_period: DEFAULT_REFERENCE_REFRESH_PERIOD,
        }
    }
}

impl Vp8Settings {
    pub fn validate(&self) -> Result<()> {
        if self.max_framerate < 1 {
            return Err(Error::ErrCodecInvalidParameter(
                "max_framerate must be at least 1".to_owned(),
            ));
        }
        if self.max_bitrate_kbps > 0 && self.start_bitrate_kbps > self.max_bitrate_kbps {
            return Err(Error::ErrCodecInvalidParameter(format!(
                "start bitrate {} above max bitrate {}",
                self.start_bitrate_kbps, self.max_bitrate_kbps
            )));
        }
        if self.width < 1 || self.height < 1 {
            return Err(Error::ErrCodecInvalidParameter(format!(
                "invalid resolution {}x{}",
                self.width, self.height
            )));
        }
        if self.number_of_cores < 1 {
            return Err(Error::ErrCodecInvalidParameter(
                "number_of_cores must be at least 1".to_owned(),
            ));
        }
        if self.reference_refresh_period < 1 {
            return Err(Error::ErrCodecInvalidParameter(
                "reference_refresh_period must be at least 1".to_owned(),
            ));
        }
        ErrorPropagationGuard::new(self.error_propagation_threshold)?;
        Ok(())
    }

    /// Start bitrate clamped to the cap.
    pub fn target_bitrate_kbps(&self) -> u32 {
        if self.max_bitrate_kbps > 0 {
            self.start_bitrate_kbps.min(self.max_bitrate_kbps)
        } else {
            self.start_bitrate_kbps
        }
    }

    /// Nominal frame duration in 90 kHz ticks.
    pub fn frame_duration(&self) -> u64 {
        u64::from(VP8_CLOCK_RATE / self.max_framerate.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Vp8Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.error_propagation_threshold, 30);
        assert_eq!(settings.reference_refresh_period, 64);
        assert_eq!(settings.frame_duration(), 3000);
    }

    #[test]
    fn test_settings_validation() {
        let cases = [
            Vp8Settings {
                max_framerate: 0,
                ..Default::default()
            },
            Vp8Settings {
                start_bitrate_kbps: 600,
                max_bitrate_kbps: 500,
                ..Default::default()
            },
            Vp8Settings {
                width: 0,
                ..Default::default()
            },
            Vp8Settings {
                height: 0,
                ..Default::default()
            },
            Vp8Settings {
                number_of_cores: 0,
                ..Default::default()
            },
            Vp8Settings {
                reference_refresh_period: 0,
                ..Default::default()
            },
        ];
        for settings in cases {
            assert!(
                matches!(settings.validate(), Err(Error::ErrCodecInvalidParameter(_))),
                "{settings:?}"
            );
        }

        let settings = Vp8Settings {
            error_propagation_threshold: 0,
            ..Default::default()
        };
        assert_eq!(settings.validate(), Err(Error::ErrInvalidThreshold(0)));
    }

    #[test]
    fn test_target_bitrate_clamped() {
        let settings = Vp8Settings {
            start_bitrate_kbps: 800,
            max_bitrate_kbps: 0,
            ..Default::default()
        };
        assert_eq!(settings.target_bitrate_kbps(), 800);

        let settings = Vp8Settings {
            start_bitrate_kbps: 300,
            max_bitrate_kbps: 250,
            ..Default::default()
        };
        assert_eq!(settings.target_bitrate_kbps(), 250);
    }

    #[test]
    fn test_settings_from_json() {
        let settings: Vp8Settings =
            serde_json::from_str(r#"{"width": 1280, "height": 720, "feedback_mode": true}"#)
                .unwrap();
        assert_eq!(settings.width, 1280);
        assert!(settings.feedback_mode);
        assert_eq!(settings.max_framerate, 30);
        settings.validate().unwrap();
    }
}
