use super::{PICTURE_ID_MASK, Vp8Settings};
use crate::codec::{EncodeFlags, EncodedImage, EncoderBackend, EncoderConfig, FrameType, RawFrame};
use crate::vp8::feedback::ReferenceFeedback;
use crate::vp8::reference::ReferenceTracker;
use shared::error::{Error, Result};

/// Per-frame input from the sender: simulcast layer and the feedback that
/// arrived since the previous frame.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Vp8CodecInfo {
    pub simulcast_idx: u8,
    pub feedback: ReferenceFeedback,
}

/// One VP8 frame ready for packetization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub image: EncodedImage,
    pub picture_id: u16,
    /// No reference buffer was updated; losing this frame harms nothing else.
    pub non_reference: bool,
    pub simulcast_idx: u8,
    /// Reference control the backend was asked to apply.
    pub flags: EncodeFlags,
}

/// VP8 encoder with reference-picture selection on top of a codec backend.
pub struct Vp8Encoder<B> {
    backend: B,
    settings: Option<Vp8Settings>,
    tracker: ReferenceTracker,
    pts: u64,
}

impl<B: EncoderBackend> Vp8Encoder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            settings: None,
            tracker: ReferenceTracker::new(super::DEFAULT_REFERENCE_REFRESH_PERIOD, 0),
            pts: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_initialized(&self) -> bool {
        self.settings.is_some()
    }

    pub fn reference_tracker(&self) -> &ReferenceTracker {
        &self.tracker
    }

    /// Configure the backend and restart picture numbering at a random id.
    ///
    /// Re-initializing an initialized encoder releases it first. If the
    /// backend rejects the configuration it is released again and the
    /// encoder stays uninitialized.
    pub fn init_encode(&mut self, settings: &Vp8Settings) -> Result<()> {
        settings.validate()?;
        self.release()?;

        let config = EncoderConfig {
            width: settings.width,
            height: settings.height,
            target_bitrate_kbps: settings.target_bitrate_kbps(),
            max_framerate: settings.max_framerate,
            number_of_cores: settings.number_of_cores,
            timebase: (1, super::VP8_CLOCK_RATE),
            key_frames_on_request: settings.picture_loss_indication,
        };
        if let Err(err) = self.backend.init(&config) {
            log::warn!("vp8 encoder backend init failed: {err}");
            if let Err(release_err) = self.backend.release() {
                log::warn!("vp8 encoder backend release failed: {release_err}");
            }
            return Err(err);
        }

        let picture_id = rand::random::<u16>() % PICTURE_ID_MASK;
        self.tracker = ReferenceTracker::new(settings.reference_refresh_period, picture_id);
        self.pts = 0;
        self.settings = Some(settings.clone());
        log::debug!(
            "vp8 encoder {}x{} @{} kbps, first picture id {}",
            settings.width,
            settings.height,
            config.target_bitrate_kbps,
            picture_id
        );
        Ok(())
    }

    /// Encode one frame.
    ///
    /// A key frame is produced when `frame_type` asks for one or the feedback
    /// carries a picture loss indication. Reference selection is only applied
    /// in feedback mode and only when `codec_info` is present.
    ///
    /// Returns `Ok(None)` when the backend dropped the frame; the picture id
    /// only advances for frames actually produced.
    pub fn encode(
        &mut self,
        frame: &RawFrame,
        codec_info: Option<&Vp8CodecInfo>,
        frame_type: FrameType,
    ) -> Result<Option<EncodedFrame>> {
        let Some(settings) = self.settings.as_ref() else {
            return Err(Error::ErrCodecUninitialized);
        };
        if frame.data.is_empty() {
            return Err(Error::ErrCodecInvalidParameter("empty frame".to_owned()));
        }

        let key_frame = frame_type == FrameType::Key
            || codec_info.is_some_and(|info| info.feedback.key_frame_requested);
        let flags = if key_frame {
            self.tracker.on_key_frame()
        } else if let Some(info) = codec_info
            && settings.feedback_mode
        {
            self.tracker.on_delta_frame(&info.feedback)
        } else {
            EncodeFlags::NONE
        };

        let duration = settings.frame_duration();
        let (width, height) = (settings.width, settings.height);
        let out = self.backend.encode(frame, self.pts, duration, flags)?;
        self.pts += duration;

        let Some(out) = out else {
            log::trace!("vp8 frame at {} dropped by backend", frame.timestamp);
            return Ok(None);
        };

        let picture_id = self.tracker.advance();
        Ok(Some(EncodedFrame {
            image: EncodedImage {
                data: out.data,
                timestamp: frame.timestamp,
                frame_type: if out.key_frame {
                    FrameType::Key
                } else {
                    FrameType::Delta
                },
                complete_frame: true,
                encoded_width: width,
                encoded_height: height,
            },
            picture_id,
            non_reference: out.droppable,
            simulcast_idx: codec_info.map_or(0, |info| info.simulcast_idx),
            flags,
        }))
    }

    /// Update rate control. The bitrate is clamped to the configured cap.
    pub fn set_rates(&mut self, bitrate_kbps: u32, framerate: u32) -> Result<()> {
        let Some(settings) = self.settings.as_mut() else {
            return Err(Error::ErrCodecUninitialized);
        };
        if framerate < 1 {
            return Err(Error::ErrCodecInvalidParameter(
                "framerate must be at least 1".to_owned(),
            ));
        }
        let bitrate_kbps = if settings.max_bitrate_kbps > 0 {
            bitrate_kbps.min(settings.max_bitrate_kbps)
        } else {
            bitrate_kbps
        };
        self.backend.set_rates(bitrate_kbps, framerate)?;
        settings.max_framerate = framerate;
        Ok(())
    }

    /// Tear down the backend. Releasing an uninitialized encoder is a no-op.
    pub fn release(&mut self) -> Result<()> {
        if self.settings.take().is_some() {
            self.backend.release()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BackendFrame;
    use bytes::Bytes;

    #[derive(Default)]
    struct MockBackend {
        config: Option<EncoderConfig>,
        calls: Vec<(u64, u64, EncodeFlags)>,
        rates: Option<(u32, u32)>,
        fail_init: bool,
        drop_next: bool,
        released: usize,
    }

    impl EncoderBackend for MockBackend {
        fn init(&mut self, config: &EncoderConfig) -> Result<()> {
            if self.fail_init {
                return Err(Error::ErrCodecMemory);
            }
            self.config = Some(config.clone());
            Ok(())
        }

        fn encode(
            &mut self,
            _frame: &RawFrame,
            pts: u64,
            duration: u64,
            flags: EncodeFlags,
        ) -> Result<Option<BackendFrame>> {
            self.calls.push((pts, duration, flags));
            if std::mem::take(&mut self.drop_next) {
                return Ok(None);
            }
            Ok(Some(BackendFrame {
                data: Bytes::from_static(&[0x9D, 0x01, 0x2A]),
                key_frame: flags.contains(EncodeFlags::FORCE_KF),
                droppable: flags.contains(EncodeFlags::NO_UPD_GF | EncodeFlags::NO_UPD_ARF),
            }))
        }

        fn set_rates(&mut self, bitrate_kbps: u32, framerate: u32) -> Result<()> {
            self.rates = Some((bitrate_kbps, framerate));
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            self.config = None;
            self.released += 1;
            Ok(())
        }
    }

    fn raw_frame(timestamp: u32) -> RawFrame {
        RawFrame {
            width: 640,
            height: 480,
            timestamp,
            data: Bytes::from(vec![0x80; 16]),
        }
    }

    #[test]
    fn test_encode_requires_init() {
        let mut encoder = Vp8Encoder::new(MockBackend::default());
        assert_eq!(
            encoder.encode(&raw_frame(0), None, FrameType::Key),
            Err(Error::ErrCodecUninitialized)
        );
        assert_eq!(encoder.set_rates(100, 30), Err(Error::ErrCodecUninitialized));
        encoder.release().unwrap();
        assert_eq!(encoder.backend().released, 0);
    }

    #[test]
    fn test_init_encode_configures_backend() {
        let mut encoder = Vp8Encoder::new(MockBackend::default());
        encoder
            .init_encode(&Vp8Settings {
                start_bitrate_kbps: 500,
                max_bitrate_kbps: 800,
                picture_loss_indication: true,
                ..Default::default()
            })
            .unwrap();
        assert!(encoder.is_initialized());
        assert!(encoder.reference_tracker().picture_id() < PICTURE_ID_MASK);

        let config = encoder.backend().config.clone().unwrap();
        assert_eq!(config.target_bitrate_kbps, 500);
        assert_eq!(config.timebase, (1, 90000));
        assert!(config.key_frames_on_request);
    }

    #[test]
    fn test_init_failure_leaves_encoder_uninitialized() {
        let mut encoder = Vp8Encoder::new(MockBackend {
            fail_init: true,
            ..Default::default()
        });
        assert_eq!(
            encoder.init_encode(&Vp8Settings::default()),
            Err(Error::ErrCodecMemory)
        );
        assert!(!encoder.is_initialized());
        assert_eq!(encoder.backend().released, 1);

        let invalid = Vp8Settings {
            max_framerate: 0,
            ..Default::default()
        };
        assert!(matches!(
            encoder.init_encode(&invalid),
            Err(Error::ErrCodecInvalidParameter(_))
        ));
    }

    #[test]
    fn test_picture_id_advances_per_produced_frame() {
        let mut encoder = Vp8Encoder::new(MockBackend::default());
        encoder.init_encode(&Vp8Settings::default()).unwrap();
        let first = encoder.reference_tracker().picture_id();

        let key = encoder
            .encode(&raw_frame(0), None, FrameType::Key)
            .unwrap()
            .unwrap();
        assert_eq!(key.picture_id, first);
        assert_eq!(key.image.frame_type, FrameType::Key);
        assert_eq!(key.flags, EncodeFlags::FORCE_KF);

        encoder.backend_mut().drop_next = true;
        assert!(
            encoder
                .encode(&raw_frame(3000), None, FrameType::Delta)
                .unwrap()
                .is_none()
        );

        let delta = encoder
            .encode(&raw_frame(6000), None, FrameType::Delta)
            .unwrap()
            .unwrap();
        assert_eq!(delta.picture_id, (first + 1) % PICTURE_ID_MASK);
        assert_eq!(delta.image.frame_type, FrameType::Delta);
        assert_eq!(delta.image.timestamp, 6000);
        // outside feedback mode references are left to the backend
        assert_eq!(delta.flags, EncodeFlags::NONE);

        let pts: Vec<(u64, u64)> = encoder
            .backend()
            .calls
            .iter()
            .map(|(pts, duration, _)| (*pts, *duration))
            .collect();
        assert_eq!(pts, vec![(0, 3000), (3000, 3000), (6000, 3000)]);
    }

    #[test]
    fn test_picture_loss_forces_key_frame() {
        let mut encoder = Vp8Encoder::new(MockBackend::default());
        encoder
            .init_encode(&Vp8Settings {
                feedback_mode: true,
                ..Default::default()
            })
            .unwrap();

        let info = Vp8CodecInfo {
            simulcast_idx: 2,
            feedback: ReferenceFeedback {
                key_frame_requested: true,
                ..Default::default()
            },
        };
        let frame = encoder
            .encode(&raw_frame(0), Some(&info), FrameType::Delta)
            .unwrap()
            .unwrap();
        assert_eq!(frame.image.frame_type, FrameType::Key);
        assert_eq!(frame.simulcast_idx, 2);
        assert_eq!(
            encoder.reference_tracker().state().picture_id_last_sent_ref,
            frame.picture_id
        );
    }

    #[test]
    fn test_feedback_mode_marks_non_reference_frames() {
        let mut encoder = Vp8Encoder::new(MockBackend::default());
        encoder
            .init_encode(&Vp8Settings {
                feedback_mode: true,
                reference_refresh_period: 4,
                ..Default::default()
            })
            .unwrap();

        let info = Vp8CodecInfo::default();
        let mut refreshes = 0;
        for i in 0..8u32 {
            let frame = encoder
                .encode(&raw_frame(i * 3000), Some(&info), FrameType::Delta)
                .unwrap()
                .unwrap();
            if frame.picture_id % 4 == 0 {
                refreshes += 1;
                assert!(!frame.non_reference);
                assert!(frame.flags.contains(EncodeFlags::NO_REF_LAST));
            } else {
                assert!(frame.non_reference);
            }
        }
        // three when the 15-bit picture id wraps inside the run
        assert!((2..=3).contains(&refreshes));
    }

    #[test]
    fn test_set_rates_clamps_to_max() {
        let mut encoder = Vp8Encoder::new(MockBackend::default());
        encoder
            .init_encode(&Vp8Settings {
                start_bitrate_kbps: 300,
                max_bitrate_kbps: 1000,
                ..Default::default()
            })
            .unwrap();

        encoder.set_rates(2500, 15).unwrap();
        assert_eq!(encoder.backend().rates, Some((1000, 15)));

        encoder.encode(&raw_frame(0), None, FrameType::Key).unwrap();
        assert_eq!(encoder.backend().calls[0].1, 6000);

        assert!(matches!(
            encoder.set_rates(100, 0),
            Err(Error::ErrCodecInvalidParameter(_))
        ));
    }

    #[test]
    fn test_release_tears_down_backend() {
        let mut encoder = Vp8Encoder::new(MockBackend::default());
        encoder.init_encode(&Vp8Settings::default()).unwrap();
        encoder.init_encode(&Vp8Settings::default()).unwrap();
        assert_eq!(encoder.backend().released, 1);

        encoder.release().unwrap();
        assert!(!encoder.is_initialized());
        assert_eq!(encoder.backend().released, 2);
        assert_eq!(
            encoder.encode(&raw_frame(0), None, FrameType::Key),
            Err(Error::ErrCodecUninitialized)
        );
    }
}
