use super::Vp8Settings;
use crate::codec::{DecodedImage, DecoderBackend, EncodedImage, FrameType};
use crate::vp8::propagation::ErrorPropagationGuard;
use shared::error::{Error, Result};
use std::collections::VecDeque;

/// Notifications produced while decoding, drained with
/// [`Vp8Decoder::poll_event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    /// A picture is ready for rendering.
    DecodedFrame(DecodedImage),
    /// A golden or altref buffer was refreshed by a frame that arrived
    /// complete with nothing missing before it. Worth an RPSI.
    ReceivedDecodedReferenceFrame(u16),
    /// Any frame carrying a picture id was decoded.
    ReceivedDecodedFrame(u16),
    /// The frame identified here, if known, could not be decoded cleanly.
    SliceLossRequested(Option<u16>),
    /// Loss has propagated for too long; only a key frame helps now.
    KeyFrameRequested,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    Decoded,
    /// The backend accepted the input but produced no picture.
    NoOutput,
}

/// VP8 decoder that tracks loss propagation and reports decoded references.
pub struct Vp8Decoder<B> {
    backend: B,
    settings: Option<Vp8Settings>,
    guard: ErrorPropagationGuard,
    last_key_frame: Option<EncodedImage>,
    events: VecDeque<DecoderEvent>,
}

impl<B: DecoderBackend> Vp8Decoder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            settings: None,
            guard: ErrorPropagationGuard::default(),
            last_key_frame: None,
            events: VecDeque::new(),
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

    pub fn propagation_guard(&self) -> &ErrorPropagationGuard {
        &self.guard
    }

    /// Copy of the last key frame passed to [`decode`](Self::decode).
    pub fn last_key_frame(&self) -> Option<&EncodedImage> {
        self.last_key_frame.as_ref()
    }

    pub fn init_decode(&mut self, settings: &Vp8Settings) -> Result<()> {
        let guard = ErrorPropagationGuard::new(settings.error_propagation_threshold)?;
        if settings.number_of_cores < 1 {
            return Err(Error::ErrCodecInvalidParameter(
                "number_of_cores must be at least 1".to_owned(),
            ));
        }
        self.release()?;

        if let Err(err) = self.backend.init(settings.number_of_cores) {
            log::warn!("vp8 decoder backend init failed: {err}");
            if let Err(release_err) = self.backend.release() {
                log::warn!("vp8 decoder backend release failed: {release_err}");
            }
            return Err(err);
        }

        self.guard = guard;
        self.settings = Some(settings.clone());
        Ok(())
    }

    /// Decode one frame.
    ///
    /// `missing_frames` reports that frames were lost before this one and
    /// `picture_id` is the VP8 picture id from the payload descriptor, when
    /// present.
    ///
    /// Errors:
    /// - [`Error::ErrCodecRequestSli`] in feedback mode for an incomplete
    ///   frame (not decoded) or a picture the backend had to conceal
    /// - [`Error::ErrKeyFrameRequest`] once loss has propagated past the
    ///   configured threshold
    /// - backend failures as returned by the backend
    pub fn decode(
        &mut self,
        image: &EncodedImage,
        missing_frames: bool,
        picture_id: Option<u16>,
    ) -> Result<DecodeStatus> {
        let Some(settings) = self.settings.as_ref() else {
            return Err(Error::ErrCodecUninitialized);
        };
        let feedback_mode = settings.feedback_mode;

        if !image.complete_frame && feedback_mode {
            self.events
                .push_back(DecoderEvent::SliceLossRequested(picture_id));
            return Err(Error::ErrCodecRequestSli);
        }

        let key_frame = image.frame_type == FrameType::Key;
        self.guard.begin_frame(
            key_frame && image.complete_frame,
            !image.complete_frame || missing_frames,
        );

        let out = match self.backend.decode(&image.data, missing_frames) {
            Ok(out) => out,
            Err(err) => {
                log::debug!("vp8 decode of frame at {} failed: {err}", image.timestamp);
                self.guard.on_local_error();
                return Err(err);
            }
        };

        if key_frame {
            self.last_key_frame = Some(image.clone());
        }

        let Some(decoded) = out.image else {
            return Ok(DecodeStatus::NoOutput);
        };
        self.events.push_back(DecoderEvent::DecodedFrame(decoded));

        if let Some(picture_id) = picture_id {
            let updates = out.reference_updates;
            if (updates.golden || updates.altref) && !missing_frames && image.complete_frame {
                self.events
                    .push_back(DecoderEvent::ReceivedDecodedReferenceFrame(picture_id));
            }
            self.events
                .push_back(DecoderEvent::ReceivedDecodedFrame(picture_id));
        }

        if out.corrupted && feedback_mode {
            self.events
                .push_back(DecoderEvent::SliceLossRequested(picture_id));
            return Err(Error::ErrCodecRequestSli);
        }

        if let Err(err) = self.guard.finish_frame() {
            self.events.push_back(DecoderEvent::KeyFrameRequested);
            return Err(err);
        }
        Ok(DecodeStatus::Decoded)
    }

    pub fn poll_event(&mut self) -> Option<DecoderEvent> {
        self.events.pop_front()
    }

    /// Restart the backend and forget any loss episode. The stored key frame
    /// survives.
    pub fn reset(&mut self) -> Result<()> {
        let Some(settings) = self.settings.as_ref() else {
            return Err(Error::ErrCodecUninitialized);
        };
        let number_of_cores = settings.number_of_cores;
        self.backend.release()?;
        if let Err(err) = self.backend.init(number_of_cores) {
            self.settings = None;
            return Err(err);
        }
        self.guard.reset();
        self.events.clear();
        Ok(())
    }

    /// Tear down the backend and drop all state. Releasing an uninitialized
    /// decoder is a no-op.
    pub fn release(&mut self) -> Result<()> {
        self.last_key_frame = None;
        self.events.clear();
        self.guard.reset();
        if self.settings.take().is_some() {
            self.backend.release()?;
        }
        Ok(())
    }
}
