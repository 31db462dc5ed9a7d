use shared::error::{Error, Result};

/// Default number of consecutive lossy decodes tolerated before a key frame
/// is requested.
pub const DEFAULT_ERROR_PROPAGATION_THRESHOLD: u32 = 30;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PropagationState {
    /// The last complete key frame was decoded without loss since.
    Clean,
    /// Frames decoded since the loss episode began.
    Propagating(u32),
}

/// Bounds how long the decoder keeps concealing on top of corrupted
/// references.
///
/// Every decode after an incomplete or missing frame extends the loss episode
/// until a complete key frame arrives. Once the episode exceeds the threshold
/// the guard asks for a key frame and restarts counting from zero, not from
/// clean, so it does not fire again before that key frame shows up.
#[derive(Debug, Clone)]
pub struct ErrorPropagationGuard {
    // -1 while clean
    count: i64,
    threshold: u32,
}

impl Default for ErrorPropagationGuard {
    fn default() -> Self {
        Self {
            count: -1,
            threshold: DEFAULT_ERROR_PROPAGATION_THRESHOLD,
        }
    }
}

impl ErrorPropagationGuard {
    pub fn new(threshold: u32) -> Result<Self> {
        if threshold == 0 || threshold > i32::MAX as u32 {
            return Err(Error::ErrInvalidThreshold(threshold as i32));
        }
        Ok(Self {
            count: -1,
            threshold,
        })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn state(&self) -> PropagationState {
        if self.count < 0 {
            PropagationState::Clean
        } else {
            PropagationState::Propagating(self.count as u32)
        }
    }

    /// Record a frame about to be decoded.
    pub fn begin_frame(&mut self, complete_key_frame: bool, lossy: bool) {
        if complete_key_frame {
            self.count = -1;
        } else if lossy && self.count == -1 {
            self.count = 0;
        }
        if self.count >= 0 {
            self.count += 1;
        }
    }

    /// The codec library failed on the last frame; assume corruption.
    pub fn on_local_error(&mut self) {
        if self.count > 0 {
            self.count = 0;
        }
    }

    /// Check the episode length after a frame was decoded.
    ///
    /// Returns [`Error::ErrKeyFrameRequest`] once the threshold is exceeded.
    pub fn finish_frame(&mut self) -> Result<()> {
        if self.count > i64::from(self.threshold) {
            log::warn!(
                "{} frames decoded on corrupted references, requesting key frame",
                self.count
            );
            self.count = 0;
            return Err(Error::ErrKeyFrameRequest);
        }
        Ok(())
    }

    /// [`begin_frame`](Self::begin_frame) followed by
    /// [`finish_frame`](Self::finish_frame) for a frame that decoded fine.
    pub fn observe(&mut self, complete_key_frame: bool, lossy: bool) -> Result<()> {
        self.begin_frame(complete_key_frame, lossy);
        self.finish_frame()
    }

    pub fn reset(&mut self) {
        self.count = -1;
    }
}
