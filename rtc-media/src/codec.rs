//! Codec backend seam.
//!
//! The VP8 wrappers never touch a bitstream themselves. Compression and
//! decompression are delegated to an [`EncoderBackend`] / [`DecoderBackend`]
//! (libvpx bindings, a hardware codec, or a test double); the wrappers only
//! decide *how* each frame may reference earlier ones and track what the far
//! end has confirmed.

use bytes::Bytes;
use shared::error::Result;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Whether a frame is decodable on its own.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FrameType {
    Key,
    #[default]
    Delta,
}

/// Per-frame reference control handed to the encoder backend.
///
/// The bit values mirror the libvpx `VP8_EFLAG_*` constants so a libvpx
/// backend can pass them through unchanged.
#[derive(Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EncodeFlags(u32);

impl EncodeFlags {
    pub const NONE: EncodeFlags = EncodeFlags(0);
    /// Do not predict from the last frame.
    pub const NO_REF_LAST: EncodeFlags = EncodeFlags(1 << 16);
    /// Do not predict from the golden frame.
    pub const NO_REF_GF: EncodeFlags = EncodeFlags(1 << 17);
    /// Do not update the last frame buffer.
    pub const NO_UPD_LAST: EncodeFlags = EncodeFlags(1 << 18);
    /// Do not update the golden frame buffer.
    pub const NO_UPD_GF: EncodeFlags = EncodeFlags(1 << 22);
    /// Do not update the altref frame buffer.
    pub const NO_UPD_ARF: EncodeFlags = EncodeFlags(1 << 23);
    /// Do not predict from the altref frame.
    pub const NO_REF_ARF: EncodeFlags = EncodeFlags(1 << 21);
    /// Store this frame in the golden buffer.
    pub const FORCE_GF: EncodeFlags = EncodeFlags(1 << 19);
    /// Store this frame in the altref buffer.
    pub const FORCE_ARF: EncodeFlags = EncodeFlags(1 << 24);
    /// Encode a key frame.
    pub const FORCE_KF: EncodeFlags = EncodeFlags(1 << 0);

    pub fn from_bits(bits: u32) -> Self {
        EncodeFlags(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: EncodeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for EncodeFlags {
    type Output = EncodeFlags;

    fn bitor(self, rhs: EncodeFlags) -> EncodeFlags {
        EncodeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for EncodeFlags {
    fn bitor_assign(&mut self, rhs: EncodeFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for EncodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(EncodeFlags, &str); 9] = [
            (EncodeFlags::FORCE_KF, "FORCE_KF"),
            (EncodeFlags::NO_REF_LAST, "NO_REF_LAST"),
            (EncodeFlags::NO_REF_GF, "NO_REF_GF"),
            (EncodeFlags::NO_REF_ARF, "NO_REF_ARF"),
            (EncodeFlags::NO_UPD_LAST, "NO_UPD_LAST"),
            (EncodeFlags::NO_UPD_GF, "NO_UPD_GF"),
            (EncodeFlags::NO_UPD_ARF, "NO_UPD_ARF"),
            (EncodeFlags::FORCE_GF, "FORCE_GF"),
            (EncodeFlags::FORCE_ARF, "FORCE_ARF"),
        ];

        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "EncodeFlags(NONE)")
        } else {
            write!(f, "EncodeFlags({})", set.join(" | "))
        }
    }
}

/// Uncompressed picture handed to the encoder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u16,
    pub height: u16,
    /// RTP timestamp, 90 kHz
    pub timestamp: u32,
    /// I420 planes, back to back
    pub data: Bytes,
}

/// Compressed picture as produced by the encoder or received from the network.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: Bytes,
    pub timestamp: u32,
    pub frame_type: FrameType,
    /// false when the depacketizer could not reassemble every packet of the frame
    pub complete_frame: bool,
    pub encoded_width: u16,
    pub encoded_height: u16,
}

/// Backend parameters derived from `Vp8Settings` at init time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub width: u16,
    pub height: u16,
    pub target_bitrate_kbps: u32,
    pub max_framerate: u32,
    pub number_of_cores: u32,
    /// Time base numerator denominator pair, always 1/90000 for RTP video.
    pub timebase: (u32, u32),
    /// Key frames only on request when feedback or PLI drives recovery.
    pub key_frames_on_request: bool,
}

/// One compressed frame out of an [`EncoderBackend`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackendFrame {
    pub data: Bytes,
    pub key_frame: bool,
    /// The frame updates no reference buffer and may be dropped by the network.
    pub droppable: bool,
}

/// Compression library used by `Vp8Encoder`.
pub trait EncoderBackend {
    fn init(&mut self, config: &EncoderConfig) -> Result<()>;

    /// Compress one frame. `Ok(None)` means the backend dropped the frame,
    /// typically for rate control.
    fn encode(
        &mut self,
        frame: &RawFrame,
        pts: u64,
        duration: u64,
        flags: EncodeFlags,
    ) -> Result<Option<BackendFrame>>;

    fn set_rates(&mut self, bitrate_kbps: u32, framerate: u32) -> Result<()>;

    fn release(&mut self) -> Result<()>;
}

/// Decompressed picture.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u16,
    pub height: u16,
    pub timestamp: u32,
    pub data: Bytes,
}

/// Which reference buffers the last decoded frame refreshed.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ReferenceUpdates {
    pub last: bool,
    pub golden: bool,
    pub altref: bool,
}

/// Result of one [`DecoderBackend::decode`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackendDecode {
    /// `None` when the backend produced no picture for this input.
    pub image: Option<DecodedImage>,
    pub reference_updates: ReferenceUpdates,
    /// The backend concealed errors in the returned picture.
    pub corrupted: bool,
}

/// Decompression library used by `Vp8Decoder`.
pub trait DecoderBackend {
    fn init(&mut self, number_of_cores: u32) -> Result<()>;

    /// Decompress one frame. `missing_frames` tells the backend that frames
    /// were lost before this one so it can conceal instead of predicting from
    /// stale references. An empty `bitstream` asks for full-frame concealment.
    fn decode(&mut self, bitstream: &[u8], missing_frames: bool) -> Result<BackendDecode>;

    fn release(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_flags_combine() {
        let mut flags = EncodeFlags::NO_UPD_GF | EncodeFlags::NO_UPD_ARF;
        assert!(flags.contains(EncodeFlags::NO_UPD_GF));
        assert!(!flags.contains(EncodeFlags::FORCE_KF));

        flags |= EncodeFlags::NO_REF_LAST;
        assert_eq!(
            flags.bits(),
            (1 << 22) | (1 << 23) | (1 << 16),
            "libvpx bit layout"
        );
        assert!(EncodeFlags::default().is_empty());
    }

    #[test]
    fn test_encode_flags_debug() {
        assert_eq!(format!("{:?}", EncodeFlags::NONE), "EncodeFlags(NONE)");
        assert_eq!(
            format!("{:?}", EncodeFlags::FORCE_GF | EncodeFlags::NO_UPD_ARF),
            "EncodeFlags(NO_UPD_ARF | FORCE_GF)"
        );
    }
}
