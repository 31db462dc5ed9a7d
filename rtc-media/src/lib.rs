#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! Video codec side of RTP loss recovery.
//!
//! Packet loss that NACK and RTX cannot repair in time reaches the codec as
//! incomplete or missing frames. This crate keeps VP8 usable through that:
//! the encoder steers which reference buffers each frame predicts from using
//! receiver feedback, and the decoder bounds how long it conceals errors
//! before asking for a key frame.
//!
//! Codec libraries plug in through [`codec::EncoderBackend`] and
//! [`codec::DecoderBackend`].

pub mod codec;
pub mod vp8;

pub use codec::{
    BackendDecode, BackendFrame, DecodedImage, DecoderBackend, EncodeFlags, EncodedImage,
    EncoderBackend, EncoderConfig, FrameType, RawFrame, ReferenceUpdates,
};
pub use vp8::{
    DecodeStatus, DecoderEvent, EncodedFrame, ErrorPropagationGuard, FeedbackSender,
    PropagationState, ReferenceFeedback, ReferenceTracker, Vp8CodecInfo, Vp8Decoder, Vp8Encoder,
    Vp8Settings,
};
