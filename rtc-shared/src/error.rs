#![allow(dead_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    #[error("session closed")]
    ErrClosed,
    #[error("mutex poison: {0}")]
    PoisonError(String),
    #[error("invalid size {0}: must be within the supported range")]
    ErrInvalidSize(usize),
    #[error("invalid threshold {0}")]
    ErrInvalidThreshold(i32),

    //RTCP errors
    /// Packet lost exceeds maximum amount of packets
    /// that can possibly be lost.
    #[error("Invalid total lost count")]
    InvalidTotalLost,
    /// Packet contains an invalid header.
    #[error("Invalid header")]
    InvalidHeader,
    /// Too many reports.
    #[error("Too many reports")]
    TooManyReports,
    /// Packet received is too short.
    #[error("Packet too short to be read")]
    PacketTooShort,
    /// Buffer is too short.
    #[error("Buffer too short to be written")]
    BufferTooShort,
    /// Wrong packet type.
    #[error("Wrong packet type")]
    WrongType,
    /// Invalid packet version.
    #[error("Invalid packet version")]
    BadVersion,
    /// Invalid padding value.
    #[error("Invalid padding value")]
    WrongPadding,
    /// Header length is too small.
    #[error("Header length is too small")]
    HeaderTooSmall,

    //RTP errors
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    ErrHeaderSizeInsufficientForExtension,
    #[error("buffer too small")]
    ErrBufferTooSmall,
    #[error("too many CSRC entries")]
    ErrTooManyCsrc,
    #[error("extension_payload must be in 32-bit words")]
    HeaderExtensionPayloadNot32BitWords,
    #[error("invalid padding size")]
    ErrInvalidPaddingSize,

    //RTX errors
    #[error("rtx payload too short to carry the original sequence number")]
    ErrRtxPayloadTooShort,

    //Codec errors
    #[error("codec is not initialized")]
    ErrCodecUninitialized,
    #[error("invalid codec parameter: {0}")]
    ErrCodecInvalidParameter(String),
    #[error("codec memory allocation failed")]
    ErrCodecMemory,
    #[error("codec backend failure: {0}")]
    ErrCodecBackend(String),
    #[error("incomplete frame, slice loss indication requested")]
    ErrCodecRequestSli,
    #[error("error propagation exceeded, key frame requested")]
    ErrKeyFrameRequest,

    #[error("{0}")]
    Other(String),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Error::PoisonError(e.to_string())
    }
}

/// flatten_errs flattens multiple errors into one
pub fn flatten_errs(errs: Vec<impl Into<Error>>) -> Result<()> {
    if errs.is_empty() {
        Ok(())
    } else {
        let errs_strs: Vec<String> = errs.into_iter().map(|e| e.into().to_string()).collect();
        Err(Error::Other(errs_strs.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_errs() {
        assert!(flatten_errs(Vec::<Error>::new()).is_ok());

        let err = flatten_errs(vec![Error::ErrClosed, Error::ErrRtxPayloadTooShort]).unwrap_err();
        assert_eq!(
            err,
            Error::Other(
                "session closed\nrtx payload too short to carry the original sequence number"
                    .to_owned()
            )
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::ErrInvalidSize(0).to_string(),
            "invalid size 0: must be within the supported range"
        );
        assert_eq!(
            Error::ErrCodecBackend("vpx_codec_encode".to_owned()).to_string(),
            "codec backend failure: vpx_codec_encode"
        );
        assert_ne!(Error::ErrClosed, Error::Other("session closed".to_owned()));
    }

    #[test]
    fn test_poison_error_conversion() {
        let lock = std::sync::Arc::new(std::sync::Mutex::new(0u32));
        let l2 = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = l2.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err: Error = lock.lock().unwrap_err().into();
        assert!(matches!(err, Error::PoisonError(_)));
    }
}
