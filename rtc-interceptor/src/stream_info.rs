/// RTCP feedback mechanism negotiated for the stream.
///
/// Specifies additional RTCP packet types that can be used for feedback
/// between peers, such as NACK for retransmissions or PLI for picture loss.
///
/// See: <https://draft.ortc.org/#dom-rtcrtcpfeedback>
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RTCPFeedback {
    /// Type of feedback mechanism.
    ///
    /// Valid values: "ack", "ccm", "nack", "goog-remb", "transport-cc"
    pub typ: String,

    /// Parameter value that depends on the feedback type.
    ///
    /// For example, `typ="nack"` with `parameter="pli"` enables Picture Loss Indicator packets,
    /// `typ="ack"` with `parameter="rpsi"` enables reference picture selection.
    pub parameter: String,
}

impl RTCPFeedback {
    /// Generic NACK feedback (RFC 4585).
    pub fn nack() -> Self {
        Self {
            typ: "nack".to_owned(),
            parameter: String::new(),
        }
    }
}

/// Stream context passed to interceptor bind/unbind callbacks.
///
/// Used by `Interceptor::bind_local_stream()`, `Interceptor::unbind_local_stream()`,
/// `Interceptor::bind_remote_stream()`, and `Interceptor::unbind_remote_stream()`.
///
/// The RTX fields form the stream's [`RtxMapping`](crate::RtxMapping). They are fixed
/// for the lifetime of a binding; changing them means unbinding and binding again,
/// since buffered packets were recorded against the old mapping.
#[derive(Default, Debug, Clone)]
pub struct StreamInfo {
    /// Unique identifier for the stream
    pub id: String,
    /// Synchronization Source identifier (SSRC) of the stream
    pub ssrc: u32,
    /// RTP payload type (e.g., 96 for VP8, 111 for Opus)
    pub payload_type: u8,
    /// SSRC of the RFC 4588 retransmission stream, if negotiated
    pub ssrc_rtx: Option<u32>,
    /// Payload type of the RFC 4588 retransmission stream, if negotiated
    pub payload_type_rtx: Option<u8>,
    /// MIME type of the codec (e.g., "video/VP8", "audio/opus")
    pub mime_type: String,
    /// Clock rate in Hz (e.g., 90000 for video, 48000 for audio)
    pub clock_rate: u32,
    /// RTCP feedback mechanisms negotiated for this stream
    pub rtcp_feedback: Vec<RTCPFeedback>,
}
