//! NACK Responder Interceptor - Responds to NACK requests by retransmitting packets.

use super::send_buffer::SendBuffer;
use super::stream_supports_nack;
use crate::rtx::{RtxFramer, RtxMapping};
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;
use serde::{Deserialize, Serialize};
use shared::TransportContext;
use shared::error::Error;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::time::Instant;

/// How buffered packets are sent again.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetransmissionMode {
    /// NACKs are ignored and nothing is buffered.
    Off,
    /// NACKed packets are resent unchanged on the primary SSRC.
    RtpRetransmit,
    /// NACKed packets are resent on the RTX stream. Streams without an RTX
    /// mapping fall back to [`RetransmissionMode::RtpRetransmit`].
    #[default]
    RtxRetransmitted,
    /// Every original packet also gets an RTX shadow copy, whether or not it was
    /// reported lost. NACKed packets are resent as in `RtxRetransmitted`.
    RtxAll,
}

/// Builder for the NackResponderInterceptor.
///
/// # Example
///
/// ```ignore
/// use rtc_interceptor::{Registry, NackResponderBuilder, RetransmissionMode};
///
/// let chain = Registry::new()
///     .with(NackResponderBuilder::new()
///         .with_size(600)
///         .with_retransmission_mode(RetransmissionMode::RtxRetransmitted)
///         .build())
///     .build();
/// ```
pub struct NackResponderBuilder<P> {
    /// Number of sent packets kept for retransmission (1..=32768).
    size: u16,
    mode: RetransmissionMode,
    _phantom: PhantomData<P>,
}

impl<P> Default for NackResponderBuilder<P> {
    fn default() -> Self {
        Self {
            size: 600,
            mode: RetransmissionMode::default(),
            _phantom: PhantomData,
        }
    }
}

impl<P> NackResponderBuilder<P> {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of sent packets kept for retransmission.
    ///
    /// Size must be between 1 and 32768 (inclusive). Larger buffers can
    /// retransmit older packets but use more memory.
    pub fn with_size(mut self, size: u16) -> Self {
        self.size = size;
        self
    }

    pub fn with_retransmission_mode(mut self, mode: RetransmissionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Build the interceptor factory function.
    pub fn build(self) -> impl FnOnce(P) -> NackResponderInterceptor<P> {
        move |inner| NackResponderInterceptor::new(inner, self.size, self.mode)
    }
}

/// Per-stream state for the responder.
struct LocalStream {
    /// Buffer of sent packets for retransmission.
    send_buffer: SendBuffer,
    /// RFC 4588 framing, if the stream has an RTX mapping.
    rtx: Option<RtxFramer>,
}

/// Interceptor that responds to NACK requests by retransmitting packets.
///
/// This interceptor buffers outgoing RTP packets on local streams and
/// retransmits them when RTCP TransportLayerNack packets are received.
/// Requested sequence numbers that are no longer (or were never) buffered
/// are skipped.
pub struct NackResponderInterceptor<P> {
    inner: P,

    size: u16,
    mode: RetransmissionMode,

    /// Send buffers per local stream SSRC
    streams: HashMap<u32, LocalStream>,

    /// Queue for retransmitted packets
    write_queue: VecDeque<TaggedPacket>,

    /// RTX shadow copies, sent after the originals they duplicate
    shadow_queue: VecDeque<TaggedPacket>,
}

impl<P> NackResponderInterceptor<P> {
    fn new(inner: P, size: u16, mode: RetransmissionMode) -> Self {
        Self {
            inner,
            size,
            mode,
            streams: HashMap::new(),
            write_queue: VecDeque::new(),
            shadow_queue: VecDeque::new(),
        }
    }

    /// Handle a NACK request by queuing retransmissions.
    fn handle_nack(&mut self, now: Instant, nack: &TransportLayerNack) {
        if self.mode == RetransmissionMode::Off {
            return;
        }

        let Some(stream) = self.streams.get_mut(&nack.media_ssrc) else {
            return;
        };

        for seq in nack.sequence_numbers() {
            let Some(original) = stream.send_buffer.get(seq) else {
                log::debug!(
                    "nack responder ssrc={} seq={} not in history",
                    nack.media_ssrc,
                    seq
                );
                continue;
            };

            let packet = match (self.mode, stream.rtx.as_mut()) {
                (
                    RetransmissionMode::RtxRetransmitted | RetransmissionMode::RtxAll,
                    Some(framer),
                ) => framer.frame(original),
                _ => {
                    let mut packet = original.clone();
                    packet.is_retransmission = true;
                    packet
                }
            };

            log::trace!(
                "nack responder ssrc={} resending seq={} as ssrc={} seq={}",
                nack.media_ssrc,
                seq,
                packet.header.ssrc,
                packet.header.sequence_number
            );

            self.write_queue.push_back(TaggedPacket {
                now,
                transport: TransportContext::default(),
                message: Packet::Rtp(packet),
            });
        }
    }
}

impl<P: Interceptor> sansio::Protocol<TaggedPacket, TaggedPacket, ()>
    for NackResponderInterceptor<P>
{
    type Rout = TaggedPacket;
    type Wout = TaggedPacket;
    type Eout = ();
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        if let Packet::Rtcp(ref rtcp_packets) = msg.message {
            for rtcp_packet in rtcp_packets {
                if let Some(nack) = rtcp_packet.as_any().downcast_ref::<TransportLayerNack>() {
                    self.handle_nack(msg.now, nack);
                }
            }
        }

        self.inner.handle_read(msg)
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.inner.poll_read()
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        if let Packet::Rtp(ref rtp_packet) = msg.message
            && self.mode != RetransmissionMode::Off
            && let Some(stream) = self.streams.get_mut(&rtp_packet.header.ssrc)
        {
            stream.send_buffer.add(rtp_packet.clone());

            if self.mode == RetransmissionMode::RtxAll
                && let Some(framer) = stream.rtx.as_mut()
            {
                self.shadow_queue.push_back(TaggedPacket {
                    now: msg.now,
                    transport: msg.transport,
                    message: Packet::Rtp(framer.frame(rtp_packet)),
                });
            }
        }

        self.inner.handle_write(msg)
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        // Retransmissions first, then the chain, then shadow copies
        if let Some(pkt) = self.write_queue.pop_front() {
            return Some(pkt);
        }
        if let Some(pkt) = self.inner.poll_write() {
            return Some(pkt);
        }
        self.shadow_queue.pop_front()
    }

    fn handle_event(&mut self, evt: ()) -> Result<(), Self::Error> {
        self.inner.handle_event(evt)
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.inner.poll_event()
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<(), Self::Error> {
        self.inner.handle_timeout(now)
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        self.inner.poll_timeout()
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.streams.clear();
        self.write_queue.clear();
        self.shadow_queue.clear();
        self.inner.close()
    }
}

impl<P: Interceptor> Interceptor for NackResponderInterceptor<P> {
    fn bind_local_stream(&mut self, info: &StreamInfo) {
        let mapping = RtxMapping::from_stream_info(info);
        let wanted = stream_supports_nack(info)
            || (self.mode == RetransmissionMode::RtxAll && mapping.is_some());

        if wanted && self.mode != RetransmissionMode::Off {
            match SendBuffer::new(self.size) {
                Ok(send_buffer) => {
                    self.streams.insert(
                        info.ssrc,
                        LocalStream {
                            send_buffer,
                            rtx: mapping.map(RtxFramer::new),
                        },
                    );
                }
                Err(err) => log::warn!("nack responder not buffering ssrc={}: {}", info.ssrc, err),
            }
        }
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.streams.remove(&info.ssrc);
        self.inner.unbind_local_stream(info);
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_remote_stream(info);
    }
}
