//! RTX Receiver Interceptor - Restores original packets from RTX streams.

use super::{RtxMapping, unframe_rtx};
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use shared::error::Error;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Instant;

/// Builder for the RtxReceiverInterceptor.
///
/// The RTX mapping of each remote stream comes from
/// [`StreamInfo::ssrc_rtx`] and [`StreamInfo::payload_type_rtx`].
///
/// ```ignore
/// let chain = Registry::new()
///     .with(NackGeneratorBuilder::new().build())
///     .with(RtxReceiverBuilder::new().build())
///     .build();
/// ```
pub struct RtxReceiverBuilder<P> {
    _phantom: PhantomData<P>,
}

impl<P> Default for RtxReceiverBuilder<P> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<P> RtxReceiverBuilder<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(self) -> impl FnOnce(P) -> RtxReceiverInterceptor<P> {
        RtxReceiverInterceptor::new
    }
}

/// Interceptor that turns incoming RTX packets back into packets of the primary stream.
///
/// It must sit outside the NACK generator and the receiver report interceptor so
/// that a recovered packet fills the hole it was requested for. Packets from an
/// RTX SSRC whose payload cannot hold the original sequence number are rejected
/// with [`Error::ErrRtxPayloadTooShort`] and dropped.
pub struct RtxReceiverInterceptor<P> {
    inner: P,
    /// Mappings keyed by RTX SSRC
    mappings: HashMap<u32, RtxMapping>,
}

impl<P> RtxReceiverInterceptor<P> {
    fn new(inner: P) -> Self {
        Self {
            inner,
            mappings: HashMap::new(),
        }
    }
}

impl<P: Interceptor> sansio::Protocol<TaggedPacket, TaggedPacket, ()>
    for RtxReceiverInterceptor<P>
{
    type Rout = TaggedPacket;
    type Wout = TaggedPacket;
    type Eout = ();
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, mut msg: TaggedPacket) -> Result<(), Self::Error> {
        if let Packet::Rtp(ref rtp_packet) = msg.message
            && let Some(mapping) = self.mappings.get(&rtp_packet.header.ssrc)
        {
            let original = unframe_rtx(
                rtp_packet,
                mapping.primary_ssrc,
                mapping.primary_payload_type,
            )
            .inspect_err(|err| {
                log::warn!(
                    "dropping rtx packet ssrc={} seq={}: {}",
                    rtp_packet.header.ssrc,
                    rtp_packet.header.sequence_number,
                    err
                );
            })?;
            log::trace!(
                "rtx ssrc={} restored seq={} for ssrc={}",
                rtp_packet.header.ssrc,
                original.header.sequence_number,
                original.header.ssrc
            );
            msg.message = Packet::Rtp(original);
        }

        self.inner.handle_read(msg)
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.inner.poll_read()
    }

    fn handle_write(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        self.inner.handle_write(msg)
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.inner.poll_write()
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
        self.mappings.clear();
        self.inner.close()
    }
}

impl<P: Interceptor> Interceptor for RtxReceiverInterceptor<P> {
    fn bind_local_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_local_stream(info);
    }

    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_local_stream(info);
    }

    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        if let Some(mapping) = RtxMapping::from_stream_info(info) {
            self.mappings.insert(mapping.rtx_ssrc, mapping);
        }
        self.inner.bind_remote_stream(info);
    }

    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        if let Some(ssrc_rtx) = info.ssrc_rtx {
            self.mappings.remove(&ssrc_rtx);
        }
        self.inner.unbind_remote_stream(info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Registry;
    use bytes::Bytes;
    use sansio::Protocol;

    fn make_rtp_packet(ssrc: u32, pt: u8, seq: u16, payload: &'static [u8]) -> TaggedPacket {
        TaggedPacket {
            now: Instant::now(),
            transport: Default::default(),
            message: Packet::Rtp(rtp::Packet {
                header: rtp::header::Header {
                    version: 2,
                    ssrc,
                    payload_type: pt,
                    sequence_number: seq,
                    ..Default::default()
                },
                payload: Bytes::from_static(payload),
                ..Default::default()
            }),
        }
    }

    fn rtx_info() -> StreamInfo {
        StreamInfo {
            ssrc: 1234,
            payload_type: 96,
            ssrc_rtx: Some(5678),
            payload_type_rtx: Some(97),
            ..Default::default()
        }
    }

    #[test]
    fn test_rtx_receiver_unframes_bound_stream() {
        let mut chain = Registry::new()
            .with(RtxReceiverBuilder::new().build())
            .build();
        chain.bind_remote_stream(&rtx_info());

        chain
            .handle_read(make_rtp_packet(5678, 97, 1, &[0x01, 0x2C, 0xDE, 0xAD]))
            .unwrap();

        let Some(TaggedPacket {
            message: Packet::Rtp(pkt),
            ..
        }) = chain.poll_read()
        else {
            panic!("Expected RTP packet");
        };
        assert_eq!(pkt.header.ssrc, 1234);
        assert_eq!(pkt.header.payload_type, 96);
        assert_eq!(pkt.header.sequence_number, 300);
        assert_eq!(&pkt.payload[..], &[0xDE, 0xAD]);
        assert!(pkt.is_retransmission);
    }

    #[test]
    fn test_rtx_receiver_passes_primary_stream() {
        let mut chain = Registry::new()
            .with(RtxReceiverBuilder::new().build())
            .build();
        chain.bind_remote_stream(&rtx_info());

        let pkt = make_rtp_packet(1234, 96, 10, &[0x01]);
        let expected = pkt.message.clone();
        chain.handle_read(pkt).unwrap();
        assert_eq!(chain.poll_read().unwrap().message, expected);
    }

    #[test]
    fn test_rtx_receiver_rejects_short_payload() {
        let mut chain = Registry::new()
            .with(RtxReceiverBuilder::new().build())
            .build();
        chain.bind_remote_stream(&rtx_info());

        let result = chain.handle_read(make_rtp_packet(5678, 97, 1, &[0x01]));
        assert_eq!(result, Err(Error::ErrRtxPayloadTooShort));
        assert!(chain.poll_read().is_none());
    }

    #[test]
    fn test_rtx_receiver_unbind_removes_mapping() {
        let mut chain = Registry::new()
            .with(RtxReceiverBuilder::new().build())
            .build();
        chain.bind_remote_stream(&rtx_info());
        assert!(chain.mappings.contains_key(&5678));

        chain.unbind_remote_stream(&rtx_info());
        assert!(chain.mappings.is_empty());

        // without a mapping the packet passes untouched
        chain
            .handle_read(make_rtp_packet(5678, 97, 1, &[0x01]))
            .unwrap();
        assert!(chain.poll_read().is_some());
    }
}
