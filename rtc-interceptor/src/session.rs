//! RTP Session - a thread-safe driver around one interceptor chain.
//!
//! Interceptors are plain sans-IO state machines. [`RtpSession`] puts one chain
//! behind a single mutex so packets can be sent and received from whatever
//! thread owns the socket, while an external timer calls [`RtpSession::process`].
//!
//! The lock is held only while the chain is called and its queues are drained.
//! Outbound packets (media, retransmissions, RTCP feedback) are handed to the
//! [`Transport`] after the lock is released, so a transport may call back into
//! the session without deadlocking.

use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use shared::error::{Error, Result, flatten_errs};
use std::sync::Mutex;
use std::time::Instant;

/// Network side of an [`RtpSession`].
///
/// Implemented by whatever owns the socket. Calls are synchronous and made
/// without any session lock held.
pub trait Transport {
    /// Put one RTP packet or RTCP compound packet on the wire.
    fn send(&self, pkt: &Packet) -> Result<()>;
}

/// Thread-safe owner of an interceptor chain and its transport.
///
/// # Example
///
/// ```ignore
/// use rtc_interceptor::{NackGeneratorBuilder, NackResponderBuilder, Registry, RtpSession};
///
/// let chain = Registry::new()
///     .with(NackGeneratorBuilder::new().build())
///     .with(NackResponderBuilder::new().build())
///     .build();
/// let session = RtpSession::new(chain, my_transport);
///
/// session.bind_local_stream(&info)?;
/// session.send(Instant::now(), rtp_packet)?;
/// let delivered = session.receive(Instant::now(), incoming)?;
/// session.process(Instant::now())?;
/// ```
pub struct RtpSession<I, T> {
    chain: Mutex<Option<I>>,
    transport: T,
}

impl<I: Interceptor, T: Transport> RtpSession<I, T> {
    pub fn new(chain: I, transport: T) -> Self {
        Self {
            chain: Mutex::new(Some(chain)),
            transport,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send an outgoing RTP packet through the chain.
    pub fn send(&self, now: Instant, pkt: rtp::Packet) -> Result<()> {
        let outbound = self.with_chain(|chain| {
            chain.handle_write(TaggedPacket::new(now, Packet::Rtp(pkt)))?;
            Ok(drain_writes(chain))
        })?;
        self.flush(outbound)
    }

    /// Feed a packet received from the network through the chain.
    ///
    /// Returns the packets that made it out of the chain for the application.
    /// Anything the chain produced in response, e.g. retransmissions for an
    /// incoming NACK, is sent before returning.
    pub fn receive(&self, now: Instant, pkt: Packet) -> Result<Vec<Packet>> {
        let (inbound, outbound) = self.with_chain(|chain| {
            chain.handle_read(TaggedPacket::new(now, pkt))?;

            let mut inbound = vec![];
            while let Some(msg) = chain.poll_read() {
                inbound.push(msg.message);
            }
            Ok((inbound, drain_writes(chain)))
        })?;

        self.flush(outbound)?;
        Ok(inbound)
    }

    /// Periodic tick: runs timers (NACK generation, receiver reports) and sends
    /// whatever they produced.
    pub fn process(&self, now: Instant) -> Result<()> {
        let outbound = self.with_chain(|chain| {
            chain.handle_timeout(now)?;
            Ok(drain_writes(chain))
        })?;
        self.flush(outbound)
    }

    /// Earliest time [`process`](Self::process) needs to be called again.
    pub fn poll_timeout(&self) -> Result<Option<Instant>> {
        self.with_chain(|chain| Ok(chain.poll_timeout()))
    }

    pub fn bind_local_stream(&self, info: &StreamInfo) -> Result<()> {
        self.with_chain(|chain| {
            chain.bind_local_stream(info);
            Ok(())
        })
    }

    pub fn unbind_local_stream(&self, info: &StreamInfo) -> Result<()> {
        self.with_chain(|chain| {
            chain.unbind_local_stream(info);
            Ok(())
        })
    }

    pub fn bind_remote_stream(&self, info: &StreamInfo) -> Result<()> {
        self.with_chain(|chain| {
            chain.bind_remote_stream(info);
            Ok(())
        })
    }

    pub fn unbind_remote_stream(&self, info: &StreamInfo) -> Result<()> {
        self.with_chain(|chain| {
            chain.unbind_remote_stream(info);
            Ok(())
        })
    }

    /// Tear down the chain, discarding buffered packets and pending
    /// retransmissions. Every later call returns [`Error::ErrClosed`].
    pub fn close(&self) -> Result<()> {
        let chain = self.chain.lock()?.take();
        match chain {
            Some(mut chain) => {
                log::debug!("closing rtp session");
                chain.close()
            }
            None => Err(Error::ErrClosed),
        }
    }

    pub fn is_closed(&self) -> Result<bool> {
        Ok(self.chain.lock()?.is_none())
    }

    fn with_chain<R>(&self, f: impl FnOnce(&mut I) -> Result<R>) -> Result<R> {
        let mut guard = self.chain.lock()?;
        let chain = guard.as_mut().ok_or(Error::ErrClosed)?;
        f(chain)
    }

    fn flush(&self, outbound: Vec<Packet>) -> Result<()> {
        let errs: Vec<Error> = outbound
            .iter()
            .filter_map(|pkt| self.transport.send(pkt).err())
            .collect();
        if !errs.is_empty() {
            log::warn!("transport failed to send {} packets", errs.len());
        }
        flatten_errs(errs)
    }
}

fn drain_writes<I: Interceptor>(chain: &mut I) -> Vec<Packet> {
    let mut outbound = vec![];
    while let Some(msg) = chain.poll_write() {
        outbound.push(msg.message);
    }
    outbound
}
