//! Receiver Report Interceptor - Generates RTCP Receiver Reports.

use super::statistician::ReceiveStatistics;
use crate::stream_info::StreamInfo;
use crate::{Interceptor, Packet, TaggedPacket};
use rtcp::header::COUNT_MAX;
use rtcp::receiver_report::ReceiverReport;
use shared::TransportContext;
use shared::error::Error;
use shared::marshal::MarshalSize;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

/// Builder for the ReceiverReportInterceptor.
///
/// # Example
///
/// ```ignore
/// use rtc_interceptor::{Registry, ReceiverReportBuilder};
/// use std::time::Duration;
///
/// // With default interval (1 second)
/// let chain = Registry::new()
///     .with(ReceiverReportBuilder::new().build())
///     .build();
///
/// // With custom interval
/// let chain = Registry::new()
///     .with(ReceiverReportBuilder::new().with_interval(Duration::from_millis(500)).build())
///     .build();
/// ```
pub struct ReceiverReportBuilder<P> {
    /// Interval between receiver reports.
    interval: Duration,
    _phantom: PhantomData<P>,
}

impl<P> Default for ReceiverReportBuilder<P> {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            _phantom: PhantomData,
        }
    }
}

impl<P> ReceiverReportBuilder<P> {
    /// Create a new builder with default settings.
    ///
    /// Default interval is 1 second.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom interval between receiver reports.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Create a builder function for use with Registry.
    pub fn build(self) -> impl FnOnce(P) -> ReceiverReportInterceptor<P> {
        move |inner| ReceiverReportInterceptor::new(inner, self.interval)
    }
}

/// Interceptor that generates RTCP Receiver Reports.
///
/// Every incoming RTP packet updates the [`ReceiveStatistics`] of its SSRC. On
/// each interval one receiver report is emitted carrying a reception report per
/// active stream (split over several reports past 31 streams). Packets that were
/// recovered by retransmission count as received but do not feed jitter.
pub struct ReceiverReportInterceptor<P> {
    inner: P,

    interval: Duration,
    eto: Instant,

    /// SSRC used as the sender of generated reports
    receiver_ssrc: u32,
    statistics: ReceiveStatistics,

    write_queue: VecDeque<TaggedPacket>,
}

impl<P> ReceiverReportInterceptor<P> {
    fn new(inner: P, interval: Duration) -> Self {
        Self {
            inner,

            interval,
            eto: Instant::now(),

            receiver_ssrc: rand::random::<u32>(),
            statistics: ReceiveStatistics::new(),

            write_queue: VecDeque::new(),
        }
    }

    /// Receive statistics gathered so far.
    pub fn statistics(&self) -> &ReceiveStatistics {
        &self.statistics
    }

    pub fn statistics_mut(&mut self) -> &mut ReceiveStatistics {
        &mut self.statistics
    }

    /// Generate receiver reports for all active streams.
    fn generate_reports(&mut self, now: Instant) -> Vec<ReceiverReport> {
        let active = self.statistics.active_statisticians(now);

        let blocks: Vec<_> = active
            .into_iter()
            .filter_map(|ssrc| {
                self.statistics
                    .statistician_mut(ssrc)
                    .map(|statistician| statistician.reception_report(now))
            })
            .collect();

        blocks
            .chunks(COUNT_MAX)
            .map(|reports| ReceiverReport {
                ssrc: self.receiver_ssrc,
                reports: reports.to_vec(),
                ..Default::default()
            })
            .collect()
    }
}

impl<P: Interceptor> sansio::Protocol<TaggedPacket, TaggedPacket, ()>
    for ReceiverReportInterceptor<P>
{
    type Rout = TaggedPacket;
    type Wout = TaggedPacket;
    type Eout = ();
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedPacket) -> Result<(), Self::Error> {
        if let Packet::Rtp(rtp_packet) = &msg.message {
            self.statistics.incoming_packet(
                msg.now,
                &rtp_packet.header,
                rtp_packet.marshal_size(),
                rtp_packet.is_retransmission,
            );
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
        // First drain generated RTCP reports
        if let Some(pkt) = self.write_queue.pop_front() {
            return Some(pkt);
        }
        self.inner.poll_write()
    }

    fn handle_event(&mut self, evt: ()) -> Result<(), Self::Error> {
        self.inner.handle_event(evt)
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.inner.poll_event()
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<(), Self::Error> {
        if self.eto <= now {
            self.eto = now + self.interval;

            for rr in self.generate_reports(now) {
                log::trace!(
                    "receiver report ssrc={} with {} blocks",
                    rr.ssrc,
                    rr.reports.len()
                );
                self.write_queue.push_back(TaggedPacket {
                    now,
                    transport: TransportContext::default(),
                    message: Packet::Rtcp(vec![Box::new(rr)]),
                });
            }
        }

        self.inner.handle_timeout(now)
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        if let Some(eto) = self.inner.poll_timeout()
            && eto < self.eto
        {
            Some(eto)
        } else {
            Some(self.eto)
        }
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.statistics.clear();
        self.write_queue.clear();
        self.inner.close()
    }
}

impl<P: Interceptor> Interceptor for ReceiverReportInterceptor<P> {
    fn bind_local_stream(&mut self, info: &StreamInfo) {
        self.inner.bind_local_stream(info);
    }
    fn unbind_local_stream(&mut self, info: &StreamInfo) {
        self.inner.unbind_local_stream(info);
    }
    fn bind_remote_stream(&mut self, info: &StreamInfo) {
        if info.clock_rate > 0 {
            self.statistics.set_clock_rate(info.ssrc, info.clock_rate);
        }
        self.inner.bind_remote_stream(info);
    }
    fn unbind_remote_stream(&mut self, info: &StreamInfo) {
        self.statistics.remove(info.ssrc);
        self.inner.unbind_remote_stream(info);
    }
}
