//! Per-SSRC receive statistics (RFC 3550 appendix A.3 and A.8).

use rtcp::reception_report::{MAX_TOTAL_LOST, ReceptionReport};
use shared::sequence::is_newer_sequence_number;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Clock rate assumed for streams that were never bound.
pub(crate) const DEFAULT_CLOCK_RATE: u32 = 90000;
/// A statistician is active while it has received a packet this recently.
pub(crate) const STATISTICIAN_TIMEOUT: Duration = Duration::from_secs(2);
const BITRATE_WINDOW: Duration = Duration::from_secs(1);
/// Inter-arrival deltas above 5 s at 90 kHz are clock jumps, not jitter.
const MAX_JITTER_SAMPLE: i64 = 450_000;
/// Packets this far behind the highest sequence number are reordered, not a restart.
const MAX_MISORDER: u16 = 100;

/// Snapshot of the reception quality of one stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStatistics {
    /// Highest sequence number received, extended with the wrap count in the upper 16 bits.
    pub extended_max_sequence_number: u32,
    /// Packets lost since reception started, clamped to 24 bits.
    pub cumulative_lost: u32,
    /// Fraction lost since the last reset, as an 8-bit fixed point number.
    pub fraction_lost: u8,
    /// Interarrival jitter in timestamp units.
    pub jitter: u32,
    pub max_jitter: u32,
    /// Bits received in the second before the query.
    pub bitrate_received: u32,
}

/// Running statistics for one remote SSRC.
#[derive(Debug)]
pub struct StreamStatistician {
    ssrc: u32,
    clock_rate: u32,

    started: bool,
    /// Extended sequence number of the first packet of the current numbering.
    base_seq: u64,
    max_seq: u16,
    /// Wrap count shifted into the upper 16 bits.
    cycles: u32,
    /// Sequence number that would confirm a jump to a new numbering.
    bad_seq: Option<u16>,

    packets_received: u64,
    /// `packets_received` when the current numbering started.
    received_base: u64,
    packets_retransmitted: u64,
    bytes_received: u64,

    /// Jitter in 1/16 timestamp units.
    jitter_q4: u32,
    max_jitter: u32,
    /// Arrival of the last packet that moved the jitter estimate forward.
    jitter_receive_time: Option<Instant>,
    last_timestamp: u32,
    last_receive_time: Option<Instant>,

    expected_prior: u64,
    received_prior: u64,

    bitrate_window: VecDeque<(Instant, usize)>,
    bytes_in_window: usize,
}

impl StreamStatistician {
    pub fn new(ssrc: u32, clock_rate: u32) -> Self {
        Self {
            ssrc,
            clock_rate,
            started: false,
            base_seq: 0,
            max_seq: 0,
            cycles: 0,
            bad_seq: None,
            packets_received: 0,
            received_base: 0,
            packets_retransmitted: 0,
            bytes_received: 0,
            jitter_q4: 0,
            max_jitter: 0,
            jitter_receive_time: None,
            last_timestamp: 0,
            last_receive_time: None,
            expected_prior: 0,
            received_prior: 0,
            bitrate_window: VecDeque::new(),
            bytes_in_window: 0,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Returns true if `seq` would advance the highest sequence number seen.
    pub fn is_packet_in_order(&self, seq: u16) -> bool {
        !self.started || is_newer_sequence_number(seq, self.max_seq)
    }

    /// Records one received packet.
    ///
    /// Jitter is only sampled from in-order packets that are not retransmissions,
    /// so recovered packets do not skew it.
    ///
    /// Two consecutive packets far behind the highest sequence number mean the
    /// sender restarted its numbering (RFC 3550 A.1). Loss accounting then
    /// restarts from the second of them.
    pub fn incoming_packet(
        &mut self,
        now: Instant,
        header: &rtp::Header,
        byte_length: usize,
        retransmitted: bool,
        in_order: bool,
    ) {
        let seq = header.sequence_number;

        self.packets_received += 1;
        self.bytes_received += byte_length as u64;
        if retransmitted {
            self.packets_retransmitted += 1;
        }
        self.update_bitrate(now, byte_length);
        self.last_receive_time = Some(now);

        if !self.started {
            self.started = true;
            self.max_seq = seq;
            self.restart_numbering(now, header.timestamp);
            return;
        }

        if !in_order {
            if !retransmitted && self.max_seq.wrapping_sub(seq) > MAX_MISORDER {
                if self.bad_seq == Some(seq) {
                    log::debug!(
                        "receive statistics: ssrc={} sequence number jumped to {seq}, resyncing",
                        self.ssrc
                    );
                    if seq < self.max_seq {
                        self.cycles = self.cycles.wrapping_add(1 << 16);
                    }
                    self.max_seq = seq;
                    self.restart_numbering(now, header.timestamp);
                } else {
                    self.bad_seq = Some(seq.wrapping_add(1));
                }
            }
            return;
        }
        self.bad_seq = None;

        if seq < self.max_seq {
            self.cycles = self.cycles.wrapping_add(1 << 16);
        }
        self.max_seq = seq;

        if !retransmitted && header.timestamp != self.last_timestamp {
            self.update_jitter(now, header.timestamp);
        }
        self.jitter_receive_time = Some(now);
        self.last_timestamp = header.timestamp;
    }

    /// Starts loss accounting over at the current highest sequence number,
    /// whose packet has already been counted.
    fn restart_numbering(&mut self, now: Instant, timestamp: u32) {
        self.base_seq = self.extended_max_sequence_number() as u64;
        self.bad_seq = None;
        self.received_base = self.packets_received - 1;
        self.expected_prior = 0;
        self.received_prior = 0;
        self.jitter_receive_time = Some(now);
        self.last_timestamp = timestamp;
    }

    fn update_jitter(&mut self, now: Instant, timestamp: u32) {
        let Some(jitter_receive_time) = self.jitter_receive_time else {
            return;
        };

        let receive_diff = now.saturating_duration_since(jitter_receive_time).as_micros() as i64
            * self.clock_rate as i64
            / 1_000_000;
        let timestamp_diff = timestamp.wrapping_sub(self.last_timestamp) as i32 as i64;
        let d = (receive_diff - timestamp_diff).abs();

        if d < MAX_JITTER_SAMPLE {
            let jitter_q4 = self.jitter_q4 as i64 + (((d << 4) - self.jitter_q4 as i64 + 8) >> 4);
            self.jitter_q4 = jitter_q4.max(0) as u32;
            self.max_jitter = self.max_jitter.max(self.jitter_q4 >> 4);
        }
    }

    fn update_bitrate(&mut self, now: Instant, byte_length: usize) {
        self.bitrate_window.push_back((now, byte_length));
        self.bytes_in_window += byte_length;
        self.evict_bitrate_window(now);
    }

    fn evict_bitrate_window(&mut self, now: Instant) {
        while let Some(&(at, len)) = self.bitrate_window.front()
            && now.saturating_duration_since(at) >= BITRATE_WINDOW
        {
            self.bitrate_window.pop_front();
            self.bytes_in_window -= len;
        }
    }

    pub fn extended_max_sequence_number(&self) -> u32 {
        self.cycles | self.max_seq as u32
    }

    fn expected(&self) -> u64 {
        if !self.started {
            return 0;
        }
        let extended_max = self.extended_max_sequence_number() as u64;
        (extended_max + 1).saturating_sub(self.base_seq)
    }

    /// Computes the statistics as of `now`.
    ///
    /// With `reset`, the interval used for `fraction_lost` restarts here;
    /// cumulative values are unaffected.
    pub fn get_statistics(&mut self, now: Instant, reset: bool) -> StreamStatistics {
        self.evict_bitrate_window(now);

        let expected = self.expected();
        let received = self.packets_received - self.received_base;

        let cumulative_lost =
            (expected as i64 - received as i64).clamp(0, MAX_TOTAL_LOST as i64) as u32;

        let expected_interval = expected.saturating_sub(self.expected_prior);
        let received_interval = received.saturating_sub(self.received_prior);
        let lost_interval = expected_interval as i64 - received_interval as i64;
        let fraction_lost = if expected_interval == 0 || lost_interval <= 0 {
            0
        } else {
            ((lost_interval << 8) / expected_interval as i64).min(255) as u8
        };

        if reset {
            self.expected_prior = expected;
            self.received_prior = received;
        }

        StreamStatistics {
            extended_max_sequence_number: self.extended_max_sequence_number(),
            cumulative_lost,
            fraction_lost,
            jitter: self.jitter_q4 >> 4,
            max_jitter: self.max_jitter,
            bitrate_received: (self.bytes_in_window * 8) as u32,
        }
    }

    /// Returns (bytes received, packets received).
    pub fn data_counters(&self) -> (u64, u64) {
        (self.bytes_received, self.packets_received)
    }

    pub fn packets_retransmitted(&self) -> u64 {
        self.packets_retransmitted
    }

    pub fn last_receive_time(&self) -> Option<Instant> {
        self.last_receive_time
    }

    /// Forgets everything received so far, as if the stream had just been created.
    pub fn reset_statistics(&mut self) {
        *self = Self::new(self.ssrc, self.clock_rate);
    }

    /// Builds a reception report block and starts a new reporting interval.
    pub(crate) fn reception_report(&mut self, now: Instant) -> ReceptionReport {
        let stats = self.get_statistics(now, true);
        ReceptionReport {
            ssrc: self.ssrc,
            fraction_lost: stats.fraction_lost,
            total_lost: stats.cumulative_lost,
            last_sequence_number: stats.extended_max_sequence_number,
            jitter: stats.jitter,
            last_sender_report: 0,
            delay: 0,
        }
    }
}

/// Receive statistics for every remote SSRC.
#[derive(Debug, Default)]
pub struct ReceiveStatistics {
    statisticians: HashMap<u32, StreamStatistician>,
    clock_rates: HashMap<u32, u32>,
}

impl ReceiveStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the RTP clock rate used for jitter of `ssrc`.
    ///
    /// Takes effect when the statistician is created by its first packet.
    pub fn set_clock_rate(&mut self, ssrc: u32, clock_rate: u32) {
        self.clock_rates.insert(ssrc, clock_rate);
    }

    pub fn incoming_packet(
        &mut self,
        now: Instant,
        header: &rtp::Header,
        byte_length: usize,
        retransmitted: bool,
    ) {
        let ssrc = header.ssrc;
        let statistician = self.statisticians.entry(ssrc).or_insert_with(|| {
            let clock_rate = self
                .clock_rates
                .get(&ssrc)
                .copied()
                .unwrap_or(DEFAULT_CLOCK_RATE);
            log::debug!("receive statistics: new statistician ssrc={ssrc} clock_rate={clock_rate}");
            StreamStatistician::new(ssrc, clock_rate)
        });

        let in_order = statistician.is_packet_in_order(header.sequence_number);
        statistician.incoming_packet(now, header, byte_length, retransmitted, in_order);
    }

    pub fn statistician(&self, ssrc: u32) -> Option<&StreamStatistician> {
        self.statisticians.get(&ssrc)
    }

    pub fn statistician_mut(&mut self, ssrc: u32) -> Option<&mut StreamStatistician> {
        self.statisticians.get_mut(&ssrc)
    }

    /// SSRCs that received a packet within the last two seconds, in ascending order.
    pub fn active_statisticians(&self, now: Instant) -> Vec<u32> {
        let mut active: Vec<u32> = self
            .statisticians
            .values()
            .filter(|s| {
                s.last_receive_time()
                    .is_some_and(|t| now.saturating_duration_since(t) < STATISTICIAN_TIMEOUT)
            })
            .map(StreamStatistician::ssrc)
            .collect();
        active.sort_unstable();
        active
    }

    pub fn reset_statistics(&mut self) {
        for statistician in self.statisticians.values_mut() {
            statistician.reset_statistics();
        }
    }

    /// Drops all state kept for `ssrc`.
    pub fn remove(&mut self, ssrc: u32) {
        self.statisticians.remove(&ssrc);
        self.clock_rates.remove(&ssrc);
    }

    pub fn clear(&mut self) {
        self.statisticians.clear();
        self.clock_rates.clear();
    }
}
