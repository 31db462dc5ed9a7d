/// Sequencer generates sequential sequence numbers for building RTP packets.
#[derive(Debug, Clone)]
pub struct Sequencer {
    next: u16,
    started: bool,
    roll_over_count: u64,
}

impl Sequencer {
    /// Returns a new sequencer starting from a random sequence number.
    pub fn new_random() -> Self {
        Self::new_fixed(rand::random::<u16>())
    }

    /// Returns a new sequencer starting from a specific sequence number.
    pub fn new_fixed(s: u16) -> Self {
        Self {
            next: s,
            started: false,
            roll_over_count: 0,
        }
    }

    /// Returns the next sequence number for building RTP packets.
    pub fn next_sequence_number(&mut self) -> u16 {
        let seq = self.next;
        if seq == 0 && self.started {
            self.roll_over_count += 1;
        }
        self.started = true;
        self.next = seq.wrapping_add(1);
        seq
    }

    /// Returns the amount of times the 16bit sequence number has wrapped.
    pub fn roll_over_count(&self) -> u64 {
        self.roll_over_count
    }
}
