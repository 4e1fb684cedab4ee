//! Circular audio history buffers.

// -------------------------------------------------------------------------------------------------

/// Rolling window over the most recent processed input samples.
///
/// Capacity is a power of two so read and write indices wrap with a mask.
/// The write position only ever advances; grains read backwards from it at
/// arbitrary lookback distances. Until the buffer has been filled past its
/// half-capacity mark once there is no valid history to granulate, which
/// [`HistoryBuffer::is_ready`] reports.
pub struct HistoryBuffer {
    samples: Box<[i16]>,
    write_pos: usize,
    ready: bool,
}

impl HistoryBuffer {
    /// Number of samples of history kept (~743 ms at 44.1 kHz).
    pub const CAPACITY: usize = 32768;
    const MASK: usize = Self::CAPACITY - 1;

    const _VERIFY_CAPACITY: () = assert!(
        Self::CAPACITY.is_power_of_two(),
        "History capacity must be a pow2 value"
    );

    pub fn new() -> Self {
        Self {
            samples: vec![0; Self::CAPACITY].into_boxed_slice(),
            write_pos: 0,
            ready: false,
        }
    }

    /// Append one processed sample and advance the write position.
    #[inline]
    pub fn write(&mut self, sample: i16) {
        self.samples[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) & Self::MASK;
        if !self.ready && self.write_pos > Self::CAPACITY / 2 {
            self.ready = true;
        }
    }

    /// Read the sample at an absolute buffer index.
    #[inline]
    pub fn read(&self, index: usize) -> i16 {
        self.samples[index & Self::MASK]
    }

    /// Buffer index `lookback` samples behind the current write position.
    #[inline]
    pub fn index_back(&self, lookback: usize) -> usize {
        (self.write_pos + Self::CAPACITY - (lookback & Self::MASK)) & Self::MASK
    }

    /// Current write position, for progress visualization.
    #[inline]
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// True once enough history has been recorded to start granulating.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

/// Short delay line for the feedback path, with its own wrapping write
/// position. Read happens at the write position before it, so the delay
/// equals the full line length.
pub struct FeedbackLine {
    samples: Box<[i16]>,
    write_pos: usize,
}

impl FeedbackLine {
    pub const CAPACITY: usize = 512;
    const MASK: usize = Self::CAPACITY - 1;

    pub fn new() -> Self {
        Self {
            samples: vec![0; Self::CAPACITY].into_boxed_slice(),
            write_pos: 0,
        }
    }

    /// The delayed sample about to be overwritten.
    #[inline]
    pub fn read(&self) -> i16 {
        self.samples[self.write_pos]
    }

    /// Overwrite the current slot and advance.
    #[inline]
    pub fn write_and_advance(&mut self, sample: i16) {
        self.samples[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) & Self::MASK;
    }
}

impl Default for FeedbackLine {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookback_reads_behind_the_write_position() {
        let mut history = HistoryBuffer::new();
        for i in 0..20000 {
            history.write((i % 1000) as i16);
        }
        assert_eq!(history.write_pos(), 20000);
        // a grain started with lookback 5000 reads at buffer index 15000
        assert_eq!(history.index_back(5000), 15000);
        assert_eq!(history.read(15000), (15000 % 1000) as i16);
        // a reader is never handed an index ahead of the write position
        for lookback in [1, 100, HistoryBuffer::CAPACITY - 1] {
            let index = history.index_back(lookback);
            let behind = (history.write_pos() + HistoryBuffer::CAPACITY - index)
                & (HistoryBuffer::CAPACITY - 1);
            assert_eq!(behind, lookback);
        }
    }

    #[test]
    fn write_position_wraps() {
        let mut history = HistoryBuffer::new();
        for _ in 0..HistoryBuffer::CAPACITY + 123 {
            history.write(1);
        }
        assert_eq!(history.write_pos(), 123);
        assert_eq!(history.index_back(124), HistoryBuffer::CAPACITY - 1);
    }

    #[test]
    fn ready_after_half_capacity() {
        let mut history = HistoryBuffer::new();
        for _ in 0..HistoryBuffer::CAPACITY / 2 {
            history.write(0);
            assert!(!history.is_ready());
        }
        history.write(0);
        assert!(history.is_ready());
    }

    #[test]
    fn feedback_line_delays_by_its_length() {
        let mut line = FeedbackLine::new();
        for i in 0..FeedbackLine::CAPACITY {
            assert_eq!(line.read(), 0);
            line.write_and_advance(i as i16);
        }
        // one full revolution later the written values come back
        for i in 0..FeedbackLine::CAPACITY {
            assert_eq!(line.read(), i as i16);
            line.write_and_advance(0);
        }
    }
}
