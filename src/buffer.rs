//! In-memory buffer of the current window's samples

use crate::probe::ProbeOutcome;
use std::time::Duration;
use tracing::debug;

/// Samples taken since the last flush, in append order.
///
/// The buffer is owned by the windowed sampler and only reachable through
/// `&mut self`, so an append can never interleave with a drain.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Vec<ProbeOutcome>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer pre-sized for the number of samples one window is expected to hold
    pub fn for_window(interval: Duration, window: Duration) -> Self {
        let expected = if interval.is_zero() {
            0
        } else {
            (window.as_nanos() / interval.as_nanos()).min(4096) as usize
        };

        Self {
            samples: Vec::with_capacity(expected + 1),
        }
    }

    pub fn append(&mut self, outcome: ProbeOutcome) {
        self.samples.push(outcome);
        debug!("Buffered sample, current size: {}", self.samples.len());
    }

    /// Take everything buffered so far and leave the buffer empty
    pub fn drain_and_reset(&mut self) -> Vec<ProbeOutcome> {
        let capacity = self.samples.capacity();
        std::mem::replace(&mut self.samples, Vec::with_capacity(capacity))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_then_drain() {
        let mut buffer = SampleBuffer::new();
        buffer.append(ProbeOutcome::success(Duration::from_millis(10)));
        buffer.append(ProbeOutcome::failure());
        buffer.append(ProbeOutcome::success(Duration::from_millis(30)));
        assert_eq!(buffer.len(), 3);

        let drained = buffer.drain_and_reset();
        assert_eq!(
            drained,
            vec![
                ProbeOutcome::success(Duration::from_millis(10)),
                ProbeOutcome::failure(),
                ProbeOutcome::success(Duration::from_millis(30)),
            ]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_second_drain_is_empty() {
        let mut buffer = SampleBuffer::new();
        buffer.append(ProbeOutcome::failure());

        assert_eq!(buffer.drain_and_reset().len(), 1);
        assert!(buffer.drain_and_reset().is_empty());
    }

    #[test]
    fn test_for_window_presizes() {
        let buffer = SampleBuffer::for_window(Duration::from_secs(10), Duration::from_secs(60));
        assert!(buffer.samples.capacity() >= 7);
        assert!(buffer.is_empty());
    }
}
