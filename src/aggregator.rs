//! Reduction of a window's samples into one summary

use crate::probe::ProbeOutcome;

/// Availability and latency over one window.
///
/// `available_fraction` is `None` for a window without samples.
/// `mean_latency_nanos` is `None` for a window without successful samples,
/// which covers both the empty and the all-failed window.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowSummary {
    /// Flush tick in epoch milliseconds
    pub window_timestamp_millis: i64,
    pub sample_count: usize,
    pub success_count: usize,
    pub available_fraction: Option<f64>,
    pub mean_latency_nanos: Option<f64>,
}

impl WindowSummary {
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

/// Reduce `outcomes` to a summary stamped with the flush tick.
///
/// Failed samples count toward the availability denominator only; their
/// latency is excluded from both the sum and the count of the mean.
pub fn reduce(outcomes: &[ProbeOutcome], window_timestamp_millis: i64) -> WindowSummary {
    let sample_count = outcomes.len();
    let (success_count, latency_sum) = outcomes
        .iter()
        .filter(|outcome| outcome.succeeded)
        .fold((0usize, 0u128), |(count, sum), outcome| {
            (count + 1, sum + u128::from(outcome.latency_nanos))
        });

    let available_fraction =
        (sample_count > 0).then(|| success_count as f64 / sample_count as f64);
    let mean_latency_nanos =
        (success_count > 0).then(|| latency_sum as f64 / success_count as f64);

    WindowSummary {
        window_timestamp_millis,
        sample_count,
        success_count,
        available_fraction,
        mean_latency_nanos,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ok(millis: u64) -> ProbeOutcome {
        ProbeOutcome::success(Duration::from_millis(millis))
    }

    #[test]
    fn test_five_of_six_available() {
        let outcomes = vec![ok(10), ok(20), ProbeOutcome::failure(), ok(30), ok(40), ok(50)];

        let summary = reduce(&outcomes, 1_700_000_060_000);
        assert_eq!(summary.window_timestamp_millis, 1_700_000_060_000);
        assert_eq!(summary.sample_count, 6);
        assert_eq!(summary.success_count, 5);
        assert_eq!(summary.available_fraction, Some(5.0 / 6.0));
        assert_eq!(summary.mean_latency_nanos, Some(30_000_000.0));
    }

    #[test]
    fn test_empty_window() {
        let summary = reduce(&[], 60_000);
        assert!(summary.is_empty());
        assert_eq!(summary.available_fraction, None);
        assert_eq!(summary.mean_latency_nanos, None);
    }

    #[test]
    fn test_all_failed_window() {
        let outcomes = vec![ProbeOutcome::failure(); 6];

        let summary = reduce(&outcomes, 60_000);
        assert_eq!(summary.sample_count, 6);
        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.available_fraction, Some(0.0));
        assert_eq!(summary.mean_latency_nanos, None);
    }

    #[test]
    fn test_all_succeeded_window() {
        let summary = reduce(&[ok(5), ok(15)], 0);
        assert_eq!(summary.available_fraction, Some(1.0));
        assert_eq!(summary.mean_latency_nanos, Some(10_000_000.0));
    }

    #[test]
    fn test_reduce_is_order_insensitive_and_pure() {
        let forward = vec![ok(1), ProbeOutcome::failure(), ok(7), ok(4)];
        let mut reversed = forward.clone();
        reversed.reverse();

        let first = reduce(&forward, 42);
        assert_eq!(first, reduce(&forward, 42));
        assert_eq!(first, reduce(&reversed, 42));
    }

    #[test]
    fn test_large_latencies_do_not_overflow() {
        let huge = ProbeOutcome {
            latency_nanos: u64::MAX,
            succeeded: true,
        };

        let summary = reduce(&[huge, huge], 0);
        assert_eq!(summary.mean_latency_nanos, Some(u64::MAX as f64));
    }
}
