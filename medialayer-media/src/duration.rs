//! Recording timeline and duration tracking
//!
//! [`RecordingTimeline`] maps source timestamps onto the recording's time
//! axis: the first recorded sample is time zero and paused spans are cut out,
//! so output timestamps continue without a gap after a resume.
//! [`DurationTracker`] turns those timestamps into the millisecond duration
//! and suppresses unchanged values.

use crate::session::PausePhase;
use std::collections::HashMap;
use std::time::Duration;
use tracing::trace;

/// Elapsed recording time in milliseconds, de-duplicated for publication
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DurationTracker {
    current_ms: Option<i64>,
    last_published_ms: Option<i64>,
}

impl DurationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a written output timestamp. Duration never moves backwards.
    pub fn record(&mut self, output_timestamp: Duration) {
        let ms = output_timestamp.as_millis() as i64;
        self.current_ms = Some(self.current_ms.map_or(ms, |cur| cur.max(ms)));
    }

    /// Current duration, 0 before anything was written
    pub fn current(&self) -> i64 {
        self.current_ms.unwrap_or(0)
    }

    /// The current value if it differs from the last one returned
    pub fn poll(&mut self) -> Option<i64> {
        let current = self.current_ms?;
        if self.last_published_ms == Some(current) {
            return None;
        }
        self.last_published_ms = Some(current);
        Some(current)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Timestamp bookkeeping of one recording
#[derive(Debug, Clone, Default)]
pub struct RecordingTimeline {
    origin: Option<Duration>,
    paused_total: Duration,
    pause_started: Option<Duration>,
    last_written: HashMap<u32, Duration>,
}

impl RecordingTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a source timestamp on `stream` to an output timestamp, advancing
    /// the pause phase as samples acknowledge it. `None` means the sample is
    /// not written.
    pub fn adjust(
        &mut self,
        stream: u32,
        timestamp: Duration,
        phase: &mut PausePhase,
    ) -> Option<Duration> {
        match *phase {
            PausePhase::Pausing => {
                self.pause_started = Some(timestamp);
                *phase = PausePhase::Paused;
                trace!(?timestamp, "pause acknowledged");
                return None;
            }
            PausePhase::Paused => return None,
            PausePhase::Resuming => {
                if let Some(started) = self.pause_started.take() {
                    self.paused_total += timestamp.saturating_sub(started);
                }
                *phase = PausePhase::Running;
                trace!(?timestamp, paused = ?self.paused_total, "resume acknowledged");
            }
            PausePhase::Running => {}
        }

        let origin = *self.origin.get_or_insert(timestamp);
        let output = timestamp
            .saturating_sub(origin)
            .saturating_sub(self.paused_total);

        if let Some(&last) = self.last_written.get(&stream) {
            if output < last {
                trace!(stream, ?output, ?last, "dropping out-of-order sample");
                return None;
            }
        }
        self.last_written.insert(stream, output);
        Some(output)
    }

    /// Forget ordering state for a flushed stream
    pub fn flush_stream(&mut self, stream: u32) {
        self.last_written.remove(&stream);
    }

    pub fn paused_total(&self) -> Duration {
        self.paused_total
    }

    pub fn origin(&self) -> Option<Duration> {
        self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_poll_only_reports_changes() {
        let mut tracker = DurationTracker::new();
        assert_eq!(tracker.poll(), None);

        tracker.record(ms(40));
        assert_eq!(tracker.poll(), Some(40));
        assert_eq!(tracker.poll(), None);

        tracker.record(Duration::from_micros(40_900));
        assert_eq!(tracker.poll(), None);

        tracker.record(ms(41));
        assert_eq!(tracker.poll(), Some(41));
    }

    #[test]
    fn test_duration_never_moves_backwards() {
        let mut tracker = DurationTracker::new();
        tracker.record(ms(100));
        tracker.record(ms(90));
        assert_eq!(tracker.current(), 100);
    }

    #[test]
    fn test_timeline_is_gap_free_across_pause() {
        let mut timeline = RecordingTimeline::new();
        let mut phase = PausePhase::Running;

        assert_eq!(timeline.adjust(0, ms(1_000), &mut phase), Some(ms(0)));
        assert_eq!(timeline.adjust(0, ms(1_100), &mut phase), Some(ms(100)));

        phase = PausePhase::Pausing;
        assert_eq!(timeline.adjust(0, ms(1_200), &mut phase), None);
        assert_eq!(phase, PausePhase::Paused);
        assert_eq!(timeline.adjust(0, ms(1_500), &mut phase), None);

        phase = PausePhase::Resuming;
        assert_eq!(timeline.adjust(0, ms(2_000), &mut phase), Some(ms(200)));
        assert_eq!(phase, PausePhase::Running);
        assert_eq!(timeline.adjust(0, ms(2_100), &mut phase), Some(ms(300)));
        assert_eq!(timeline.paused_total(), ms(800));
    }

    #[test]
    fn test_timeline_drops_out_of_order_per_stream() {
        let mut timeline = RecordingTimeline::new();
        let mut phase = PausePhase::Running;

        assert!(timeline.adjust(0, ms(100), &mut phase).is_some());
        // Earlier than the origin clamps to zero
        assert_eq!(timeline.adjust(1, ms(90), &mut phase), Some(ms(0)));
        assert!(timeline.adjust(0, ms(200), &mut phase).is_some());
        assert!(timeline.adjust(0, ms(150), &mut phase).is_none());

        timeline.flush_stream(0);
        assert_eq!(timeline.adjust(0, ms(150), &mut phase), Some(ms(50)));
    }
}
