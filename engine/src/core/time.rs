use std::time::{Duration, Instant};

/// Largest delta a single frame may report, unless configured otherwise.
pub const DEFAULT_MAX_DELTA: Duration = Duration::from_millis(250);

/// Timing of one simulation frame. Each frame captures the total elapsed
/// scene time as well as the delta since the previous frame. New frames are
/// produced from the previous one with [`next`](Self::next), once per
/// iteration of the frame loop.
///
/// Deltas are clamped to `max_delta` so a stall (debugger, slow load) does not
/// age every node by seconds in one step.
#[derive(Debug, Copy, Clone)]
pub struct Time {
    // The instant this frame was created
    instant: Instant,
    /// Frame counter, starting at 0 before the first `next`
    pub frame: u64,
    /// The time delta since the last frame
    pub delta: Duration,
    /// The total elapsed time since the first frame
    pub time: Duration,
    max_delta: Duration,
}

impl Time {
    pub fn new(max_delta: Duration) -> Self {
        Self {
            instant: Instant::now(),
            frame: 0,
            delta: Duration::ZERO,
            time: Duration::ZERO,
            max_delta,
        }
    }

    /// Create the next frame, measuring the wall-clock delta since this one.
    pub fn next(self) -> Self {
        let delta = self.instant.elapsed();
        Self {
            instant: Instant::now(),
            ..self.advance(delta)
        }
    }

    /// Create the next frame with an explicit delta. Used by fixed-step drivers
    /// and tests.
    pub fn advance(self, delta: Duration) -> Self {
        let delta = delta.min(self.max_delta);
        Self {
            instant: self.instant,
            frame: self.frame + 1,
            delta,
            time: self.time + delta,
            max_delta: self.max_delta,
        }
    }

    /// Reset the reference instant to now, so time spent paused is not
    /// reported as the next delta.
    pub fn reset_now(&mut self) {
        self.instant = Instant::now();
    }

    pub fn max_delta(&self) -> Duration {
        self.max_delta
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DELTA)
    }
}
