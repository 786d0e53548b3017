//! Frame timing for a running project.
//!
//! Records how long each [`ProjectRuntime`] frame takes and summarises the
//! samples as average, percentiles and spread.

use std::time::{Duration, Instant};

use dream_engine::{FrameReport, ProjectRuntime, Result};

/// Summary of a run of frame durations.
#[derive(Debug, Clone)]
pub struct FrameStats {
    pub frame_count: usize,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Nodes destroyed over the whole run.
    pub destroyed: usize,
    sorted: Vec<Duration>,
}

impl FrameStats {
    pub fn from_samples(mut samples: Vec<Duration>, destroyed: usize) -> Self {
        samples.sort();
        Self {
            frame_count: samples.len(),
            total: samples.iter().sum(),
            min: samples.first().copied().unwrap_or_default(),
            max: samples.last().copied().unwrap_or_default(),
            destroyed,
            sorted: samples,
        }
    }

    pub fn average(&self) -> Duration {
        match self.frame_count {
            0 => Duration::ZERO,
            n => self.total / n as u32,
        }
    }

    /// Sample at percentile `p` (clamped to 0..=100).
    pub fn percentile(&self, p: usize) -> Duration {
        let Some(last) = self.sorted.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        self.sorted[(self.sorted.len() * p.min(100) / 100).min(last)]
    }

    pub fn median(&self) -> Duration {
        self.percentile(50)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99)
    }

    /// Sample standard deviation.
    pub fn std_dev(&self) -> Duration {
        if self.frame_count < 2 {
            return Duration::ZERO;
        }
        let mean = self.average().as_nanos() as f64;
        let sum: f64 = self
            .sorted
            .iter()
            .map(|sample| (sample.as_nanos() as f64 - mean).powi(2))
            .sum();
        Duration::from_nanos((sum / (self.frame_count - 1) as f64).sqrt() as u64)
    }

    pub fn fps(&self) -> f64 {
        let average = self.average();
        if average.is_zero() {
            0.0
        } else {
            average.as_secs_f64().recip()
        }
    }
}

impl std::fmt::Display for FrameStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        write!(
            f,
            "{} frames, avg {:.3}ms ({:.0} fps), p99 {:.3}ms, min {:.3}ms, max {:.3}ms, {} destroyed",
            self.frame_count,
            ms(self.average()),
            self.fps(),
            ms(self.p99()),
            ms(self.min),
            ms(self.max),
            self.destroyed,
        )
    }
}

/// Collects one sample per frame.
#[derive(Debug, Default)]
pub struct FrameTimer {
    samples: Vec<Duration>,
    destroyed: usize,
    started: Option<Instant>,
}

impl FrameTimer {
    pub fn new(expected_frames: usize) -> Self {
        Self {
            samples: Vec::with_capacity(expected_frames),
            ..Self::default()
        }
    }

    pub fn begin_frame(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Ends the frame started by [`begin_frame`](Self::begin_frame). Without a
    /// matching begin nothing is recorded.
    pub fn end_frame(&mut self, report: Option<&FrameReport>) {
        if let Some(started) = self.started.take() {
            self.samples.push(started.elapsed());
            self.destroyed += report.map_or(0, |report| report.destroyed.len());
        }
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    pub fn stats(self) -> FrameStats {
        FrameStats::from_samples(self.samples, self.destroyed)
    }
}

/// Times `frame_count` calls of `frame_fn`.
pub fn measure_frames<F>(frame_count: usize, mut frame_fn: F) -> FrameStats
where
    F: FnMut(usize),
{
    let mut timer = FrameTimer::new(frame_count);
    for frame in 0..frame_count {
        timer.begin_frame();
        frame_fn(frame);
        timer.end_frame(None);
    }
    timer.stats()
}

/// Runs `frame_count` fixed-delta frames of `runtime` and times each one.
pub fn measure_runtime(
    runtime: &mut ProjectRuntime,
    frame_count: usize,
    delta: Duration,
) -> Result<FrameStats> {
    let mut timer = FrameTimer::new(frame_count);
    for _ in 0..frame_count {
        timer.begin_frame();
        let report = runtime.update_with_delta(delta)?;
        timer.end_frame(Some(&report));
    }
    Ok(timer.stats())
}
