//! Run timing and the end-of-run stats file

use crate::error::PipelineError;
use crate::progress::round_to;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

/// Final statistics of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub total_time_seconds: f64,
    pub total_frames: u64,
    /// Frames per second rounded to 2 decimals; 0 when no time was measured
    pub fps: f64,
}

impl RunStats {
    #[must_use]
    pub fn from_measurements(total_time_seconds: f64, total_frames: u64) -> Self {
        let fps = if total_time_seconds.is_finite() && total_time_seconds > 0.0 {
            round_to(total_frames as f64 / total_time_seconds, 2)
        } else {
            0.0
        };
        Self {
            total_time_seconds,
            total_frames,
            fps,
        }
    }

    /// String-typed record consumed by the batch harness
    #[must_use]
    pub fn to_record(&self) -> StatsRecord {
        StatsRecord {
            time: decimal_string(self.total_time_seconds),
            frames: self.total_frames.to_string(),
            fps: decimal_string(self.fps),
        }
    }

    /// Write the stats JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string(&self.to_record())?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Shortest decimal form of `value`, keeping `.0` on integral values (`2.0`, `3.33`)
fn decimal_string(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// On-disk stats layout: every field is a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsRecord {
    pub time: String,
    pub frames: String,
    pub fps: String,
}

/// Accumulates wall-clock time and completed frames over a run
#[derive(Debug)]
pub struct StatsAggregator {
    started: Instant,
    frames: u64,
}

impl StatsAggregator {
    /// Start timing now
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            frames: 0,
        }
    }

    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop timing and compute the run statistics
    #[must_use]
    pub fn finalize(self) -> RunStats {
        RunStats::from_measurements(self.elapsed().as_secs_f64(), self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_rounding() {
        let stats = RunStats::from_measurements(3.0, 10);
        assert_eq!(stats.fps, 3.33);

        let stats = RunStats::from_measurements(0.8, 5);
        assert_eq!(stats.fps, 6.25);

        let stats = RunStats::from_measurements(7.0, 100);
        assert_eq!(stats.fps, (100.0f64 / 7.0 * 100.0).round() / 100.0);
    }

    #[test]
    fn test_fps_sentinel_for_zero_time() {
        assert_eq!(RunStats::from_measurements(0.0, 0).fps, 0.0);
        assert_eq!(RunStats::from_measurements(0.0, 5).fps, 0.0);
        assert_eq!(RunStats::from_measurements(f64::NAN, 5).fps, 0.0);
        assert_eq!(RunStats::from_measurements(-1.0, 5).fps, 0.0);
    }

    #[test]
    fn test_record_fields_are_strings() {
        let stats = RunStats::from_measurements(2.5, 5);
        let record = stats.to_record();
        assert_eq!(record.time, "2.5");
        assert_eq!(record.frames, "5");
        assert_eq!(record.fps, "2.0");

        let value = serde_json::to_value(&record).unwrap();
        assert!(value["time"].is_string());
        assert!(value["frames"].is_string());
        assert!(value["fps"].is_string());
    }

    #[test]
    fn test_decimal_strings_keep_fraction() {
        assert_eq!(decimal_string(2.0), "2.0");
        assert_eq!(decimal_string(0.0), "0.0");
        assert_eq!(decimal_string(3.33), "3.33");
        assert_eq!(decimal_string(12.5), "12.5");
        assert_eq!(RunStats::from_measurements(0.0, 0).to_record().fps, "0.0");
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        RunStats::from_measurements(4.0, 8).write_to(&path).unwrap();

        let record: StatsRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(record.frames, "8");
        assert_eq!(record.time, "4.0");
        assert_eq!(record.fps, "2.0");
    }

    #[test]
    fn test_aggregator_counts_frames() {
        let mut stats = StatsAggregator::start();
        for _ in 0..3 {
            stats.record_frame();
        }
        assert_eq!(stats.frames(), 3);
        let run = stats.finalize();
        assert_eq!(run.total_frames, 3);
        assert!(run.total_time_seconds >= 0.0);
    }
}
