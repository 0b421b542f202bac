//! Frame-by-frame segmentation driver
//!
//! ```text
//! FrameSource → crop/normalize → Inferer → mask decode → composite → FrameSink
//!                                                                   ↘ progress, stats
//! ```
//!
//! Frames are processed strictly one after another; the sink receives frames
//! in the order the source produced them. Any per-frame failure aborts the
//! run, running out of frames before the declared total does not.

use crate::composite::composite;
use crate::error::PipelineError;
use crate::inference::Inferer;
use crate::mask::decode_mask;
use crate::preprocess::{crop_offsets, preprocess};
use crate::progress::{NoProgress, ProgressRecord, ProgressReporter};
use crate::stats::{RunStats, StatsAggregator};
use std::path::PathBuf;
use std::time::Instant;
use surgery_seg_common::{Frame, FrameSink, FrameSource};
use tracing::{debug, error, info, warn};

/// Lifecycle of a [`PipelineDriver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Running,
    Draining,
    Done,
    Failed,
}

/// Run one frame through crop → inference → mask decode → composite
///
/// # Errors
///
/// Returns `InvalidFrameSize`, `InferenceFailure`, `MaskChannelMismatch` or
/// `InvalidOutputShape` from the respective stage.
pub fn annotate_frame<I: Inferer + ?Sized>(
    inferer: &mut I,
    frame: &Frame,
) -> Result<Frame, PipelineError> {
    let prepared = preprocess(frame)?;
    let raw = inferer.infer(prepared.tensor)?;
    let mask = decode_mask(&raw)?;
    Ok(composite(&prepared.cropped, &mask))
}

/// Orchestrates a single pass over a video
pub struct PipelineDriver<S, I, K, P = NoProgress> {
    source: S,
    inferer: I,
    sink: K,
    progress: P,
    stats_path: Option<PathBuf>,
    state: PipelineState,
}

impl<S, I, K> PipelineDriver<S, I, K>
where
    S: FrameSource,
    I: Inferer,
    K: FrameSink,
{
    pub fn new(source: S, inferer: I, sink: K) -> Self {
        Self {
            source,
            inferer,
            sink,
            progress: NoProgress,
            stats_path: None,
            state: PipelineState::Init,
        }
    }
}

impl<S, I, K, P> PipelineDriver<S, I, K, P>
where
    S: FrameSource,
    I: Inferer,
    K: FrameSink,
    P: ProgressReporter,
{
    /// Report progress to `progress` after every frame
    pub fn with_progress<Q: ProgressReporter>(self, progress: Q) -> PipelineDriver<S, I, K, Q> {
        PipelineDriver {
            source: self.source,
            inferer: self.inferer,
            sink: self.sink,
            progress,
            stats_path: self.stats_path,
            state: self.state,
        }
    }

    /// Write the stats file to `path` when the run completes
    #[must_use]
    pub fn with_stats_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stats_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Hand back the frame sink (e.g. to inspect what was written)
    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Process the whole stream
    ///
    /// # Errors
    ///
    /// Any stage error ends the run in `Failed`. Calling `run` again after it
    /// has started returns `AlreadyRan`.
    pub fn run(&mut self) -> Result<RunStats, PipelineError> {
        if self.state != PipelineState::Init {
            return Err(PipelineError::AlreadyRan);
        }

        match self.execute() {
            Ok(stats) => {
                self.state = PipelineState::Done;
                Ok(stats)
            }
            Err(e) => {
                error!("Pipeline failed: {}", e);
                self.state = PipelineState::Failed;
                if let Err(close_err) = self.sink.close() {
                    warn!("Failed to close output after error: {}", close_err);
                }
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<RunStats, PipelineError> {
        let total = self.source.total_count();
        let mut stats = StatsAggregator::start();

        // Init: the first frame decides whether the stream fits the crop
        let first = self.source.next_frame().map_err(PipelineError::Source)?;
        if let Some(frame) = &first {
            crop_offsets(frame.width(), frame.height())?;
            debug!(
                "Input frames are {}x{}, {} declared",
                frame.width(),
                frame.height(),
                total
            );
        }

        self.state = PipelineState::Running;
        let mut pending = first;

        for index in 0..total {
            let frame = match pending.take() {
                Some(frame) => frame,
                None if index == 0 => break,
                None => match self.source.next_frame().map_err(PipelineError::Source)? {
                    Some(frame) => frame,
                    None => {
                        info!(
                            "Stream ended after {} of {} declared frames",
                            index, total
                        );
                        break;
                    }
                },
            };

            let infer_start = Instant::now();
            let annotated = annotate_frame(&mut self.inferer, &frame)?;
            info!(
                "Inference took {:.1} ms on frame {}",
                infer_start.elapsed().as_secs_f64() * 1000.0,
                index
            );

            self.sink
                .write_frame(&annotated)
                .map_err(PipelineError::Sink)?;
            stats.record_frame();

            let record = ProgressRecord::new(
                stats.elapsed().as_secs_f64(),
                stats.frames(),
                total,
            );
            if let Err(e) = self.progress.report(&record) {
                warn!("Failed to report progress: {}", e);
            }
        }

        // Draining
        self.state = PipelineState::Draining;
        self.sink.close().map_err(PipelineError::Sink)?;
        let run = stats.finalize();

        if let Some(path) = &self.stats_path {
            run.write_to(path)?;
        }

        info!(
            "Processed {} frames in {:.2}s ({} fps)",
            run.total_frames, run.total_time_seconds, run.fps
        );
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{RawOutput, Tensor};
    use ndarray::Array4;
    use surgery_seg_common::{ChannelOrder, ProcessingError, CROP_HEIGHT, CROP_WIDTH};

    struct Frames {
        frames: Vec<Frame>,
        total: u64,
    }

    impl FrameSource for Frames {
        fn next_frame(&mut self) -> surgery_seg_common::Result<Option<Frame>> {
            if self.frames.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.frames.remove(0)))
            }
        }

        fn total_count(&self) -> u64 {
            self.total
        }
    }

    #[derive(Default)]
    struct Collect {
        frames: Vec<Frame>,
        closed: usize,
    }

    impl FrameSink for Collect {
        fn write_frame(&mut self, frame: &Frame) -> surgery_seg_common::Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn close(&mut self) -> surgery_seg_common::Result<()> {
            self.closed += 1;
            Ok(())
        }
    }

    struct Background;

    impl Inferer for Background {
        fn infer(&mut self, _tensor: Tensor) -> Result<RawOutput, PipelineError> {
            Ok(Array4::zeros((
                1,
                4,
                CROP_HEIGHT as usize,
                CROP_WIDTH as usize,
            )))
        }
    }

    fn crop_frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|_| Frame::filled(CROP_WIDTH, CROP_HEIGHT, ChannelOrder::Bgr, [1, 2, 3]))
            .collect()
    }

    #[test]
    fn test_run_reaches_done() {
        let source = Frames {
            frames: crop_frames(3),
            total: 3,
        };
        let mut driver = PipelineDriver::new(source, Background, Collect::default());
        assert_eq!(driver.state(), PipelineState::Init);

        let stats = driver.run().unwrap();
        assert_eq!(stats.total_frames, 3);
        assert_eq!(driver.state(), PipelineState::Done);

        let sink = driver.into_sink();
        assert_eq!(sink.frames.len(), 3);
        assert_eq!(sink.closed, 1);
    }

    #[test]
    fn test_total_count_bounds_the_run() {
        let source = Frames {
            frames: crop_frames(4),
            total: 2,
        };
        let mut driver = PipelineDriver::new(source, Background, Collect::default());
        assert_eq!(driver.run().unwrap().total_frames, 2);
        assert_eq!(driver.into_sink().frames.len(), 2);
    }

    #[test]
    fn test_empty_stream_completes() {
        let source = Frames {
            frames: Vec::new(),
            total: 5,
        };
        let mut driver = PipelineDriver::new(source, Background, Collect::default());
        let stats = driver.run().unwrap();
        assert_eq!(stats.total_frames, 0);
        assert_eq!(driver.state(), PipelineState::Done);
    }

    #[test]
    fn test_source_error_fails_and_closes_sink() {
        struct Broken;
        impl FrameSource for Broken {
            fn next_frame(&mut self) -> surgery_seg_common::Result<Option<Frame>> {
                Err(ProcessingError::FFmpegError("corrupt packet".to_string()))
            }
            fn total_count(&self) -> u64 {
                1
            }
        }

        let mut driver = PipelineDriver::new(Broken, Background, Collect::default());
        assert!(matches!(driver.run(), Err(PipelineError::Source(_))));
        assert_eq!(driver.state(), PipelineState::Failed);
        assert_eq!(driver.into_sink().closed, 1);
    }

    #[test]
    fn test_annotate_frame_crops() {
        let frame = Frame::filled(1300, 1030, ChannelOrder::Bgr, [9, 9, 9]);
        let out = annotate_frame(&mut Background, &frame).unwrap();
        assert_eq!((out.width(), out.height()), (CROP_WIDTH, CROP_HEIGHT));
        assert_eq!(out.pixel(0, 0), [9, 9, 9]);
    }
}
