//! Headless replay of recorded landmark traces.
//!
//! A trace is JSON lines, one frame per line:
//!
//! ```text
//! {"timestamp_ms": 1000, "frame_ms": 33, "width": 640, "height": 480,
//!  "pose": {"nose": [0.5, 0.2], "left_shoulder": [0.6, 0.5], "right_shoulder": [0.4, 0.5]}}
//! ```
//!
//! `pose` is `null` for frames without a body. `frame_ms` may be omitted, in
//! which case the gap since the previous timestamp is used. Blank lines and
//! lines starting with `#` are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::landmarks::{FrameSize, LandmarkObservation, NormalizedPoint};
use crate::posture::{EngineSettings, FrameResult, FrameStatus, PostureEngine, SlouchState};
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct TraceFrame {
    pub timestamp_ms: u64,
    #[serde(default)]
    pub frame_ms: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub pose: Option<TracePose>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TracePose {
    pub nose: [f32; 2],
    pub left_shoulder: [f32; 2],
    pub right_shoulder: [f32; 2],
}

impl TraceFrame {
    pub fn observation(&self) -> Option<LandmarkObservation> {
        self.pose.map(|pose| {
            LandmarkObservation::new(
                NormalizedPoint::from(pose.nose),
                NormalizedPoint::from(pose.left_shoulder),
                NormalizedPoint::from(pose.right_shoulder),
                FrameSize::new(self.width, self.height),
            )
        })
    }
}

/// Totals for one replayed session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySummary {
    pub frames: usize,
    pub detections: usize,
    pub no_detection: usize,
    pub degenerate: usize,
    pub alerts: usize,
    pub upright_secs: f64,
    pub total_secs: f64,
    pub posture_score_percent: f64,
    pub final_state: SlouchState,
}

/// Replay a trace, calling `on_frame` with every engine result.
pub fn replay_reader<R, F>(
    reader: R,
    settings: EngineSettings,
    mut on_frame: F,
) -> Result<ReplaySummary>
where
    R: BufRead,
    F: FnMut(&FrameResult),
{
    let mut engine = PostureEngine::new(settings);
    let mut summary = ReplaySummary {
        frames: 0,
        detections: 0,
        no_detection: 0,
        degenerate: 0,
        alerts: 0,
        upright_secs: 0.0,
        total_secs: 0.0,
        posture_score_percent: 0.0,
        final_state: SlouchState::Upright,
    };
    let mut previous_ms: Option<u64> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let frame: TraceFrame = serde_json::from_str(trimmed).map_err(|e| Error::Trace {
            line: line_no,
            message: e.to_string(),
        })?;

        if let Some(prev) = previous_ms {
            if frame.timestamp_ms < prev {
                return Err(Error::Trace {
                    line: line_no,
                    message: format!("timestamp {} goes back from {}", frame.timestamp_ms, prev),
                });
            }
        }
        let frame_ms = frame
            .frame_ms
            .unwrap_or_else(|| previous_ms.map_or(0, |prev| frame.timestamp_ms - prev));
        previous_ms = Some(frame.timestamp_ms);

        let observation = frame.observation();
        let result = engine.update(
            observation.as_ref(),
            Duration::from_millis(frame.timestamp_ms),
            Duration::from_millis(frame_ms),
        );

        summary.frames += 1;
        match result.status {
            FrameStatus::Classified => summary.detections += 1,
            FrameStatus::NoDetection => summary.no_detection += 1,
            FrameStatus::DegenerateGeometry => summary.degenerate += 1,
        }
        if result.alert_fired {
            debug!(line = line_no, "alert fired during replay");
            summary.alerts += 1;
        }
        on_frame(&result);
    }

    let score = engine.score();
    summary.upright_secs = score.upright().as_secs_f64();
    summary.total_secs = score.total().as_secs_f64();
    summary.posture_score_percent = score.percent();
    summary.final_state = engine.slouch_state();
    Ok(summary)
}

pub fn replay_file(path: impl AsRef<Path>, settings: EngineSettings) -> Result<ReplaySummary> {
    let file = File::open(path)?;
    replay_reader(BufReader::new(file), settings, |_| {})
}
