use std::time::Instant;

use anyhow::Result;
use opencv::{
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use tracing::info;

use crate::landmarks::FrameSize;

pub struct Camera {
    capture: VideoCapture,
    opened_at: Instant,
    last_position_ms: u64,
}

impl Camera {
    pub fn new(device_id: i32) -> Result<Self> {
        let capture = VideoCapture::new(device_id, VideoCaptureAPIs::CAP_ANY as i32)?;

        if !capture.is_opened()? {
            anyhow::bail!("Failed to open camera {device_id}");
        }
        info!(device_id, "camera opened");

        Ok(Self {
            capture,
            opened_at: Instant::now(),
            last_position_ms: 0,
        })
    }

    /// Grab the next frame. `None` means the device returned nothing this time.
    pub fn read_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }

    /// Monotonic frame timestamp for the detector, in milliseconds.
    ///
    /// Live webcams usually report a zero position, so elapsed wall time is
    /// used instead; the value never goes backwards.
    pub fn position_ms(&mut self) -> Result<u64> {
        let reported = self.capture.get(videoio::CAP_PROP_POS_MSEC)?;
        let position = if reported > 0.0 {
            reported as u64
        } else {
            self.opened_at.elapsed().as_millis() as u64
        };
        self.last_position_ms = self.last_position_ms.max(position);
        Ok(self.last_position_ms)
    }

    pub fn release(&mut self) -> Result<()> {
        self.capture.release()?;
        Ok(())
    }
}

pub fn frame_size(frame: &Mat) -> FrameSize {
    FrameSize::new(frame.cols().max(0) as u32, frame.rows().max(0) as u32)
}
