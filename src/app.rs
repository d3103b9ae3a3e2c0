//! Webcam control loop tying camera, detector, engine, overlay and tone together.

use std::time::Instant;

use anyhow::Result;
use opencv::core::Mat;
use tracing::{debug, info, warn};

use crate::audio::TonePlayer;
use crate::camera::{frame_size, Camera};
use crate::config::Config;
use crate::inference::{LandmarkDetector, PoseDetector};
use crate::landmarks::LandmarkObservation;
use crate::overlay::{Control, Overlay};
use crate::posture::{FrameResult, PostureEngine};

/// Delay between loop iterations, also used to pump window events.
const POLL_DELAY_MS: i32 = 10;

pub struct Sentinel<D: LandmarkDetector> {
    camera: Camera,
    detector: D,
    engine: PostureEngine,
    overlay: Overlay,
    tone: TonePlayer,
    paused: bool,
    session_start: Instant,
}

impl Sentinel<PoseDetector> {
    /// Open the camera and load the model; either failing is fatal.
    pub fn from_config(config: &Config) -> Result<Self> {
        let camera = Camera::new(config.camera_id)?;
        let detector = PoseDetector::new(&config.model_path, config.presence_threshold)?;
        Self::new(camera, detector, config)
    }
}

impl<D: LandmarkDetector> Sentinel<D> {
    pub fn new(camera: Camera, detector: D, config: &Config) -> Result<Self> {
        Ok(Self {
            camera,
            detector,
            engine: PostureEngine::new(config.engine_settings()?),
            overlay: Overlay::new(&config.window_title)?,
            tone: TonePlayer::new(config.tone_frequency_hz, config.tone_duration()),
            paused: false,
            session_start: Instant::now(),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        info!("watching posture; p = pause, t = pin, q = quit");

        loop {
            let Some(mut frame) = self.camera.read_frame()? else {
                debug!("empty frame, retrying");
                if self.handle_controls()? {
                    break;
                }
                continue;
            };

            // Paused frames never reach the engine, so no session time accrues.
            let result = if self.paused {
                None
            } else {
                Some(self.process(&frame)?)
            };

            self.overlay.draw(&mut frame, result.as_ref(), self.paused)?;
            self.overlay.show(&frame)?;

            if self.handle_controls()? {
                break;
            }
        }

        let score = self.engine.score();
        info!(
            posture_score = score.percent(),
            upright_secs = score.upright().as_secs_f64(),
            total_secs = score.total().as_secs_f64(),
            "session finished"
        );
        self.camera.release()?;
        self.overlay.close()?;
        Ok(())
    }

    fn process(&mut self, frame: &Mat) -> Result<FrameResult> {
        let frame_start = Instant::now();
        let timestamp_ms = self.camera.position_ms()?;

        let landmarks = match self.detector.detect(frame, timestamp_ms) {
            Ok(landmarks) => landmarks,
            Err(e) => {
                warn!("pose detection failed: {e:#}");
                None
            }
        };
        let size = frame_size(frame);
        let observation =
            landmarks.and_then(|landmarks| LandmarkObservation::from_landmarks(&landmarks, size));

        let result = self.engine.update(
            observation.as_ref(),
            self.session_start.elapsed(),
            frame_start.elapsed(),
        );

        if result.alert_fired {
            info!(posture_score = result.posture_score_percent, "slouching too long");
            self.tone.beep();
        }
        Ok(result)
    }

    /// Returns true when the user asked to quit.
    fn handle_controls(&mut self) -> Result<bool> {
        match self.overlay.poll_control(POLL_DELAY_MS)? {
            Some(Control::Quit) => {
                info!("exit requested");
                return Ok(true);
            }
            Some(Control::TogglePause) => {
                self.paused = !self.paused;
                info!(paused = self.paused, "pause toggled");
            }
            Some(Control::TogglePin) => {
                let pinned = self.overlay.toggle_pin()?;
                info!(pinned, "pin toggled");
            }
            None => {}
        }
        Ok(false)
    }
}
