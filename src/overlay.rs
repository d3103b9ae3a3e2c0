use anyhow::Result;
use opencv::{
    core::{Mat, Point, Scalar},
    highgui,
    imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8},
    prelude::*,
};

use crate::landmarks::PixelPoint;
use crate::posture::FrameResult;

const NECK_THICKNESS: i32 = 5;
const SHOULDER_RADIUS: i32 = 8;
const BORDER_THICKNESS: i32 = 15;

/// Key presses the control loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    TogglePause,
    TogglePin,
    Quit,
}

impl Control {
    pub fn from_key(key: i32) -> Option<Self> {
        match key {
            k if k == i32::from(b'p') || k == i32::from(b' ') => Some(Control::TogglePause),
            k if k == i32::from(b't') => Some(Control::TogglePin),
            k if k == 27 || k == i32::from(b'q') => Some(Control::Quit),
            _ => None,
        }
    }
}

// BGR
fn green() -> Scalar {
    Scalar::new(0.0, 255.0, 0.0, 0.0)
}

fn red() -> Scalar {
    Scalar::new(0.0, 0.0, 255.0, 0.0)
}

fn blue() -> Scalar {
    Scalar::new(255.0, 0.0, 0.0, 0.0)
}

fn white() -> Scalar {
    Scalar::new(255.0, 255.0, 255.0, 0.0)
}

fn point(p: PixelPoint) -> Point {
    Point::new(p.x, p.y)
}

/// Preview window with the posture annotations.
pub struct Overlay {
    title: String,
    pinned: bool,
}

impl Overlay {
    pub fn new(title: &str) -> Result<Self> {
        highgui::named_window(title, highgui::WINDOW_NORMAL | highgui::WINDOW_KEEPRATIO)?;
        highgui::resize_window(title, 900, 700)?;

        Ok(Self {
            title: title.to_string(),
            pinned: false,
        })
    }

    /// Annotate `frame` in place. `result` is `None` while paused.
    pub fn draw(&self, frame: &mut Mat, result: Option<&FrameResult>, paused: bool) -> Result<()> {
        if paused {
            let y = frame.rows() - 20;
            self.text(frame, "PAUSED", Point::new(10, y), 1.0)?;
        }
        let Some(result) = result else {
            return Ok(());
        };

        if let (Some(keypoints), Some(upright)) = (result.keypoints, result.is_upright) {
            let color = if upright { green() } else { red() };
            imgproc::line(
                frame,
                point(keypoints.mid_shoulder),
                point(keypoints.nose),
                color,
                NECK_THICKNESS,
                LINE_8,
                0,
            )?;
            for shoulder in [keypoints.left_shoulder, keypoints.right_shoulder] {
                imgproc::circle(frame, point(shoulder), SHOULDER_RADIUS, blue(), -1, LINE_8, 0)?;
            }
        }

        if result.alert_active {
            let (w, h) = (frame.cols(), frame.rows());
            imgproc::rectangle_points(
                frame,
                Point::new(0, 0),
                Point::new(w, h),
                red(),
                BORDER_THICKNESS,
                LINE_8,
                0,
            )?;
        }

        self.text(
            frame,
            &format!("Posture Score: {:.1}%", result.posture_score_percent),
            Point::new(10, 30),
            1.0,
        )?;
        if let Some(ratio) = result.smoothed_ratio {
            self.text(frame, &format!("Neck Ratio: {ratio:.2}"), Point::new(10, 70), 0.8)?;
        }
        Ok(())
    }

    fn text(&self, frame: &mut Mat, text: &str, origin: Point, scale: f64) -> Result<()> {
        imgproc::put_text(
            frame,
            text,
            origin,
            FONT_HERSHEY_SIMPLEX,
            scale,
            white(),
            2,
            LINE_8,
            false,
        )?;
        Ok(())
    }

    pub fn show(&self, frame: &Mat) -> Result<()> {
        highgui::imshow(&self.title, frame)?;
        Ok(())
    }

    /// Pump window events for `delay_ms` and map any key press.
    pub fn poll_control(&self, delay_ms: i32) -> Result<Option<Control>> {
        let key = highgui::wait_key(delay_ms)?;
        // Some backends report modifier bits above the low byte.
        Ok(Control::from_key(if key >= 0 { key & 0xFF } else { key }))
    }

    /// Keep the window above others, or release it.
    pub fn toggle_pin(&mut self) -> Result<bool> {
        self.pinned = !self.pinned;
        let value = if self.pinned { 1.0 } else { 0.0 };
        highgui::set_window_property(&self.title, highgui::WND_PROP_TOPMOST, value)?;
        Ok(self.pinned)
    }

    pub fn close(&self) -> Result<()> {
        highgui::destroy_window(&self.title)?;
        Ok(())
    }
}
