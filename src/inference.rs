use anyhow::{Context, Result};
use opencv::{core, imgproc, prelude::*};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::{Tensor, ValueType};
use tracing::{debug, info};

use crate::landmarks::{Landmark, BODY_LANDMARK_COUNT};

const DEFAULT_INPUT_SIZE: usize = 256;

/// Anything that can find one body's landmarks in a frame.
pub trait LandmarkDetector {
    /// Landmarks in normalised frame coordinates, or `None` when no body is visible.
    fn detect(&mut self, frame: &Mat, timestamp_ms: u64) -> Result<Option<Vec<Landmark>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// [1, 3, H, W]
    Nchw,
    /// [1, H, W, 3]
    Nhwc,
}

/// Single-person pose landmark model run through ONNX Runtime.
pub struct PoseDetector {
    session: Session,
    input_width: usize,
    input_height: usize,
    layout: Layout,
    presence_threshold: f32,
}

impl PoseDetector {
    pub fn new(model_path: &str, presence_threshold: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load pose model {model_path}"))?;

        let (input_width, input_height, layout) = Self::input_dimensions(&session)?;
        info!(model_path, input_width, input_height, ?layout, "pose model loaded");

        Ok(Self {
            session,
            input_width,
            input_height,
            layout,
            presence_threshold,
        })
    }

    fn input_dimensions(session: &Session) -> Result<(usize, usize, Layout)> {
        let input = session
            .inputs
            .first()
            .ok_or_else(|| anyhow::anyhow!("No model inputs found"))?;

        let ValueType::Tensor { dimensions, .. } = &input.input_type else {
            anyhow::bail!("Model input {} is not a tensor", input.name);
        };

        let dim = |i: usize| {
            dimensions
                .get(i)
                .copied()
                .filter(|d| *d > 0)
                .map(|d| d as usize)
        };

        match (dim(1), dim(2), dim(3)) {
            (Some(3), h, w) => Ok((
                w.unwrap_or(DEFAULT_INPUT_SIZE),
                h.unwrap_or(DEFAULT_INPUT_SIZE),
                Layout::Nchw,
            )),
            (h, w, _) => Ok((
                w.unwrap_or(DEFAULT_INPUT_SIZE),
                h.unwrap_or(DEFAULT_INPUT_SIZE),
                Layout::Nhwc,
            )),
        }
    }

    fn preprocess(&self, frame: &Mat) -> Result<Tensor<f32>> {
        let mut rgb = Mat::default();
        imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let mut resized = Mat::default();
        imgproc::resize(
            &rgb,
            &mut resized,
            core::Size::new(self.input_width as i32, self.input_height as i32),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let mut float_img = Mat::default();
        resized.convert_to(&mut float_img, core::CV_32FC3, 1.0 / 255.0, 0.0)?;

        let h = self.input_height;
        let w = self.input_width;
        let mut data = vec![0.0f32; 3 * h * w];

        for y in 0..h {
            for x in 0..w {
                let pixel = float_img.at_2d::<core::Vec3f>(y as i32, x as i32)?;
                for c in 0..3 {
                    let idx = match self.layout {
                        Layout::Nchw => c * h * w + y * w + x,
                        Layout::Nhwc => (y * w + x) * 3 + c,
                    };
                    data[idx] = pixel[c];
                }
            }
        }

        let shape = match self.layout {
            Layout::Nchw => [1, 3, h, w],
            Layout::Nhwc => [1, h, w, 3],
        };
        Ok(Tensor::from_array((shape, data))?)
    }

    /// Decode `[1, N * k]` or `[1, N, k]` landmark rows into normalised landmarks.
    fn decode_landmarks(&self, shape: &[i64], values: &[f32]) -> Vec<Landmark> {
        let stride = match shape {
            [_, _, k] if *k >= 2 => *k as usize,
            _ if values.len() % 5 == 0 && values.len() / 5 >= BODY_LANDMARK_COUNT => 5,
            _ if values.len() % 4 == 0 && values.len() / 4 >= BODY_LANDMARK_COUNT => 4,
            _ => 3,
        };

        let rows = (values.len() / stride).min(BODY_LANDMARK_COUNT);
        let in_pixels = values
            .chunks(stride)
            .take(rows)
            .any(|row| row[0].abs() > 1.5 || row[1].abs() > 1.5);
        let (sx, sy) = if in_pixels {
            (self.input_width as f32, self.input_height as f32)
        } else {
            (1.0, 1.0)
        };

        values
            .chunks(stride)
            .take(rows)
            .map(|row| Landmark {
                x: row[0] / sx,
                y: row[1] / sy,
                z: row.get(2).copied().unwrap_or(0.0),
                visibility: row.get(3).copied().map(sigmoid).unwrap_or(1.0),
            })
            .collect()
    }
}

impl LandmarkDetector for PoseDetector {
    fn detect(&mut self, frame: &Mat, timestamp_ms: u64) -> Result<Option<Vec<Landmark>>> {
        let input_tensor = self.preprocess(frame)?;
        let outputs = self.session.run(ort::inputs![input_tensor]?)?;

        if outputs.len() > 1 {
            let (_, flag) = outputs[1].try_extract_raw_tensor::<f32>()?;
            let presence = flag.first().copied().map(sigmoid).unwrap_or(0.0);
            if presence < self.presence_threshold {
                debug!(timestamp_ms, presence, "no body in frame");
                return Ok(None);
            }
        }

        let (shape, values) = outputs[0].try_extract_raw_tensor::<f32>()?;
        let landmarks = self.decode_landmarks(&shape, values);
        if landmarks.len() < BODY_LANDMARK_COUNT {
            debug!(timestamp_ms, count = landmarks.len(), "incomplete landmark set");
            return Ok(None);
        }

        Ok(Some(landmarks))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
