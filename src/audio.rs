//! Alert tone playback on the default output device.

use std::f32::consts::TAU;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, StreamConfig};
use tracing::{debug, warn};

const AMPLITUDE: f32 = 0.3;

#[derive(Debug, Clone, Copy)]
pub struct TonePlayer {
    frequency_hz: f32,
    duration: Duration,
}

impl TonePlayer {
    pub fn new(frequency_hz: f32, duration: Duration) -> Self {
        Self {
            frequency_hz,
            duration,
        }
    }

    /// Play the tone on a background thread so the capture loop keeps going.
    pub fn beep(&self) {
        let player = *self;
        let spawned = thread::Builder::new()
            .name("alert-tone".to_string())
            .spawn(move || {
                if let Err(e) = player.play_blocking() {
                    warn!("alert tone failed: {e:#}");
                }
            });
        if let Err(e) = spawned {
            warn!("could not start alert tone thread: {e}");
        }
    }

    fn play_blocking(&self) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no audio output device"))?;
        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        match sample_format {
            SampleFormat::F32 => self.play_stream::<f32>(&device, &config),
            SampleFormat::I16 => self.play_stream::<i16>(&device, &config),
            SampleFormat::U16 => self.play_stream::<u16>(&device, &config),
            other => anyhow::bail!("unsupported sample format {other:?}"),
        }
    }

    fn play_stream<T>(&self, device: &cpal::Device, config: &StreamConfig) -> Result<()>
    where
        T: SizedSample + FromSample<f32>,
    {
        let mut wave = SineWave::new(self.frequency_hz, config.sample_rate.0 as f32);
        let channels = usize::from(config.channels);

        let stream = device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| wave.fill(data, channels),
            |e| warn!("audio stream error: {e}"),
            None,
        )?;

        debug!(
            frequency_hz = self.frequency_hz,
            duration_ms = self.duration.as_millis() as u64,
            "playing alert tone"
        );
        stream.play()?;
        thread::sleep(self.duration);
        Ok(())
    }
}

/// Phase-continuous sine oscillator writing interleaved frames.
#[derive(Debug, Clone, Copy)]
struct SineWave {
    phase: f32,
    step: f32,
}

impl SineWave {
    fn new(frequency_hz: f32, sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            step: frequency_hz / sample_rate,
        }
    }

    /// Every channel of a frame gets the same sample.
    fn fill<T: FromSample<f32> + Copy>(&mut self, data: &mut [T], channels: usize) {
        for frame in data.chunks_mut(channels.max(1)) {
            let value = T::from_sample((self.phase * TAU).sin() * AMPLITUDE);
            self.phase = (self.phase + self.step).fract();
            frame.iter_mut().for_each(|sample| *sample = value);
        }
    }
}
