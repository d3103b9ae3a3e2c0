//! Posture Sentinel
//!
//! Watches a seated user through a webcam and warns when they slouch for too
//! long. The heart of the crate is [`posture::PostureEngine`], a synchronous
//! state machine that turns nose/shoulder landmarks into a smoothed neck
//! ratio, an upright/slouched classification, a one-shot slouch alert and a
//! running posture score.
//!
//! Camera capture, pose inference, the overlay window and the alert tone live
//! behind the `desktop` feature. Without it the crate still provides the
//! engine, configuration and the headless trace [`replay`].

pub mod cli;
pub mod config;
pub mod landmarks;
pub mod posture;
pub mod replay;
pub mod smoothing;

#[cfg(feature = "desktop")]
pub mod app;
#[cfg(feature = "desktop")]
pub mod audio;
#[cfg(feature = "desktop")]
pub mod camera;
#[cfg(feature = "desktop")]
pub mod inference;
#[cfg(feature = "desktop")]
pub mod overlay;

pub use config::Config;
pub use landmarks::{FrameSize, Landmark, LandmarkObservation, NormalizedPoint, PixelPoint};
pub use posture::{EngineSettings, FrameResult, FrameStatus, Keypoints, PostureEngine, SlouchState};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the library surfaces (configuration and trace replay)
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Trace error at line {line}: {message}")]
    Trace { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}
