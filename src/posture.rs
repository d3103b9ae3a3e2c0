//! Posture classification engine.
//!
//! Each frame's nose and shoulder landmarks become a neck ratio (nose to
//! shoulder-midpoint distance over shoulder width). The ratio is smoothed over
//! a short window and compared against a fixed threshold; a sustained slouch
//! raises a single alert, and time spent upright feeds the session score.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::landmarks::{LandmarkObservation, PixelPoint};
use crate::smoothing::RatioWindow;

pub const DEFAULT_SLOUCH_RATIO: f64 = 0.5;
pub const DEFAULT_ALERT_SECONDS: f64 = 5.0;
pub const DEFAULT_SMOOTHING_FRAMES: usize = 10;

/// Tunables for [`PostureEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Smoothed ratio at or above this counts as upright.
    pub slouch_ratio: f64,
    /// How long an unbroken slouch lasts before the alert fires.
    pub alert_after: Duration,
    /// Number of raw ratios averaged together.
    pub smoothing_frames: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            slouch_ratio: DEFAULT_SLOUCH_RATIO,
            alert_after: Duration::from_secs_f64(DEFAULT_ALERT_SECONDS),
            smoothing_frames: DEFAULT_SMOOTHING_FRAMES,
        }
    }
}

/// Slouch sub-state. `since` is the session timestamp at which the current
/// unbroken slouch streak began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SlouchState {
    #[default]
    Upright,
    Slouching { since: Duration },
    Alerted { since: Duration },
}

impl SlouchState {
    pub fn streak_start(&self) -> Option<Duration> {
        match *self {
            SlouchState::Upright => None,
            SlouchState::Slouching { since } | SlouchState::Alerted { since } => Some(since),
        }
    }

    pub fn is_alerted(&self) -> bool {
        matches!(self, SlouchState::Alerted { .. })
    }
}

/// Time accounting behind the posture score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostureScore {
    upright: Duration,
    total: Duration,
}

impl PostureScore {
    fn record(&mut self, frame_duration: Duration, upright: bool) {
        self.total += frame_duration;
        if upright {
            self.upright += frame_duration;
        }
    }

    pub fn upright(&self) -> Duration {
        self.upright
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Percentage of session time classified upright; 0 before any time has accrued.
    pub fn percent(&self) -> f64 {
        if self.total.is_zero() {
            return 0.0;
        }
        self.upright.as_secs_f64() / self.total.as_secs_f64() * 100.0
    }
}

/// Pixel positions for the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Keypoints {
    pub nose: PixelPoint,
    pub left_shoulder: PixelPoint,
    pub right_shoulder: PixelPoint,
    pub mid_shoulder: PixelPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    /// The frame was classified and the engine state advanced.
    Classified,
    /// No body in the frame; state untouched.
    NoDetection,
    /// Shoulders coincide so no ratio exists; state untouched and the
    /// previous classification is repeated.
    DegenerateGeometry,
}

/// What one call to [`PostureEngine::update`] produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameResult {
    pub status: FrameStatus,
    pub is_upright: Option<bool>,
    pub smoothed_ratio: Option<f64>,
    /// True only on the frame where the slouch alert fires.
    pub alert_fired: bool,
    /// True for as long as the current slouch streak has been alerted.
    pub alert_active: bool,
    pub posture_score_percent: f64,
    pub keypoints: Option<Keypoints>,
}

impl FrameResult {
    pub fn has_detection(&self) -> bool {
        self.status != FrameStatus::NoDetection
    }
}

/// Session-scoped posture state machine.
#[derive(Debug, Clone)]
pub struct PostureEngine {
    settings: EngineSettings,
    history: RatioWindow,
    state: SlouchState,
    score: PostureScore,
    last_result: Option<FrameResult>,
}

impl PostureEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let history = RatioWindow::new(settings.smoothing_frames);
        Self {
            settings,
            history,
            state: SlouchState::Upright,
            score: PostureScore::default(),
            last_result: None,
        }
    }

    /// Process one frame.
    ///
    /// `now` is the session timestamp at the end of the frame and
    /// `frame_duration` the time the frame took; a new slouch streak is taken
    /// to start at `now - frame_duration`.
    pub fn update(
        &mut self,
        observation: Option<&LandmarkObservation>,
        now: Duration,
        frame_duration: Duration,
    ) -> FrameResult {
        let Some(observation) = observation else {
            return FrameResult {
                status: FrameStatus::NoDetection,
                is_upright: None,
                smoothed_ratio: None,
                alert_fired: false,
                alert_active: self.state.is_alerted(),
                posture_score_percent: self.score.percent(),
                keypoints: None,
            };
        };

        let size = observation.frame;
        let keypoints = Keypoints {
            nose: observation.nose.to_pixels(size),
            left_shoulder: observation.left_shoulder.to_pixels(size),
            right_shoulder: observation.right_shoulder.to_pixels(size),
            mid_shoulder: observation.mid_shoulder().to_pixels(size),
        };

        let neck_length = keypoints.nose.distance(keypoints.mid_shoulder);
        let shoulder_width = keypoints.left_shoulder.distance(keypoints.right_shoulder);
        if shoulder_width == 0.0 {
            warn!(?keypoints, "shoulders coincide, skipping frame");
            return self.repeat_last(keypoints);
        }

        let raw_ratio = neck_length / shoulder_width;
        let smoothed_ratio = self.history.push(raw_ratio);
        let is_upright = smoothed_ratio >= self.settings.slouch_ratio;

        let alert_fired = self.advance(is_upright, now, frame_duration);
        self.score.record(frame_duration, is_upright);

        let result = FrameResult {
            status: FrameStatus::Classified,
            is_upright: Some(is_upright),
            smoothed_ratio: Some(smoothed_ratio),
            alert_fired,
            alert_active: self.state.is_alerted(),
            posture_score_percent: self.score.percent(),
            keypoints: Some(keypoints),
        };
        self.last_result = Some(result.clone());
        result
    }

    /// Step the slouch state machine; returns true when the alert fires.
    fn advance(&mut self, is_upright: bool, now: Duration, frame_duration: Duration) -> bool {
        let alert_after = self.settings.alert_after;
        let (next, fired) = match self.state {
            _ if is_upright => (SlouchState::Upright, false),
            SlouchState::Upright => {
                let since = now.saturating_sub(frame_duration);
                Self::check_streak(since, now, alert_after)
            }
            SlouchState::Slouching { since } => Self::check_streak(since, now, alert_after),
            alerted @ SlouchState::Alerted { .. } => (alerted, false),
        };

        if next != self.state {
            debug!(from = ?self.state, to = ?next, "slouch state changed");
        }
        if fired {
            info!(
                streak_secs = now.saturating_sub(next.streak_start().unwrap_or(now)).as_secs_f64(),
                "slouch alert"
            );
        }
        self.state = next;
        fired
    }

    fn check_streak(since: Duration, now: Duration, alert_after: Duration) -> (SlouchState, bool) {
        if now.saturating_sub(since) >= alert_after {
            (SlouchState::Alerted { since }, true)
        } else {
            (SlouchState::Slouching { since }, false)
        }
    }

    fn repeat_last(&self, keypoints: Keypoints) -> FrameResult {
        match &self.last_result {
            Some(last) => FrameResult {
                status: FrameStatus::DegenerateGeometry,
                alert_fired: false,
                ..last.clone()
            },
            None => FrameResult {
                status: FrameStatus::DegenerateGeometry,
                is_upright: None,
                smoothed_ratio: None,
                alert_fired: false,
                alert_active: self.state.is_alerted(),
                posture_score_percent: self.score.percent(),
                keypoints: Some(keypoints),
            },
        }
    }

    /// Start a new session with the same settings.
    pub fn reset(&mut self) {
        self.history.clear();
        self.state = SlouchState::Upright;
        self.score = PostureScore::default();
        self.last_result = None;
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn slouch_state(&self) -> SlouchState {
        self.state
    }

    pub fn slouch_start(&self) -> Option<Duration> {
        self.state.streak_start()
    }

    pub fn alert_triggered(&self) -> bool {
        self.state.is_alerted()
    }

    pub fn smoothed_ratio(&self) -> Option<f64> {
        self.history.mean()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn score(&self) -> PostureScore {
        self.score
    }

    pub fn last_result(&self) -> Option<&FrameResult> {
        self.last_result.as_ref()
    }
}

impl Default for PostureEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{FrameSize, NormalizedPoint};

    const SECOND: Duration = Duration::from_secs(1);

    // Shoulders 512 px apart on a 1024 px frame; the nose height picks the ratio.
    fn observation(nose_y: f32) -> LandmarkObservation {
        LandmarkObservation::new(
            NormalizedPoint::new(0.5, nose_y),
            NormalizedPoint::new(0.75, 0.5),
            NormalizedPoint::new(0.25, 0.5),
            FrameSize::new(1024, 1024),
        )
    }

    /// Ratio 0.75.
    fn upright() -> LandmarkObservation {
        observation(0.125)
    }

    /// Ratio 0.25.
    fn slouched() -> LandmarkObservation {
        observation(0.375)
    }

    fn unsmoothed() -> PostureEngine {
        PostureEngine::new(EngineSettings {
            smoothing_frames: 1,
            ..EngineSettings::default()
        })
    }

    /// Feeds one-second frames and keeps the session clock.
    struct Session {
        engine: PostureEngine,
        clock: Duration,
    }

    impl Session {
        fn new(engine: PostureEngine) -> Self {
            Self {
                engine,
                clock: Duration::ZERO,
            }
        }

        fn frame(&mut self, obs: Option<&LandmarkObservation>) -> FrameResult {
            self.clock += SECOND;
            self.engine.update(obs, self.clock, SECOND)
        }
    }

    #[test]
    fn test_ratio_and_keypoints() {
        let mut engine = unsmoothed();
        let result = engine.update(Some(&upright()), SECOND, SECOND);

        assert_eq!(result.status, FrameStatus::Classified);
        assert_eq!(result.smoothed_ratio, Some(0.75));
        assert_eq!(result.is_upright, Some(true));
        let keypoints = result.keypoints.unwrap();
        assert_eq!(keypoints.nose, PixelPoint { x: 512, y: 128 });
        assert_eq!(keypoints.mid_shoulder, PixelPoint { x: 512, y: 512 });
        assert_eq!(keypoints.left_shoulder, PixelPoint { x: 768, y: 512 });
        assert_eq!(keypoints.right_shoulder, PixelPoint { x: 256, y: 512 });
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // Nose 256 px above the midpoint: ratio exactly 0.5.
        let mut engine = unsmoothed();
        let result = engine.update(Some(&observation(0.25)), SECOND, SECOND);
        assert_eq!(result.smoothed_ratio, Some(0.5));
        assert_eq!(result.is_upright, Some(true));
    }

    #[test]
    fn test_upright_only_scores_100_without_alert() {
        let mut session = Session::new(PostureEngine::default());
        for _ in 0..20 {
            let result = session.frame(Some(&upright()));
            assert!(!result.alert_fired);
            assert!(!result.alert_active);
            assert_eq!(result.posture_score_percent, 100.0);
        }
        assert_eq!(session.engine.slouch_state(), SlouchState::Upright);
    }

    #[test]
    fn test_first_frame_score_is_zero_without_elapsed_time() {
        let mut engine = PostureEngine::default();
        let result = engine.update(Some(&upright()), Duration::ZERO, Duration::ZERO);
        assert_eq!(result.posture_score_percent, 0.0);
    }

    #[test]
    fn test_alert_fires_once_after_five_seconds() {
        let mut session = Session::new(unsmoothed());
        for _ in 0..3 {
            let result = session.frame(Some(&upright()));
            assert_eq!(result.posture_score_percent, 100.0);
            assert!(!result.alert_fired);
        }

        for i in 1..=4 {
            let result = session.frame(Some(&slouched()));
            assert!(!result.alert_fired, "fired early on slouch frame {i}");
            assert!(!result.alert_active);
        }

        let result = session.frame(Some(&slouched()));
        assert!(result.alert_fired);
        assert!(result.alert_active);
        assert_eq!(result.posture_score_percent, 37.5);
        assert_eq!(session.engine.slouch_start(), Some(Duration::from_secs(3)));

        for _ in 0..10 {
            let result = session.frame(Some(&slouched()));
            assert!(!result.alert_fired);
            assert!(result.alert_active);
        }
        assert!(session.engine.alert_triggered());
    }

    #[test]
    fn test_short_slouch_never_alerts() {
        let mut session = Session::new(unsmoothed());
        for _ in 0..3 {
            for _ in 0..4 {
                assert!(!session.frame(Some(&slouched())).alert_fired);
            }
            session.frame(Some(&upright()));
        }
        assert_eq!(session.engine.slouch_state(), SlouchState::Upright);
    }

    #[test]
    fn test_upright_frame_resets_streak_and_alert() {
        let mut session = Session::new(unsmoothed());
        for _ in 0..5 {
            session.frame(Some(&slouched()));
        }
        assert!(session.engine.alert_triggered());

        session.frame(Some(&upright()));
        assert!(!session.engine.alert_triggered());
        assert_eq!(session.engine.slouch_start(), None);

        session.frame(Some(&slouched()));
        assert_eq!(session.engine.slouch_start(), Some(session.clock - SECOND));
        assert!(!session.engine.alert_triggered());

        // A fresh streak alerts again.
        let fired: Vec<bool> = (0..4)
            .map(|_| session.frame(Some(&slouched())).alert_fired)
            .collect();
        assert_eq!(fired, vec![false, false, false, true]);
    }

    #[test]
    fn test_long_single_frame_alerts_immediately() {
        let mut engine = unsmoothed();
        let six = Duration::from_secs(6);
        let result = engine.update(Some(&slouched()), six, six);
        assert!(result.alert_fired);
        assert_eq!(engine.slouch_start(), Some(Duration::ZERO));
    }

    #[test]
    fn test_no_detection_leaves_state_untouched() {
        let mut session = Session::new(PostureEngine::default());
        session.frame(Some(&upright()));
        session.frame(Some(&slouched()));
        session.frame(Some(&slouched()));

        let state = session.engine.slouch_state();
        let ratio = session.engine.smoothed_ratio();
        let score = session.engine.score();
        let len = session.engine.history_len();

        for _ in 0..50 {
            let result = session.frame(None);
            assert_eq!(result.status, FrameStatus::NoDetection);
            assert!(!result.has_detection());
            assert_eq!(result.is_upright, None);
            assert_eq!(result.smoothed_ratio, None);
            assert!(!result.alert_fired);
        }

        assert_eq!(session.engine.slouch_state(), state);
        assert_eq!(session.engine.smoothed_ratio(), ratio);
        assert_eq!(session.engine.score(), score);
        assert_eq!(session.engine.history_len(), len);
    }

    #[test]
    fn test_no_detection_keeps_alert_border() {
        let mut session = Session::new(unsmoothed());
        for _ in 0..5 {
            session.frame(Some(&slouched()));
        }
        let result = session.frame(None);
        assert!(result.alert_active);
        assert!(!result.alert_fired);
    }

    #[test]
    fn test_smoothing_uses_recent_frames_only() {
        let mut engine = PostureEngine::new(EngineSettings {
            smoothing_frames: 2,
            ..EngineSettings::default()
        });
        engine.update(Some(&observation(0.0)), SECOND, SECOND); // ratio 1.0
        engine.update(Some(&slouched()), 2 * SECOND, SECOND);
        let result = engine.update(Some(&upright()), 3 * SECOND, SECOND);
        assert_eq!(result.smoothed_ratio, Some(0.5));
        assert_eq!(engine.history_len(), 2);
    }

    #[test]
    fn test_smoothing_delays_classification() {
        let mut engine = PostureEngine::default();
        for i in 1..=5 {
            engine.update(Some(&upright()), i * SECOND, SECOND);
        }
        // One slouched sample among five upright ones keeps the mean above 0.5.
        let result = engine.update(Some(&slouched()), 6 * SECOND, SECOND);
        assert_eq!(result.is_upright, Some(true));
    }

    #[test]
    fn test_coincident_shoulders_repeat_previous_result() {
        let mut session = Session::new(PostureEngine::default());
        session.frame(Some(&upright()));
        let previous = session.frame(Some(&slouched()));
        let state = session.engine.slouch_state();
        let score = session.engine.score();

        let degenerate = LandmarkObservation::new(
            NormalizedPoint::new(0.5, 0.125),
            NormalizedPoint::new(0.5, 0.5),
            NormalizedPoint::new(0.5, 0.5),
            FrameSize::new(1024, 1024),
        );
        let result = session.frame(Some(&degenerate));

        assert_eq!(result.status, FrameStatus::DegenerateGeometry);
        assert_eq!(result.is_upright, previous.is_upright);
        assert_eq!(result.smoothed_ratio, previous.smoothed_ratio);
        assert_eq!(result.posture_score_percent, previous.posture_score_percent);
        assert_eq!(result.keypoints, previous.keypoints);
        assert_eq!(session.engine.slouch_state(), state);
        assert_eq!(session.engine.score(), score);
        assert_eq!(session.engine.history_len(), 2);
    }

    #[test]
    fn test_degenerate_frame_does_not_refire_alert() {
        let mut session = Session::new(unsmoothed());
        let mut last = None;
        for _ in 0..5 {
            last = Some(session.frame(Some(&slouched())));
        }
        assert!(last.unwrap().alert_fired);

        let degenerate = LandmarkObservation::new(
            NormalizedPoint::new(0.5, 0.1),
            NormalizedPoint::new(0.3, 0.5),
            NormalizedPoint::new(0.3, 0.5),
            FrameSize::new(1024, 1024),
        );
        let result = session.frame(Some(&degenerate));
        assert!(!result.alert_fired);
        assert!(result.alert_active);
    }

    #[test]
    fn test_degenerate_first_frame() {
        let mut engine = PostureEngine::default();
        let degenerate = LandmarkObservation::new(
            NormalizedPoint::new(0.5, 0.1),
            NormalizedPoint::new(0.4, 0.5),
            NormalizedPoint::new(0.4, 0.5),
            FrameSize::new(640, 480),
        );
        let result = engine.update(Some(&degenerate), SECOND, SECOND);
        assert_eq!(result.status, FrameStatus::DegenerateGeometry);
        assert_eq!(result.is_upright, None);
        assert_eq!(result.posture_score_percent, 0.0);
        assert_eq!(engine.history_len(), 0);
    }

    #[test]
    fn test_zero_sized_frame_is_degenerate() {
        let mut engine = PostureEngine::default();
        let mut obs = upright();
        obs.frame = FrameSize::new(0, 0);
        let result = engine.update(Some(&obs), SECOND, SECOND);
        assert_eq!(result.status, FrameStatus::DegenerateGeometry);
    }

    #[test]
    fn test_score_stays_bounded() {
        let mut engine = PostureEngine::default();
        let mut now = Duration::ZERO;
        for i in 0..200u64 {
            let frame = Duration::from_millis(7 + i % 13);
            now += frame;
            let obs = if i % 3 == 0 { slouched() } else { upright() };
            let result = engine.update(Some(&obs), now, frame);
            assert!((0.0..=100.0).contains(&result.posture_score_percent));
            let score = engine.score();
            assert!(score.upright() <= score.total());
        }
    }

    #[test]
    fn test_reset_starts_new_session() {
        let mut session = Session::new(unsmoothed());
        for _ in 0..6 {
            session.frame(Some(&slouched()));
        }
        session.engine.reset();
        assert_eq!(session.engine.slouch_state(), SlouchState::Upright);
        assert_eq!(session.engine.history_len(), 0);
        assert_eq!(session.engine.score(), PostureScore::default());
        assert!(session.engine.last_result().is_none());
    }
}
