//! Ephemeral per-viewer state for one lecture selection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::LectureId;

/// Media presentation chosen by the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    Video,
    Audio,
}

impl PlaybackMode {
    /// Whether attention tracking runs in this mode.
    #[must_use]
    pub const fn tracking(self) -> Tracking {
        match self {
            Self::Video => Tracking::Active,
            Self::Audio => Tracking::Suspended,
        }
    }
}

impl std::fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Video => "video",
            Self::Audio => "audio",
        })
    }
}

/// Whether the sampler and hysteresis controller are allowed to act.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracking {
    Active,
    Suspended,
}

/// Whether the inference collaborator has produced a trusted score yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationState {
    #[default]
    Calibrating,
    Calibrated,
}

/// Playback state as seen by the hysteresis controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Playing,
    AutoPaused,
}

/// State owned by one viewing session.
///
/// A session is created when a lecture is selected and replaced wholesale when
/// the lecture or playback mode changes. It is never shared between viewers.
#[derive(Debug, Clone)]
pub struct ViewerSession {
    id: Uuid,
    lecture_id: LectureId,
    mode: PlaybackMode,
    duration: Option<u32>,
    pub(crate) calibration: CalibrationState,
    pub(crate) low_count: u32,
    pub(crate) high_count: u32,
    pub(crate) auto_paused: bool,
    pub(crate) user_paused: bool,
    pub(crate) watched_seconds: BTreeSet<u32>,
    pub(crate) last_second: i64,
    pub(crate) view_sent: bool,
    pub(crate) last_score: Option<f64>,
}

impl ViewerSession {
    /// Creates a fresh session with every field at its initial value.
    #[must_use]
    pub fn new(lecture_id: LectureId, mode: PlaybackMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            lecture_id,
            mode,
            duration: None,
            calibration: CalibrationState::Calibrating,
            low_count: 0,
            high_count: 0,
            auto_paused: false,
            user_paused: false,
            watched_seconds: BTreeSet::new(),
            last_second: -1,
            view_sent: false,
            last_score: None,
        }
    }

    /// Random identifier used only to correlate log lines.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn lecture_id(&self) -> &LectureId {
        &self.lecture_id
    }

    #[must_use]
    pub const fn mode(&self) -> PlaybackMode {
        self.mode
    }

    #[must_use]
    pub const fn tracking(&self) -> Tracking {
        self.mode.tracking()
    }

    /// Lecture duration in whole seconds, once media metadata has loaded.
    #[must_use]
    pub const fn duration(&self) -> Option<u32> {
        self.duration
    }

    /// Records the media length reported by the player.
    ///
    /// The duration is floored to whole seconds. Non-finite or non-positive
    /// values leave the duration unknown.
    pub fn set_duration(&mut self, media_length: f64) {
        self.duration = floor_second(media_length)
            .and_then(|secs| u32::try_from(secs).ok())
            .filter(|secs| *secs > 0);
    }

    #[must_use]
    pub const fn calibration(&self) -> CalibrationState {
        self.calibration
    }

    #[must_use]
    pub const fn low_count(&self) -> u32 {
        self.low_count
    }

    #[must_use]
    pub const fn high_count(&self) -> u32 {
        self.high_count
    }

    #[must_use]
    pub const fn is_auto_paused(&self) -> bool {
        self.auto_paused
    }

    #[must_use]
    pub const fn is_user_paused(&self) -> bool {
        self.user_paused
    }

    #[must_use]
    pub const fn control_state(&self) -> ControlState {
        if self.auto_paused {
            ControlState::AutoPaused
        } else {
            ControlState::Playing
        }
    }

    /// Seconds confirmed as forward-watched in this session.
    #[must_use]
    pub const fn watched_seconds(&self) -> &BTreeSet<u32> {
        &self.watched_seconds
    }

    /// Last observed playback second, or -1 before the first tick.
    #[must_use]
    pub const fn last_second(&self) -> i64 {
        self.last_second
    }

    #[must_use]
    pub const fn view_sent(&self) -> bool {
        self.view_sent
    }

    /// Most recent calibrated score, for display.
    #[must_use]
    pub const fn last_score(&self) -> Option<f64> {
        self.last_score
    }

    /// Fraction of the lecture confirmed as forward-watched.
    #[must_use]
    pub fn coverage(&self) -> Option<f64> {
        let duration = self.duration?;
        #[allow(
            clippy::cast_precision_loss,
            reason = "watched seconds are bounded by lecture duration"
        )]
        let watched = self.watched_seconds.len() as f64;
        Some(watched / f64::from(duration))
    }
}

/// Floors a playback time to a whole second.
///
/// Returns `None` for negative or non-finite times.
#[must_use]
pub fn floor_second(time: f64) -> Option<i64> {
    if !time.is_finite() || time < 0.0 {
        return None;
    }
    #[allow(
        clippy::cast_possible_truncation,
        reason = "playback positions are far below i64::MAX seconds"
    )]
    let second = time.floor() as i64;
    Some(second)
}
