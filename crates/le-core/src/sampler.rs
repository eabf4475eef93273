//! Attention sampling decisions.
//!
//! The sampler runs once per second. It decides whether a frame is worth
//! sending to the inference collaborator and turns the collaborator's response
//! into session updates plus an outbound attention sample.

use serde::{Deserialize, Serialize};

use crate::event::{AttentionSample, AttentionState, InferenceResponse};
use crate::session::{CalibrationState, Tracking, ViewerSession, floor_second};
use crate::types::AttentionScore;

/// Sampler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Frames smaller than this are treated as empty (camera warming up or a
    /// black frame). Default: 1000 bytes.
    pub min_frame_bytes: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_frame_bytes: 1000,
        }
    }
}

/// Why a sampling tick did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Audio-only mode.
    TrackingSuspended,
    /// Player paused by the viewer, or ended.
    PlayerInactive,
    /// No camera frame available.
    NoFrame,
    /// Frame below the minimum byte size.
    FrameTooSmall { bytes: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TrackingSuspended => f.write_str("tracking suspended"),
            Self::PlayerInactive => f.write_str("player inactive"),
            Self::NoFrame => f.write_str("no frame"),
            Self::FrameTooSmall { bytes } => write!(f, "frame too small ({bytes} bytes)"),
        }
    }
}

/// Player state relevant to the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerStatus {
    pub paused: bool,
    pub ended: bool,
}

/// Checks whether the sampler may run before a frame is captured.
///
/// A player paused by the hysteresis controller keeps being sampled, since
/// auto-resume depends on fresh attentive samples.
pub fn precheck(session: &ViewerSession, player: PlayerStatus) -> Result<(), SkipReason> {
    if session.tracking() == Tracking::Suspended {
        return Err(SkipReason::TrackingSuspended);
    }
    if player.ended || (player.paused && !session.is_auto_paused()) {
        return Err(SkipReason::PlayerInactive);
    }
    Ok(())
}

/// Checks a captured frame.
pub fn check_frame(config: &SamplerConfig, frame: Option<&[u8]>) -> Result<(), SkipReason> {
    let frame = frame.ok_or(SkipReason::NoFrame)?;
    if frame.len() < config.min_frame_bytes {
        return Err(SkipReason::FrameTooSmall { bytes: frame.len() });
    }
    Ok(())
}

/// What a calibrated inference response produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleOutcome {
    /// Sample to report to the aggregator.
    pub sample: Option<AttentionSample>,
    /// Classification for the hysteresis controller.
    pub state: Option<AttentionState>,
}

impl SampleOutcome {
    const NONE: Self = Self {
        sample: None,
        state: None,
    };
}

/// Applies an inference response to the session.
///
/// Uncalibrated responses leave the session untouched. `playback_time` is the
/// player position when the frame was captured.
pub fn apply_response(
    session: &mut ViewerSession,
    response: &InferenceResponse,
    playback_time: f64,
) -> SampleOutcome {
    if !response.calibrated {
        return SampleOutcome::NONE;
    }
    session.calibration = CalibrationState::Calibrated;

    let score = response
        .attention
        .and_then(|value| AttentionScore::clamped(value).ok());
    if let Some(score) = score {
        session.last_score = Some(score.value());
    }

    let second = floor_second(playback_time).and_then(|second| u32::try_from(second).ok());
    let sample = score.zip(second).map(|(score, second)| AttentionSample {
        lecture_id: session.lecture_id().clone(),
        second,
        score,
    });

    SampleOutcome {
        sample,
        state: response.state,
    }
}
