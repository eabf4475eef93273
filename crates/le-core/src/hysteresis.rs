//! Auto-pause / auto-resume controller.
//!
//! Two independent thresholds keep a single noisy sample from toggling
//! playback:
//!
//! - `pause_threshold` consecutive `NOT_ATTENTIVE` samples pause a playing
//!   player.
//! - `resume_threshold` consecutive `ATTENTIVE` samples resume a player that
//!   this controller paused, unless the viewer paused it by hand.
//!
//! Both transitions are edge-triggered: once the player is paused (or resumed)
//! further samples past the threshold issue nothing.

use serde::{Deserialize, Serialize};

use crate::event::AttentionState;
use crate::session::{Tracking, ViewerSession};

/// Thresholds for the hysteresis controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HysteresisConfig {
    /// Consecutive inattentive samples before pausing. Default: 5.
    pub pause_threshold: u32,
    /// Consecutive attentive samples before resuming. Default: 3.
    pub resume_threshold: u32,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            pause_threshold: 5,
            resume_threshold: 3,
        }
    }
}

/// A command for the media player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerCommand {
    Pause,
    Resume,
}

impl std::fmt::Display for PlayerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
        })
    }
}

/// Feeds one classified sample into the session's counters.
///
/// `media_playing` is the player's state at the time of the sample. Returns
/// the command to issue, if any. Samples are ignored while tracking is
/// suspended.
pub fn observe(
    config: &HysteresisConfig,
    session: &mut ViewerSession,
    state: AttentionState,
    media_playing: bool,
) -> Option<PlayerCommand> {
    if session.tracking() == Tracking::Suspended {
        return None;
    }

    match state {
        AttentionState::NotAttentive => {
            session.low_count = session.low_count.saturating_add(1);
            session.high_count = 0;
            if session.low_count >= config.pause_threshold && media_playing {
                session.auto_paused = true;
                return Some(PlayerCommand::Pause);
            }
        }
        AttentionState::Attentive => {
            session.high_count = session.high_count.saturating_add(1);
            session.low_count = 0;
            if session.high_count >= config.resume_threshold
                && session.auto_paused
                && !session.user_paused
            {
                session.auto_paused = false;
                return Some(PlayerCommand::Resume);
            }
        }
    }
    None
}

/// Records a manual pause. Suppresses auto-resume until the viewer resumes.
pub fn user_paused(session: &mut ViewerSession) {
    session.user_paused = true;
}

/// Records a manual resume.
///
/// The player is playing again, so any pending auto-pause is void as well.
pub fn user_resumed(session: &mut ViewerSession) {
    session.user_paused = false;
    session.auto_paused = false;
}
