//! Watch-time tracking and view qualification.
//!
//! Only strictly adjacent forward ticks (`n` then `n + 1`) earn credit, so
//! scrubbing or seeking cannot inflate watch time. Repeated ticks inside the
//! same second are free.

use serde::{Deserialize, Serialize};

use crate::event::{ViewEvent, WatchDelta};
use crate::session::{ViewerSession, floor_second};

/// Result of feeding one playback-position tick to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Same second as the previous tick.
    Duplicate,
    /// The second was confirmed as forward-watched.
    Credited { second: u32 },
    /// Seek backwards or jump forward by more than one second.
    Skipped { second: u32 },
    /// Negative or non-finite playback time; the cursor is not moved.
    Invalid,
}

/// Applies one playback-position tick to the session.
pub fn track_position(session: &mut ViewerSession, playback_time: f64) -> TickOutcome {
    let Some(current) = floor_second(playback_time) else {
        return TickOutcome::Invalid;
    };
    let Ok(second) = u32::try_from(current) else {
        return TickOutcome::Invalid;
    };

    let previous = session.last_second;
    session.last_second = current;

    if current == previous {
        TickOutcome::Duplicate
    } else if current == previous + 1 {
        session.watched_seconds.insert(second);
        TickOutcome::Credited { second }
    } else {
        TickOutcome::Skipped { second }
    }
}

/// The watch-time delta to report for a credited tick.
#[must_use]
pub fn watch_delta(session: &ViewerSession, outcome: TickOutcome) -> Option<WatchDelta> {
    match outcome {
        TickOutcome::Credited { .. } => Some(WatchDelta {
            lecture_id: session.lecture_id().clone(),
            delta: 1,
            duration: session.duration(),
        }),
        _ => None,
    }
}

/// Coverage required before a session counts as a view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewGate {
    /// Fraction of the lecture that must be forward-watched. Default: 0.5.
    pub ratio: f64,
}

impl Default for ViewGate {
    fn default() -> Self {
        Self { ratio: 0.5 }
    }
}

impl ViewGate {
    /// Fires the one-time view event once coverage crosses the threshold.
    ///
    /// `view_sent` is set before the event is returned, so the caller can
    /// never observe two qualifying checks for one session regardless of when
    /// the resulting network call completes. An unknown duration never
    /// qualifies.
    pub fn check(&self, session: &mut ViewerSession) -> Option<ViewEvent> {
        if session.view_sent {
            return None;
        }
        if session.coverage()? < self.ratio {
            return None;
        }
        session.view_sent = true;
        Some(ViewEvent {
            lecture_id: session.lecture_id().clone(),
        })
    }
}
