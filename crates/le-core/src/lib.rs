//! Core domain logic for lecture engagement analytics.
//!
//! This crate contains the fundamental types and logic for:
//! - Wire contracts: attention samples, watch-time deltas and view events
//! - Viewer sessions: sampling, hysteresis pause/resume, watch-time tracking
//! - Analytics records: the durable per-lecture statistics and their folds

pub mod event;
mod hysteresis;
pub mod record;
mod sampler;
pub mod session;
pub mod types;
pub mod viewer;
mod watch;

pub use event::{
    AttentionSample, AttentionState, Fold, InferenceResponse, IngestLimits, StartLecture,
    Telemetry, ViewEvent, WatchDelta,
};
pub use hysteresis::{HysteresisConfig, PlayerCommand, observe, user_paused, user_resumed};
pub use record::{AnalyticsRecord, AttentionPoint};
pub use sampler::{
    PlayerStatus, SampleOutcome, SamplerConfig, SkipReason, apply_response, check_frame, precheck,
};
pub use session::{
    CalibrationState, ControlState, PlaybackMode, Tracking, ViewerSession, floor_second,
};
pub use types::{AttentionScore, LectureId, MAX_LECTURE_ID_LEN, ValidationError};
pub use viewer::{
    AttentionScorer, FrameSource, MediaPlayer, POSITION_PERIOD, PositionReport, RecordingSink,
    SAMPLE_PERIOD, SampleReport, TelemetrySink, Viewer, ViewerConfig, ViewerInput,
};
pub use watch::{TickOutcome, ViewGate, track_position, watch_delta};
