//! Client-side viewing session driver.
//!
//! [`Viewer`] wires the sampler, hysteresis controller, watch-time tracker and
//! view gate to a media player, a camera and two remote collaborators. It runs
//! on a single cooperative timeline. [`Viewer::run`] owns the timers and the
//! one inference call that may be in flight; a result is applied only to the
//! session whose frame it scored.
//!
//! Telemetry is fire-and-forget. [`TelemetrySink::send`] must not block and
//! has no way to report failure back to the viewer.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use crate::event::{InferenceResponse, Telemetry};
use crate::hysteresis::{self, HysteresisConfig, PlayerCommand};
use crate::sampler::{self, PlayerStatus, SamplerConfig, SkipReason};
use crate::session::{PlaybackMode, ViewerSession};
use crate::types::LectureId;
use crate::watch::{self, TickOutcome, ViewGate};

/// Attention sampling period.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Playback position polling period for watch tracking.
pub const POSITION_PERIOD: Duration = Duration::from_millis(250);

/// The media element being watched.
pub trait MediaPlayer {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn is_ended(&self) -> bool;
    fn pause(&mut self);
    fn play(&mut self);
}

/// Source of still camera frames.
pub trait FrameSource {
    /// Captures one encoded frame, or `None` when no camera is available.
    fn capture(&mut self) -> Option<Vec<u8>>;
}

/// The external attention inference collaborator.
pub trait AttentionScorer {
    type Error: std::fmt::Display;

    fn score(
        &self,
        frame: Vec<u8>,
        lecture_id: &LectureId,
    ) -> impl Future<Output = Result<InferenceResponse, Self::Error>> + Send;
}

/// Best-effort destination for telemetry events.
pub trait TelemetrySink {
    fn send(&self, event: Telemetry);
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Telemetry>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns all recorded events.
    pub fn drain(&self) -> Vec<Telemetry> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *events)
    }
}

impl TelemetrySink for RecordingSink {
    fn send(&self, event: Telemetry) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Viewer-side tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Consecutive inattentive samples before auto-pause. Default: 5.
    pub pause_threshold: u32,
    /// Consecutive attentive samples before auto-resume. Default: 3.
    pub resume_threshold: u32,
    /// Coverage required for a view. Default: 0.5.
    pub view_ratio: f64,
    /// Minimum frame size in bytes. Default: 1000.
    pub min_frame_bytes: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let hysteresis = HysteresisConfig::default();
        Self {
            pause_threshold: hysteresis.pause_threshold,
            resume_threshold: hysteresis.resume_threshold,
            view_ratio: ViewGate::default().ratio,
            min_frame_bytes: SamplerConfig::default().min_frame_bytes,
        }
    }
}

impl ViewerConfig {
    fn hysteresis(&self) -> HysteresisConfig {
        HysteresisConfig {
            pause_threshold: self.pause_threshold,
            resume_threshold: self.resume_threshold,
        }
    }

    fn view_gate(&self) -> ViewGate {
        ViewGate {
            ratio: self.view_ratio,
        }
    }

    fn sampler(&self) -> SamplerConfig {
        SamplerConfig {
            min_frame_bytes: self.min_frame_bytes,
        }
    }
}

/// What one sampling tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleReport {
    /// No lecture selected.
    NoSession,
    Skipped(SkipReason),
    /// The inference call failed; treated as uncalibrated.
    Failed,
    /// The session changed while the call was in flight.
    Discarded,
    Uncalibrated,
    Sampled {
        score: Option<f64>,
        command: Option<PlayerCommand>,
    },
}

/// Lifecycle input for [`Viewer::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerInput {
    SelectLecture(LectureId),
    SetMode(PlaybackMode),
    /// Media length in seconds, once metadata loads.
    Metadata(f64),
    UserPause,
    UserResume,
    Leave,
}

/// Where a captured frame came from.
#[derive(Debug, Clone)]
struct SampleTicket {
    session: Uuid,
    lecture_id: LectureId,
    playback_time: f64,
}

/// What one playback-position tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionReport {
    pub outcome: TickOutcome,
    /// Whether this tick qualified the session as a view.
    pub view_sent: bool,
}

/// Drives one viewer's analytics session.
#[derive(Debug)]
pub struct Viewer<A, T> {
    config: ViewerConfig,
    mode: PlaybackMode,
    session: Option<ViewerSession>,
    scorer: A,
    telemetry: T,
}

impl<A: AttentionScorer, T: TelemetrySink> Viewer<A, T> {
    pub fn new(config: ViewerConfig, scorer: A, telemetry: T) -> Self {
        Self {
            config,
            mode: PlaybackMode::default(),
            session: None,
            scorer,
            telemetry,
        }
    }

    #[must_use]
    pub const fn session(&self) -> Option<&ViewerSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub const fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub const fn telemetry(&self) -> &T {
        &self.telemetry
    }

    pub const fn scorer(&self) -> &A {
        &self.scorer
    }

    /// Starts a fresh session for `lecture_id`, discarding any previous one.
    pub fn select_lecture(&mut self, lecture_id: LectureId) {
        let session = ViewerSession::new(lecture_id, self.mode);
        tracing::debug!(
            session = %session.id(),
            lecture_id = %session.lecture_id(),
            mode = %self.mode,
            "viewer session started"
        );
        self.session = Some(session);
    }

    /// Switches between video and audio. Resets the session when the mode changes.
    pub fn set_mode(&mut self, mode: PlaybackMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        if let Some(lecture_id) = self.session.as_ref().map(|s| s.lecture_id().clone()) {
            self.select_lecture(lecture_id);
        }
    }

    /// Discards the session when the viewer navigates away.
    pub fn leave(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(session = %session.id(), "viewer session discarded");
        }
    }

    /// Media metadata loaded; `media_length` is the full duration in seconds.
    pub fn on_metadata(&mut self, media_length: f64) {
        if let Some(session) = self.session.as_mut() {
            session.set_duration(media_length);
        }
    }

    pub fn user_pause(&mut self) {
        if let Some(session) = self.session.as_mut() {
            hysteresis::user_paused(session);
        }
    }

    pub fn user_resume(&mut self) {
        if let Some(session) = self.session.as_mut() {
            hysteresis::user_resumed(session);
        }
    }

    /// Handles a playback-position update from the player.
    ///
    /// Emits a watch delta for credited seconds and, once per session, a view
    /// event when coverage crosses the threshold.
    pub fn on_time_update(&mut self, player: &impl MediaPlayer) -> Option<PositionReport> {
        let session = self.session.as_mut()?;
        let outcome = watch::track_position(session, player.current_time());
        let Some(delta) = watch::watch_delta(session, outcome) else {
            return Some(PositionReport {
                outcome,
                view_sent: false,
            });
        };
        self.telemetry.send(Telemetry::Watch(delta));

        // The gate flips `view_sent` before the event leaves this function.
        let view = self.config.view_gate().check(session);
        let view_sent = view.is_some();
        if let Some(view) = view {
            tracing::debug!(session = %session.id(), "view qualified");
            self.telemetry.send(Telemetry::View(view));
        }
        Some(PositionReport { outcome, view_sent })
    }

    /// Applies a lifecycle input. Returns whether the sampling timer must be
    /// re-armed.
    fn apply_input(&mut self, input: ViewerInput) -> bool {
        match input {
            ViewerInput::SelectLecture(lecture_id) => {
                self.select_lecture(lecture_id);
                true
            }
            ViewerInput::SetMode(mode) => {
                let changed = mode != self.mode;
                self.set_mode(mode);
                changed
            }
            ViewerInput::Metadata(media_length) => {
                self.on_metadata(media_length);
                false
            }
            ViewerInput::UserPause => {
                self.user_pause();
                false
            }
            ViewerInput::UserResume => {
                self.user_resume();
                false
            }
            ViewerInput::Leave => {
                self.leave();
                true
            }
        }
    }

    /// Runs one 1 Hz sampling cycle.
    ///
    /// Dropping the returned future abandons the inference call; its result is
    /// never applied.
    pub async fn sample_tick(
        &mut self,
        player: &mut impl MediaPlayer,
        frames: &mut impl FrameSource,
    ) -> SampleReport {
        let (frame, ticket) = match self.begin_sample(&*player, frames) {
            Ok(pending) => pending,
            Err(report) => return report,
        };
        let result = self.scorer.score(frame, &ticket.lecture_id).await;
        self.finish_sample(player, ticket, result)
    }

    /// Captures a frame if the session and player allow sampling.
    fn begin_sample(
        &self,
        player: &impl MediaPlayer,
        frames: &mut impl FrameSource,
    ) -> Result<(Vec<u8>, SampleTicket), SampleReport> {
        let session = self.session.as_ref().ok_or(SampleReport::NoSession)?;
        let status = PlayerStatus {
            paused: player.is_paused(),
            ended: player.is_ended(),
        };
        sampler::precheck(session, status).map_err(SampleReport::Skipped)?;
        let frame = frames.capture();
        sampler::check_frame(&self.config.sampler(), frame.as_deref())
            .map_err(SampleReport::Skipped)?;
        let frame = frame.ok_or(SampleReport::Skipped(SkipReason::NoFrame))?;

        let ticket = SampleTicket {
            session: session.id(),
            lecture_id: session.lecture_id().clone(),
            playback_time: player.current_time(),
        };
        Ok((frame, ticket))
    }

    /// Applies an inference result to the session the frame was captured in.
    fn finish_sample<E: std::fmt::Display>(
        &mut self,
        player: &mut impl MediaPlayer,
        ticket: SampleTicket,
        result: Result<InferenceResponse, E>,
    ) -> SampleReport {
        let Some(session) = self
            .session
            .as_mut()
            .filter(|session| session.id() == ticket.session)
        else {
            tracing::debug!(session = %ticket.session, "stale inference result dropped");
            return SampleReport::Discarded;
        };
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(
                    error = %err,
                    lecture_id = %ticket.lecture_id,
                    "inference call failed"
                );
                return SampleReport::Failed;
            }
        };
        if !response.calibrated {
            return SampleReport::Uncalibrated;
        }
        let outcome = sampler::apply_response(session, &response, ticket.playback_time);
        if let Some(sample) = outcome.sample {
            self.telemetry.send(Telemetry::Attention(sample));
        }

        let media_playing = !player.is_paused() && !player.is_ended();
        let command = outcome.state.and_then(|state| {
            hysteresis::observe(&self.config.hysteresis(), session, state, media_playing)
        });
        match command {
            Some(PlayerCommand::Pause) => player.pause(),
            Some(PlayerCommand::Resume) => player.play(),
            None => {}
        }
        if let Some(command) = command {
            tracing::debug!(session = %session.id(), %command, "playback command issued");
        }

        SampleReport::Sampled {
            score: session.last_score(),
            command,
        }
    }
}

type InFlight = Pin<Box<dyn Future<Output = Result<InferenceResponse, String>> + Send>>;

impl<A, T> Viewer<A, T>
where
    A: AttentionScorer + Clone + Send + Sync + 'static,
    T: TelemetrySink,
{
    /// Drives the viewer until `inputs` closes.
    ///
    /// Samples every [`SAMPLE_PERIOD`] and polls the playback position every
    /// [`POSITION_PERIOD`]. At most one inference call is in flight. Selecting
    /// a lecture, changing mode or leaving re-arms the sampling timer and
    /// abandons that call.
    pub async fn run(
        &mut self,
        player: &mut impl MediaPlayer,
        frames: &mut impl FrameSource,
        mut inputs: mpsc::Receiver<ViewerInput>,
    ) {
        let mut sampling = time::interval(SAMPLE_PERIOD);
        sampling.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut position = time::interval(POSITION_PERIOD);
        position.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<(SampleTicket, InFlight)> = None;

        loop {
            tokio::select! {
                biased;

                input = inputs.recv() => {
                    let Some(input) = input else { break };
                    if self.apply_input(input) {
                        if let Some((ticket, _)) = in_flight.take() {
                            tracing::debug!(session = %ticket.session, "in-flight sample abandoned");
                        }
                        sampling.reset();
                    }
                }
                result = in_flight_result(&mut in_flight), if in_flight.is_some() => {
                    if let Some((ticket, _)) = in_flight.take() {
                        let report = self.finish_sample(player, ticket, result);
                        tracing::trace!(?report, "sample finished");
                    }
                }
                _ = position.tick() => {
                    self.on_time_update(&*player);
                }
                _ = sampling.tick(), if in_flight.is_none() => {
                    match self.begin_sample(&*player, frames) {
                        Ok((frame, ticket)) => {
                            let scorer = self.scorer.clone();
                            let lecture_id = ticket.lecture_id.clone();
                            let call: InFlight = Box::pin(async move {
                                scorer
                                    .score(frame, &lecture_id)
                                    .await
                                    .map_err(|err| err.to_string())
                            });
                            in_flight = Some((ticket, call));
                        }
                        Err(report) => tracing::trace!(?report, "sample skipped"),
                    }
                }
            }
        }
    }
}

async fn in_flight_result(
    in_flight: &mut Option<(SampleTicket, InFlight)>,
) -> Result<InferenceResponse, String> {
    match in_flight {
        Some((_, call)) => call.await,
        None => std::future::pending().await,
    }
}
