//! Replay command: drives a recorded viewing trace through the viewer.
//!
//! A trace is JSONL, one step per line, tagged by `step`:
//!
//! ```text
//! {"step":"select","lectureId":"intro-to-sql"}
//! {"step":"metadata","duration":600}
//! {"step":"tick","time":0.25}
//! {"step":"sample","time":0.5,"response":{"calibrated":true,"attention":82,"state":"ATTENTIVE"}}
//! {"step":"sample","response":null}
//! {"step":"pause"}
//! ```
//!
//! A `sample` with a null or missing `response` simulates an unreachable
//! inference service. Blank lines and lines starting with `#` are skipped.

use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use le_client::IngressClient;
use le_core::{
    AttentionScorer, FrameSource, IngestLimits, InferenceResponse, LectureId, MediaPlayer,
    PlaybackMode, PlayerCommand, RecordingSink, SampleReport, Telemetry, Viewer, ViewerConfig,
    floor_second,
};
use le_db::{Database, DbError};
use serde::Deserialize;

use super::util::format_clock;

/// Frame size used when a sample step does not specify one.
const DEFAULT_FRAME_BYTES: usize = 4096;

const fn default_frame_bytes() -> usize {
    DEFAULT_FRAME_BYTES
}

/// One recorded viewer action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Step {
    Select {
        lecture_id: LectureId,
    },
    Metadata {
        duration: f64,
    },
    Mode {
        mode: PlaybackMode,
    },
    Tick {
        time: f64,
    },
    Sample {
        time: Option<f64>,
        #[serde(default = "default_frame_bytes")]
        frame_bytes: usize,
        response: Option<InferenceResponse>,
    },
    Pause,
    Resume,
    End,
    Leave,
}

/// Parses a trace, keeping 1-based line numbers.
pub fn parse_trace(input: &str) -> Result<Vec<(usize, Step)>> {
    input
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid trace step on line {line_no}"))
                .map(|step| (line_no, step))
        })
        .collect()
}

#[derive(Debug, Default)]
struct TracePlayer {
    time: f64,
    paused: bool,
    ended: bool,
}

impl MediaPlayer for TracePlayer {
    fn current_time(&self) -> f64 {
        self.time
    }
    fn is_paused(&self) -> bool {
        self.paused
    }
    fn is_ended(&self) -> bool {
        self.ended
    }
    fn pause(&mut self) {
        self.paused = true;
    }
    fn play(&mut self) {
        self.paused = false;
    }
}

struct TraceCamera {
    frame_bytes: usize,
}

impl FrameSource for TraceCamera {
    fn capture(&mut self) -> Option<Vec<u8>> {
        (self.frame_bytes > 0).then(|| vec![0; self.frame_bytes])
    }
}

/// Answers with the response recorded for the current sample step.
#[derive(Default)]
struct TraceScorer {
    next: Mutex<Option<InferenceResponse>>,
}

impl TraceScorer {
    fn set(&self, response: Option<InferenceResponse>) {
        *self.next.lock().unwrap_or_else(PoisonError::into_inner) = response;
    }
}

impl AttentionScorer for TraceScorer {
    type Error = &'static str;

    fn score(
        &self,
        _frame: Vec<u8>,
        _lecture_id: &LectureId,
    ) -> impl Future<Output = Result<InferenceResponse, &'static str>> + Send {
        let next = self
            .next
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        std::future::ready(next.ok_or("inference unavailable"))
    }
}

/// A playback command issued during replay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IssuedCommand {
    pub line: usize,
    pub time: f64,
    pub command: PlayerCommand,
}

/// Everything a replay produced.
#[derive(Debug, Default)]
pub struct ReplayReport {
    pub steps: usize,
    pub commands: Vec<IssuedCommand>,
    pub telemetry: Vec<Telemetry>,
}

/// Runs the steps through a fresh viewer.
pub async fn replay(steps: &[(usize, Step)], config: ViewerConfig) -> ReplayReport {
    let mut viewer = Viewer::new(config, TraceScorer::default(), RecordingSink::new());
    let mut player = TracePlayer::default();
    let mut report = ReplayReport {
        steps: steps.len(),
        ..ReplayReport::default()
    };

    for (line, step) in steps {
        match step {
            Step::Select { lecture_id } => {
                player = TracePlayer::default();
                viewer.select_lecture(lecture_id.clone());
            }
            Step::Metadata { duration } => viewer.on_metadata(*duration),
            Step::Mode { mode } => viewer.set_mode(*mode),
            Step::Tick { time } => {
                player.time = *time;
                viewer.on_time_update(&player);
            }
            Step::Sample {
                time,
                frame_bytes,
                response,
            } => {
                if let Some(time) = time {
                    player.time = *time;
                }
                viewer.scorer().set(*response);
                let mut camera = TraceCamera {
                    frame_bytes: *frame_bytes,
                };
                let outcome = viewer.sample_tick(&mut player, &mut camera).await;
                tracing::trace!(line, ?outcome, "sample step");
                if let SampleReport::Sampled {
                    command: Some(command),
                    ..
                } = outcome
                {
                    report.commands.push(IssuedCommand {
                        line: *line,
                        time: player.time,
                        command,
                    });
                }
            }
            Step::Pause => {
                player.pause();
                viewer.user_pause();
            }
            Step::Resume => {
                player.play();
                viewer.user_resume();
            }
            Step::End => player.ended = true,
            Step::Leave => viewer.leave(),
        }
    }

    report.telemetry = viewer.telemetry().drain();
    report
}

/// Counts of folded and rejected events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldSummary {
    pub folded: usize,
    pub rejected: usize,
}

/// Folds telemetry into the local store, skipping events the ingress would reject.
pub fn fold_events(
    db: &mut Database,
    limits: &IngestLimits,
    events: Vec<Telemetry>,
) -> Result<FoldSummary> {
    let mut summary = FoldSummary::default();
    for event in events {
        let (lecture_id, fold) = match event.into_fold(limits) {
            Ok(folded) => folded,
            Err(err) => {
                tracing::warn!(error = %err, "event rejected");
                summary.rejected += 1;
                continue;
            }
        };
        match db.fold(&lecture_id, &fold) {
            Ok(()) => summary.folded += 1,
            Err(err @ DbError::SecondOutOfRange { .. }) => {
                tracing::warn!(error = %err, "event rejected");
                summary.rejected += 1;
            }
            Err(err) => return Err(err).context("failed to fold event"),
        }
    }
    Ok(summary)
}

/// Where replayed telemetry goes.
pub enum Target<'a> {
    Local {
        db: &'a mut Database,
        path: &'a Path,
        limits: IngestLimits,
    },
    Ingress(IngressClient),
}

pub fn format_report(report: &ReplayReport) -> String {
    let mut lines = vec![format!("Replayed {} steps", report.steps)];
    if report.commands.is_empty() {
        lines.push("Commands: none".to_string());
    } else {
        lines.push("Commands:".to_string());
        for issued in &report.commands {
            let at = floor_second(issued.time)
                .and_then(|second| u32::try_from(second).ok())
                .map_or_else(|| "?".to_string(), format_clock);
            lines.push(format!(
                "  line {} ({at}): {}",
                issued.line, issued.command
            ));
        }
    }

    let (mut watch, mut attention, mut views) = (0, 0, 0);
    for event in &report.telemetry {
        match event {
            Telemetry::Watch(_) => watch += 1,
            Telemetry::Attention(_) => attention += 1,
            Telemetry::View(_) => views += 1,
        }
    }
    lines.push(format!(
        "Telemetry: {watch} watch, {attention} attention, {views} view"
    ));
    lines.join("\n")
}

pub fn run<W: Write>(
    writer: &mut W,
    trace: &Path,
    viewer: ViewerConfig,
    target: Target<'_>,
) -> Result<()> {
    let input = std::fs::read_to_string(trace)
        .with_context(|| format!("failed to read {}", trace.display()))?;
    let steps = parse_trace(&input)?;

    let rt = tokio::runtime::Runtime::new().context("failed to create async runtime")?;
    let report = rt.block_on(replay(&steps, viewer));
    writeln!(writer, "{}", format_report(&report))?;

    match target {
        Target::Local { db, path, limits } => {
            let summary = fold_events(db, &limits, report.telemetry)?;
            writeln!(
                writer,
                "Folded {} events into {} ({} rejected)",
                summary.folded,
                path.display(),
                summary.rejected
            )?;
        }
        Target::Ingress(client) => {
            let delivery = rt.block_on(client.deliver(&report.telemetry));
            writeln!(
                writer,
                "Posted {} events ({} dropped)",
                delivery.sent, delivery.dropped
            )?;
        }
    }
    Ok(())
}
