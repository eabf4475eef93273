//! Wire contracts shared by the viewer client and the analytics ingress.
//!
//! All payloads use `camelCase` field names on the wire.

use serde::{Deserialize, Serialize};

use crate::types::{AttentionScore, LectureId, ValidationError};

/// Attention classification returned by the inference collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttentionState {
    Attentive,
    NotAttentive,
}

impl AttentionState {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Attentive => "ATTENTIVE",
            Self::NotAttentive => "NOT_ATTENTIVE",
        }
    }
}

impl std::fmt::Display for AttentionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response from the attention inference collaborator.
///
/// `attention` and `state` are `null` while the collaborator is still
/// calibrating its per-viewer baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub calibrated: bool,
    #[serde(default)]
    pub attention: Option<f64>,
    #[serde(default)]
    pub state: Option<AttentionState>,
}

impl InferenceResponse {
    /// A response that carries no trusted score.
    #[must_use]
    pub const fn uncalibrated() -> Self {
        Self {
            calibrated: false,
            attention: None,
            state: None,
        }
    }
}

/// `POST attention` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionSample {
    pub lecture_id: LectureId,
    pub second: u32,
    pub score: AttentionScore,
}

/// `POST watch` body.
///
/// `delta` is signed on the wire so that negative values reach validation and
/// are rejected with a meaningful error instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchDelta {
    pub lecture_id: LectureId,
    pub delta: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

/// `POST view` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewEvent {
    pub lecture_id: LectureId,
}

/// `POST start` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartLecture {
    pub lecture_id: LectureId,
}

/// A telemetry event emitted by a viewer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Telemetry {
    Attention(AttentionSample),
    Watch(WatchDelta),
    View(ViewEvent),
}

impl Telemetry {
    /// The lecture this event belongs to.
    #[must_use]
    pub fn lecture_id(&self) -> &LectureId {
        match self {
            Self::Attention(sample) => &sample.lecture_id,
            Self::Watch(delta) => &delta.lecture_id,
            Self::View(view) => &view.lecture_id,
        }
    }

    /// Validates the event against ingress limits and converts it into a fold.
    pub fn into_fold(self, limits: &IngestLimits) -> Result<(LectureId, Fold), ValidationError> {
        match self {
            Self::Attention(sample) => {
                let fold = limits.attention(&sample)?;
                Ok((sample.lecture_id, fold))
            }
            Self::Watch(delta) => {
                let fold = limits.watch(&delta)?;
                Ok((delta.lecture_id, fold))
            }
            Self::View(view) => Ok((view.lecture_id, Fold::View)),
        }
    }
}

/// A validated mutation ready to be applied atomically to an analytics record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fold {
    /// Merge one score into the running mean of a timeline bucket.
    Attention { second: u32, score: f64 },
    /// Add seconds to the watch-time counter, recording the lecture duration if known.
    WatchTime { seconds: u32, duration: Option<u32> },
    /// Add one to the view counter.
    View,
}

/// Static bounds applied to inbound events before they reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestLimits {
    /// Largest accepted attention second when the lecture duration is unknown.
    /// Default: 86400 (24 hours).
    pub max_timeline_seconds: u32,

    /// Largest accepted watch-time delta per request.
    /// Default: 60.
    pub max_watch_delta_sec: u32,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_timeline_seconds: 86_400,
            max_watch_delta_sec: 60,
        }
    }
}

impl IngestLimits {
    /// Validates an attention sample.
    pub fn attention(&self, sample: &AttentionSample) -> Result<Fold, ValidationError> {
        if sample.second > self.max_timeline_seconds {
            return Err(ValidationError::SecondOutOfRange {
                second: sample.second,
                max: self.max_timeline_seconds,
            });
        }
        Ok(Fold::Attention {
            second: sample.second,
            score: sample.score.value(),
        })
    }

    /// Validates a watch-time delta.
    pub fn watch(&self, delta: &WatchDelta) -> Result<Fold, ValidationError> {
        if delta.delta < 0 {
            return Err(ValidationError::NegativeDelta { value: delta.delta });
        }
        let seconds = u32::try_from(delta.delta)
            .ok()
            .filter(|seconds| *seconds <= self.max_watch_delta_sec)
            .ok_or(ValidationError::DeltaTooLarge {
                value: delta.delta,
                max: self.max_watch_delta_sec,
            })?;
        Ok(Fold::WatchTime {
            seconds,
            duration: delta.duration.filter(|duration| *duration > 0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lecture() -> LectureId {
        LectureId::new("lec-1").unwrap()
    }

    #[test]
    fn attention_sample_uses_camel_case() {
        let sample = AttentionSample {
            lecture_id: lecture(),
            second: 12,
            score: AttentionScore::clamped(80.0).unwrap(),
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"lectureId": "lec-1", "second": 12, "score": 80.0})
        );
    }

    #[test]
    fn attention_sample_rejects_negative_second() {
        let json = r#"{"lectureId":"lec-1","second":-3,"score":50}"#;
        assert!(serde_json::from_str::<AttentionSample>(json).is_err());
    }

    #[test]
    fn inference_response_accepts_nulls() {
        let json = r#"{"calibrated":false,"attention":null,"state":null}"#;
        let parsed: InferenceResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, InferenceResponse::uncalibrated());

        let json = r#"{"calibrated":true,"attention":64.5,"state":"NOT_ATTENTIVE"}"#;
        let parsed: InferenceResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.state, Some(AttentionState::NotAttentive));
    }

    #[test]
    fn watch_rejects_negative_delta() {
        let delta = WatchDelta {
            lecture_id: lecture(),
            delta: -1,
            duration: Some(100),
        };
        assert_eq!(
            IngestLimits::default().watch(&delta),
            Err(ValidationError::NegativeDelta { value: -1 })
        );
    }

    #[test]
    fn watch_rejects_oversized_delta() {
        let delta = WatchDelta {
            lecture_id: lecture(),
            delta: 61,
            duration: None,
        };
        assert!(matches!(
            IngestLimits::default().watch(&delta),
            Err(ValidationError::DeltaTooLarge { value: 61, max: 60 })
        ));
    }

    #[test]
    fn watch_drops_zero_duration() {
        let delta = WatchDelta {
            lecture_id: lecture(),
            delta: 1,
            duration: Some(0),
        };
        assert_eq!(
            IngestLimits::default().watch(&delta),
            Ok(Fold::WatchTime {
                seconds: 1,
                duration: None
            })
        );
    }

    #[test]
    fn attention_rejects_second_past_limit() {
        let limits = IngestLimits {
            max_timeline_seconds: 10,
            ..IngestLimits::default()
        };
        let sample = AttentionSample {
            lecture_id: lecture(),
            second: 11,
            score: AttentionScore::MAX,
        };
        assert!(limits.attention(&sample).is_err());
    }

    #[test]
    fn telemetry_into_fold_keeps_lecture() {
        let event = Telemetry::View(ViewEvent {
            lecture_id: lecture(),
        });
        assert_eq!(event.lecture_id().as_str(), "lec-1");
        let (id, fold) = event.into_fold(&IngestLimits::default()).unwrap();
        assert_eq!(id, lecture());
        assert_eq!(fold, Fold::View);
    }
}
