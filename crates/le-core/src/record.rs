//! Per-lecture analytics record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::LectureId;

/// Running mean of every accepted attention score at one playback second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionPoint {
    /// Arithmetic mean of all accepted samples, in \[0.0, 100.0\].
    pub avg_score: f64,
    /// Number of samples folded into `avg_score`. Only ever increases.
    pub samples: u64,
}

impl AttentionPoint {
    /// Returns the point after folding in one more score.
    ///
    /// The store evaluates the same expression server-side; this is the
    /// reference definition.
    #[must_use]
    pub fn folded(self, score: f64) -> Self {
        #[allow(clippy::cast_precision_loss, reason = "sample counts stay far below 2^52")]
        let samples = self.samples as f64;
        Self {
            avg_score: (self.avg_score * samples + score) / (samples + 1.0),
            samples: self.samples + 1,
        }
    }
}

/// Durable statistics for one lecture.
///
/// Read snapshots of lectures that have never received an event are
/// zero-valued with no timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRecord {
    pub lecture_id: LectureId,
    pub total_views: u64,
    pub total_watch_time_sec: u64,
    /// Largest lecture duration reported by watch events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u32>,
    /// Playback second to running mean.
    #[serde(default)]
    pub attention_timeline: BTreeMap<u32, AttentionPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AnalyticsRecord {
    /// Creates a zero-valued record.
    #[must_use]
    pub fn empty(lecture_id: LectureId) -> Self {
        Self {
            lecture_id,
            total_views: 0,
            total_watch_time_sec: 0,
            duration_sec: None,
            attention_timeline: BTreeMap::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Mean of the per-second averages, weighting each second equally.
    #[must_use]
    pub fn mean_attention(&self) -> Option<f64> {
        if self.attention_timeline.is_empty() {
            return None;
        }
        let sum: f64 = self
            .attention_timeline
            .values()
            .map(|point| point.avg_score)
            .sum();
        #[allow(
            clippy::cast_precision_loss,
            reason = "timeline length is bounded by lecture duration"
        )]
        let len = self.attention_timeline.len() as f64;
        Some(sum / len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folded_matches_arithmetic_mean() {
        let scores = [80.0, 20.0, 50.0, 100.0, 0.0];
        let point = scores
            .iter()
            .fold(AttentionPoint::default(), |point, score| point.folded(*score));
        assert_eq!(point.samples, 5);
        assert!((point.avg_score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn folded_is_order_independent() {
        let forward = [10.0, 90.0, 33.0]
            .iter()
            .fold(AttentionPoint::default(), |p, s| p.folded(*s));
        let reverse = [33.0, 90.0, 10.0]
            .iter()
            .fold(AttentionPoint::default(), |p, s| p.folded(*s));
        assert_eq!(forward.samples, reverse.samples);
        assert!((forward.avg_score - reverse.avg_score).abs() < 1e-9);
    }

    #[test]
    fn record_serializes_timeline_with_string_keys() {
        let mut record = AnalyticsRecord::empty(LectureId::new("lec-1").unwrap());
        record.total_views = 2;
        record.attention_timeline.insert(
            3,
            AttentionPoint {
                avg_score: 72.0,
                samples: 4,
            },
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "lectureId": "lec-1",
                "totalViews": 2,
                "totalWatchTimeSec": 0,
                "attentionTimeline": {"3": {"avgScore": 72.0, "samples": 4}}
            })
        );
        let parsed: AnalyticsRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn mean_attention_weights_seconds_equally() {
        let mut record = AnalyticsRecord::empty(LectureId::new("lec-1").unwrap());
        assert_eq!(record.mean_attention(), None);
        record.attention_timeline.insert(
            0,
            AttentionPoint {
                avg_score: 40.0,
                samples: 10,
            },
        );
        record.attention_timeline.insert(
            1,
            AttentionPoint {
                avg_score: 80.0,
                samples: 1,
            },
        );
        let mean = record.mean_attention().unwrap();
        assert!((mean - 60.0).abs() < 1e-9);
    }
}
