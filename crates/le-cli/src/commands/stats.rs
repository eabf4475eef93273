//! Stats command: prints one lecture's analytics record.

use std::io::Write;

use anyhow::Result;
use le_core::{AnalyticsRecord, LectureId};
use le_db::Database;

use super::util::{format_clock, format_duration};

pub fn format_stats(record: &AnalyticsRecord) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Lecture: {}", record.lecture_id));
    lines.push(format!("Views: {}", record.total_views));
    lines.push(format!(
        "Watch time: {}",
        format_duration(record.total_watch_time_sec)
    ));
    lines.push(format!(
        "Duration: {}",
        record
            .duration_sec
            .map_or_else(|| "unknown".to_string(), |d| format_duration(u64::from(d)))
    ));

    let Some(mean) = record.mean_attention() else {
        lines.push("Attention: no samples".to_string());
        return lines.join("\n");
    };
    lines.push(format!(
        "Attention: {mean:.1} mean over {} seconds",
        record.attention_timeline.len()
    ));
    lines.push("Timeline:".to_string());
    for (second, point) in &record.attention_timeline {
        let noun = if point.samples == 1 { "sample" } else { "samples" };
        lines.push(format!(
            "  {:>7}  {:>5.1}  ({} {noun})",
            format_clock(*second),
            point.avg_score,
            point.samples
        ));
    }
    lines.join("\n")
}

pub fn run<W: Write>(writer: &mut W, db: &Database, lecture_id: &LectureId, json: bool) -> Result<()> {
    let record = db.read(lecture_id)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&record)?)?;
    } else {
        writeln!(writer, "{}", format_stats(&record))?;
    }
    Ok(())
}
