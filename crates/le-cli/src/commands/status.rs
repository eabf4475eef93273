//! Status command: database location and per-lecture summary.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::SecondsFormat;
use le_db::Database;

use super::util::format_duration;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let lectures = db.list_lectures()?;

    writeln!(writer, "Lecture analytics status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    if lectures.is_empty() {
        writeln!(writer, "No lectures recorded.")?;
        return Ok(());
    }

    writeln!(writer, "Lectures:")?;
    for lecture in lectures {
        let attention = lecture.mean_attention.map_or_else(
            || "no attention samples".to_string(),
            |mean| {
                format!(
                    "attention {mean:.1} over {}s",
                    lecture.timeline_seconds
                )
            },
        );
        writeln!(
            writer,
            "- {}: {} views, {} watched, {} (updated {})",
            lecture.lecture_id,
            lecture.total_views,
            format_duration(lecture.total_watch_time_sec),
            attention,
            lecture
                .updated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
    }

    Ok(())
}
