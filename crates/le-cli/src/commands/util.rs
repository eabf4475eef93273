//! Shared formatting helpers for CLI commands.

/// Formats a span of seconds as `1h 02m 05s`, `3m 07s` or `42s`.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {secs:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}

/// Formats a playback position as `m:ss` or `h:mm:ss`.
pub fn format_clock(second: u32) -> String {
    let hours = second / 3600;
    let minutes = (second % 3600) / 60;
    let secs = second % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
