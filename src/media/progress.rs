// yt-dlp progress line classification

use regex::Regex;

use super::models::ProgressEvent;

lazy_static::lazy_static! {
    // [download]  42.3% of   10.00MiB at  1.00MiB/s ETA 00:10
    static ref PROGRESS_RE: Regex = Regex::new(
        r"\[download\]\s+([\d.]+)% of.*ETA (\d{2}:\d{2})(?:[^:\d]|$)"
    ).unwrap();
}

/// Classify one line of download output.
///
/// Lines that do not carry a percentage and an `MM:SS` ETA come back
/// untouched as [`ProgressEvent::RawLine`], so nothing is ever dropped.
pub fn classify(line: &str) -> ProgressEvent {
    match parse_progress(line) {
        Some((value, eta)) => ProgressEvent::Percentage { value, eta },
        None => ProgressEvent::RawLine(line.to_string()),
    }
}

fn parse_progress(line: &str) -> Option<(f32, String)> {
    let caps = PROGRESS_RE.captures(line)?;
    let value: f32 = caps.get(1)?.as_str().parse().ok()?;
    if !(0.0..=100.0).contains(&value) {
        return None;
    }
    let eta = caps.get(2)?.as_str().to_string();
    Some((value, eta))
}
