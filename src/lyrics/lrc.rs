//! LRC parsing and rendering.

use super::{LyricLine, Lyrics, SyncType};

/// `[mm:ss.xx]` for a millisecond offset.
pub fn format_timestamp(ms: u64) -> String {
    let minutes = ms / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let centis = (ms % 1000) / 10;
    format!("[{minutes:02}:{seconds:02}.{centis:02}]")
}

/// Parse LRC text into lines. Metadata tags (`[ti:...]`) are skipped;
/// a line with several timestamps yields one entry per timestamp.
pub fn parse_lrc(text: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut rest = raw.trim();
        let mut stamps = Vec::new();
        while let Some(stripped) = rest.strip_prefix('[') {
            let Some(end) = stripped.find(']') else {
                break;
            };
            match parse_timestamp(&stripped[..end]) {
                Some(ms) => stamps.push(ms),
                None if stamps.is_empty() => {
                    // Metadata tag such as [ar:Artist]
                    rest = "";
                    break;
                }
                None => break,
            }
            rest = stripped[end + 1..].trim_start();
        }

        if stamps.is_empty() {
            continue;
        }
        for ms in stamps {
            lines.push(LyricLine {
                start_ms: Some(ms),
                text: rest.to_string(),
            });
        }
    }
    lines.sort_by_key(|line| line.start_ms);
    lines
}

fn parse_timestamp(stamp: &str) -> Option<u64> {
    let (minutes, rest) = stamp.split_once(':')?;
    let minutes: u64 = minutes.trim().parse().ok()?;
    let (seconds, fraction) = rest.split_once(['.', ':']).unwrap_or((rest, "0"));
    let seconds: u64 = seconds.trim().parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    let fraction = fraction.trim();
    let frac_ms = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u64>().ok()? * 100,
        2 => fraction.parse::<u64>().ok()? * 10,
        _ => fraction.get(..3)?.parse::<u64>().ok()?,
    };
    Some(minutes * 60_000 + seconds * 1000 + frac_ms)
}

/// Render lyrics as LRC with a title/artist header.
///
/// Returns an empty string when there is nothing to write.
pub fn to_lrc(lyrics: &Lyrics, title: &str, artist: &str) -> String {
    if lyrics.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    if !title.is_empty() {
        out.push_str(&format!("[ti:{title}]\n"));
    }
    if !artist.is_empty() {
        out.push_str(&format!("[ar:{artist}]\n"));
    }
    out.push_str("[by:flac-harvest]\n\n");

    for line in &lyrics.lines {
        match (lyrics.sync, line.start_ms) {
            (SyncType::LineSynced, Some(ms)) => {
                out.push_str(&format_timestamp(ms));
                out.push_str(&line.text);
            }
            _ => out.push_str(&line.text),
        }
        out.push('\n');
    }
    out
}
