//! Candidate identity verification.

use super::{Candidate, TrackQuery, Verification};

/// Lowercase, replace punctuation with spaces and collapse whitespace.
pub fn normalize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check whether `candidate` is the recording `query` asks for.
///
/// An ISRC on both sides decides on its own. Otherwise title and artist
/// must match after normalisation and, when both durations are known, they
/// must be within `tolerance_secs`.
pub fn verify_candidate(query: &TrackQuery, candidate: &Candidate, tolerance_secs: u32) -> Verification {
    let wanted = query.isrc.trim();
    if let Some(found) = candidate.isrc.as_deref().map(str::trim).filter(|s| !s.is_empty())
        && !wanted.is_empty()
    {
        return if found.eq_ignore_ascii_case(wanted) {
            Verification::Matched
        } else {
            Verification::Unmatched
        };
    }

    if query.title.trim().is_empty() {
        return Verification::Unknown;
    }

    if !titles_match(&query.title, &candidate.title) {
        return Verification::Unmatched;
    }
    if !query.artist.trim().is_empty() && !artists_match(&query.artist, &candidate.artist) {
        return Verification::Unmatched;
    }
    if let (Some(want), Some(got)) = (query.duration_secs, candidate.duration_secs)
        && want.abs_diff(got) > tolerance_secs
    {
        return Verification::Unmatched;
    }
    Verification::Matched
}

fn titles_match(wanted: &str, found: &str) -> bool {
    let (wanted, found) = (normalize(wanted), normalize(found));
    if wanted.is_empty() || found.is_empty() {
        return false;
    }
    // Services often append " (Remastered 2011)" and the like
    wanted == found || found.starts_with(&wanted) || wanted.starts_with(&found)
}

fn artists_match(wanted: &str, found: &str) -> bool {
    let found = normalize(found);
    wanted
        .split([',', '&', ';'])
        .map(normalize)
        .filter(|a| !a.is_empty())
        .any(|a| found.contains(&a))
}
