//! Deterministic output filenames.
//!
//! The same request always maps to the same file name, which is what makes
//! the path-based existence check possible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Extension of every file the downloader writes.
pub const OUTPUT_EXTENSION: &str = "flac";

/// How a track's file name is composed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilenameFormat {
    /// `Title - Artist`
    #[default]
    TitleArtist,
    /// `Artist - Title`
    ArtistTitle,
    /// `Title`
    Title,
    /// Template with `{title}`, `{artist}`, `{album}`, `{album_artist}`,
    /// `{year}`, `{track}` and `{disc}` placeholders
    Custom(String),
}

impl FromStr for FilenameFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "title-artist" => Ok(Self::TitleArtist),
            "artist-title" => Ok(Self::ArtistTitle),
            "title" => Ok(Self::Title),
            other if other.contains('{') => Ok(Self::Custom(other.to_string())),
            other => Err(format!("Unknown filename format: {other}")),
        }
    }
}

impl TryFrom<String> for FilenameFormat {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FilenameFormat> for String {
    fn from(format: FilenameFormat) -> Self {
        format.to_string()
    }
}

impl fmt::Display for FilenameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TitleArtist => f.write_str("title-artist"),
            Self::ArtistTitle => f.write_str("artist-title"),
            Self::Title => f.write_str("title"),
            Self::Custom(template) => f.write_str(template),
        }
    }
}

/// Fields a file name may be built from.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameFields<'a> {
    pub title: &'a str,
    pub artist: &'a str,
    pub album: &'a str,
    pub album_artist: &'a str,
    /// `YYYY` or `YYYY-MM-DD`
    pub release_date: &'a str,
    /// Position in the album or playlist, 0 if unknown
    pub position: u32,
    /// 0 if unknown
    pub disc: u32,
}

/// Build `<name>.flac` for `fields`.
///
/// With `track_number` set and a known position the name is prefixed with
/// `NN. `. Placeholders that resolve to nothing are dropped.
pub fn build_filename(fields: &NameFields<'_>, format: &FilenameFormat, track_number: bool) -> String {
    let stem = match format {
        FilenameFormat::TitleArtist => join_dash(fields.title, fields.artist),
        FilenameFormat::ArtistTitle => join_dash(fields.artist, fields.title),
        FilenameFormat::Title => fields.title.to_string(),
        FilenameFormat::Custom(template) => render_template(template, fields),
    };

    let stem = if track_number && fields.position > 0 && !matches!(format, FilenameFormat::Custom(_)) {
        format!("{:02}. {}", fields.position, stem)
    } else {
        stem
    };

    format!("{}.{}", sanitize_filename(&stem), OUTPUT_EXTENSION)
}

fn join_dash(first: &str, second: &str) -> String {
    match (first.trim(), second.trim()) {
        (a, "") => a.to_string(),
        ("", b) => b.to_string(),
        (a, b) => format!("{a} - {b}"),
    }
}

fn render_template(template: &str, fields: &NameFields<'_>) -> String {
    let year = fields.release_date.get(..4).unwrap_or_default();
    let track = if fields.position > 0 {
        format!("{:02}", fields.position)
    } else {
        String::new()
    };
    let disc = if fields.disc > 0 {
        fields.disc.to_string()
    } else {
        String::new()
    };

    template
        .replace("{title}", fields.title)
        .replace("{artist}", fields.artist)
        .replace("{album_artist}", fields.album_artist)
        .replace("{album}", fields.album)
        .replace("{year}", year)
        .replace("{track}", &track)
        .replace("{disc}", &disc)
        .trim()
        .to_string()
}

/// Make `name` safe as a single path component.
///
/// Path separators and characters invalid on common filesystems become
/// `_`; control characters are dropped; trailing dots and spaces are
/// trimmed. An empty result becomes `Unknown`.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();

    let trimmed = cleaned.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}
