//! Cover service API Data Transfer Objects
//!
//! Only the fields used for cover lookup are modelled.
//!
//! - iTunes Search: https://performance-partners.apple.com/search-api
//! - Deezer: https://developers.deezer.com/api/search
//! - MusicBrainz: https://musicbrainz.org/doc/MusicBrainz_API/Search

use serde::{Deserialize, Serialize};

/// iTunes search response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ITunesSearchResponse {
    #[serde(default)]
    pub result_count: u32,
    #[serde(default)]
    pub results: Vec<ITunesTrack>,
}

/// One iTunes song result
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ITunesTrack {
    #[serde(default)]
    pub track_name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub collection_name: String,
    /// 100x100 artwork; larger sizes are obtained by rewriting the URL
    #[serde(default)]
    pub artwork_url100: String,
}

/// Deezer search response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeezerSearchResponse {
    #[serde(default)]
    pub data: Vec<DeezerTrack>,
}

/// One Deezer track result
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeezerTrack {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: DeezerArtist,
    #[serde(default)]
    pub album: DeezerAlbum,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeezerArtist {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeezerAlbum {
    #[serde(default)]
    pub title: String,
    /// 1000x1000 cover
    #[serde(default)]
    pub cover_xl: String,
}

/// MusicBrainz recording search response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecordingSearchResponse {
    #[serde(default)]
    pub recordings: Vec<Recording>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Recording {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub releases: Vec<Release>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Release {
    pub id: String,
    #[serde(default)]
    pub title: String,
}
