//! Manifest and work types.
//!
//! A manifest is a maintainer-versioned catalog of works. Every struct keeps
//! the fields it does not know about in an `extra` map so that documents
//! written against a newer schema survive a round trip through the library.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Fields not covered by the typed schema, preserved verbatim.
pub type Extra = Map<String, Value>;

/// The root manifest document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Semver-like catalog version
    pub version: String,

    /// Identity of whoever publishes this catalog
    pub maintainer: String,

    /// Last modification timestamp, as written by the maintainer
    pub last_updated: String,

    /// Catalogued works, in document order
    pub works: Vec<Work>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Manifest {
    /// Parse `last_updated` as an RFC 3339 timestamp or a plain `YYYY-MM-DD` date
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&self.last_updated) {
            return Some(ts.with_timezone(&Utc));
        }

        NaiveDate::parse_from_str(&self.last_updated, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

/// Supported media types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    Video,
    Comic,
    Book,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Video => "video",
            WorkType::Comic => "comic",
            WorkType::Book => "book",
        }
    }

    /// Whether this type is consumed page by page rather than played
    pub fn is_paged(&self) -> bool {
        matches!(self, WorkType::Comic | WorkType::Book)
    }
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "video" | "movie" | "series" => Ok(WorkType::Video),
            "comic" | "manga" => Ok(WorkType::Comic),
            "book" => Ok(WorkType::Book),
            _ => anyhow::bail!("Unknown work type: {}", s),
        }
    }
}

/// A single external identifier value (some catalogs use numeric ids)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalId {
    Text(String),
    Number(serde_json::Number),
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalId::Text(s) => f.write_str(s),
            ExternalId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Identifiers used to correlate the same title across manifests.
///
/// The well-known namespaces get their own fields; anything else lands in
/// `other`. These ids never participate in deduplication.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<ExternalId>,

    /// MyAnimeList
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mal: Option<ExternalId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anilist: Option<ExternalId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kitsu: Option<ExternalId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<ExternalId>,

    /// Any other namespace
    #[serde(flatten)]
    pub other: BTreeMap<String, ExternalId>,
}

impl ExternalIds {
    /// Look up an identifier by namespace
    pub fn get(&self, namespace: &str) -> Option<&ExternalId> {
        match namespace {
            "imdb" => self.imdb.as_ref(),
            "mal" => self.mal.as_ref(),
            "anilist" => self.anilist.as_ref(),
            "kitsu" => self.kitsu.as_ref(),
            "isbn" => self.isbn.as_ref(),
            other => self.other.get(other),
        }
    }

    /// All present identifiers, well-known namespaces first
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExternalId)> {
        [
            ("imdb", self.imdb.as_ref()),
            ("mal", self.mal.as_ref()),
            ("anilist", self.anilist.as_ref()),
            ("kitsu", self.kitsu.as_ref()),
            ("isbn", self.isbn.as_ref()),
        ]
        .into_iter()
        .filter_map(|(ns, id)| id.map(|id| (ns, id)))
        .chain(self.other.iter().map(|(ns, id)| (ns.as_str(), id)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// One catalogued title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    /// Global identity of the work (upsert key)
    pub id: String,

    pub external_ids: ExternalIds,

    pub original_title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "type")]
    pub work_type: WorkType,

    /// Language-agnostic assets keyed by stream key ("movie", "episode_1", "chapter_1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_media: Option<BTreeMap<String, RawMedia>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localizations: Option<Vec<Localization>>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Work {
    /// Whether `stream_key` names an existing raw media group
    pub fn has_stream(&self, stream_key: &str) -> bool {
        self.raw_media
            .as_ref()
            .is_some_and(|media| media.contains_key(stream_key))
    }

    /// Stream keys in sorted order
    pub fn stream_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .raw_media
            .iter()
            .flat_map(|media| media.keys().map(String::as_str))
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn localizations(&self) -> &[Localization] {
        self.localizations.as_deref().unwrap_or_default()
    }
}

/// Raw content for one stream key.
///
/// The JSON shape decides the variant: an array is a list of video
/// renditions, an object with `pages` is a comic chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMedia {
    Video(Vec<VideoRendition>),
    Comic(ComicChapter),
}

/// Container format of a video rendition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Webm,
    Mkv,
}

impl VideoFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "video/mp4",
            VideoFormat::Webm => "video/webm",
            VideoFormat::Mkv => "video/x-matroska",
        }
    }
}

/// One concrete encoded video asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRendition {
    /// Free-form quality label, e.g. "1080p"
    pub quality: String,
    pub url: String,
    pub format: VideoFormat,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Accepts `3` and `3.0`
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let n = f64::deserialize(deserializer)?;
    if n.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&n) {
        Ok(n as u32)
    } else {
        Err(D::Error::custom(format!("expected a whole page number, found {n}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComicPage {
    /// Page number as printed; informational only, the sequence index is the address
    #[serde(deserialize_with = "whole_number")]
    pub page: u32,
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComicChapter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub pages: Vec<ComicPage>,

    #[serde(flatten)]
    pub extra: Extra,
}

/// Per-locale layer over a work's raw media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Localization {
    /// Locale tag, e.g. "pt-BR"
    pub locale: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tracks keyed by the raw media stream key they belong to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracks: Option<BTreeMap<String, Vec<Track>>>,

    /// Overlay script URLs keyed by stream key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_overlays: Option<BTreeMap<String, String>>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Localization {
    pub fn tracks_for(&self, stream_key: &str) -> &[Track] {
        self.tracks
            .as_ref()
            .and_then(|tracks| tracks.get(stream_key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn overlay_for(&self, stream_key: &str) -> Option<&str> {
        self.text_overlays
            .as_ref()
            .and_then(|overlays| overlays.get(stream_key))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Subtitle,
    Audio,
    Script,
}

/// A localized layer such as a subtitle file or an audio dub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub url: String,

    #[serde(rename = "type")]
    pub kind: TrackKind,

    /// Human-readable label, e.g. "Portuguese (Brazil)"
    pub label: String,

    /// ISO language code, e.g. "pt-BR"
    pub language: String,

    #[serde(flatten)]
    pub extra: Extra,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_external_ids_open_map() {
        let ids: ExternalIds = serde_json::from_value(json!({
            "imdb": "tt0111161",
            "mal": 5114,
            "tmdb": 278,
            "custom": "abc"
        }))
        .unwrap();

        assert_eq!(ids.imdb, Some(ExternalId::Text("tt0111161".to_string())));
        assert_eq!(ids.get("mal").map(|id| id.to_string()), Some("5114".to_string()));
        assert_eq!(ids.get("tmdb").map(|id| id.to_string()), Some("278".to_string()));
        assert_eq!(ids.iter().count(), 4);
        // Well-known namespaces come first
        assert_eq!(ids.iter().next().map(|(ns, _)| ns), Some("imdb"));
    }

    #[test]
    fn test_raw_media_shape_decides_variant() {
        let media: BTreeMap<String, RawMedia> = serde_json::from_value(json!({
            "movie": [{"quality": "1080p", "url": "m.mp4", "format": "mp4"}],
            "chapter_1": {"pages": [{"page": 1, "url": "p1.jpg"}]}
        }))
        .unwrap();

        assert!(matches!(media["movie"], RawMedia::Video(ref r) if r.len() == 1));
        assert!(matches!(media["chapter_1"], RawMedia::Comic(ref c) if c.pages.len() == 1));
    }

    #[test]
    fn test_page_number_may_be_written_as_float() {
        let page: ComicPage = serde_json::from_value(json!({"page": 7.0, "url": "p7.jpg", "width": 1080.5})).unwrap();
        assert_eq!(page.page, 7);
        assert_eq!(page.width, Some(1080.5));

        assert!(serde_json::from_value::<ComicPage>(json!({"page": 7.5, "url": "p7.jpg"})).is_err());
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let value = json!({
            "id": "w1",
            "external_ids": {},
            "original_title": "Title",
            "type": "book",
            "rating": 4.5
        });

        let work: Work = serde_json::from_value(value).unwrap();
        assert_eq!(work.extra.get("rating"), Some(&json!(4.5)));

        let back = serde_json::to_value(&work).unwrap();
        assert_eq!(back["rating"], json!(4.5));
        assert_eq!(back["type"], json!("book"));
    }

    #[test]
    fn test_last_updated_formats() {
        let mut manifest = Manifest {
            version: "1.0".to_string(),
            maintainer: "m1".to_string(),
            last_updated: "2024-03-01T12:00:00Z".to_string(),
            works: Vec::new(),
            extra: Extra::new(),
        };
        assert!(manifest.last_updated_at().is_some());

        manifest.last_updated = "2024-03-01".to_string();
        assert!(manifest.last_updated_at().is_some());

        manifest.last_updated = "last tuesday".to_string();
        assert!(manifest.last_updated_at().is_none());
    }

    #[test]
    fn test_work_type_from_str() {
        assert_eq!("Comic".parse::<WorkType>().unwrap(), WorkType::Comic);
        assert_eq!("manga".parse::<WorkType>().unwrap(), WorkType::Comic);
        assert!("podcast".parse::<WorkType>().is_err());
    }
}
