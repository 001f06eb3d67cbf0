//! Media Resolution Integration Tests
//!
//! Tests for stream selection, rendition ranking, page sequences, subtitles
//! and locale selection over works parsed from manifest JSON.

use anigato::domain::{PageIndex, TrackKind, Work};
use anigato::playback::{
    display_title, resolve_media, select_localization, subtitles_for, ComicCursor,
    MediaPreferences, ResolveError, ResolvedMedia,
};
use serde_json::{json, Value};

fn parse(value: Value) -> Work {
    serde_json::from_value(value).unwrap()
}

fn rendition(quality: &str) -> Value {
    json!({"quality": quality, "url": format!("https://cdn.test/{quality}.mp4"), "format": "mp4"})
}

fn video(raw_media: Value) -> Work {
    parse(json!({
        "id": "v1",
        "external_ids": {"imdb": "tt0000001"},
        "original_title": "Original",
        "type": "video",
        "raw_media": raw_media
    }))
}

fn comic(pages: usize) -> Work {
    let pages: Vec<Value> = (1..=pages)
        .map(|n| json!({"page": n, "url": format!("https://cdn.test/p{n}.jpg")}))
        .collect();
    parse(json!({
        "id": "c1",
        "external_ids": {},
        "original_title": "Comic",
        "type": "comic",
        "raw_media": {"chapter_1": {"title": "Start", "pages": pages}}
    }))
}

fn localized_video() -> Work {
    parse(json!({
        "id": "v2",
        "external_ids": {},
        "original_title": "Original",
        "type": "video",
        "raw_media": {"episode_1": [rendition("720p")]},
        "localizations": [
            {
                "locale": "en",
                "title": "English Title",
                "tracks": {
                    "episode_1": [
                        {"url": "en.vtt", "type": "subtitle", "label": "English", "language": "en"},
                        {"url": "en.aac", "type": "audio", "label": "English dub", "language": "en"}
                    ],
                    "episode_9": [
                        {"url": "ghost.vtt", "type": "subtitle", "label": "Ghost", "language": "en"}
                    ]
                }
            },
            {
                "locale": "pt-BR",
                "title": "Titulo",
                "tracks": {
                    "episode_1": [
                        {"url": "pt.vtt", "type": "subtitle", "label": "Portugues", "language": "pt-BR"}
                    ]
                }
            }
        ]
    }))
}

fn prefs() -> MediaPreferences {
    MediaPreferences::default()
}

#[test]
fn test_first_stream_key_is_lexicographic() {
    // Listed "b" first; "a" still wins
    let work = video(json!({"b": [rendition("1080p")], "a": [rendition("480p")]}));

    let media = resolve_media(&work, &prefs()).unwrap();
    assert_eq!(media.stream_key(), "a");

    // A preference naming an existing key wins
    let prefer_b = MediaPreferences {
        stream: Some("b".to_string()),
        ..prefs()
    };
    assert_eq!(resolve_media(&work, &prefer_b).unwrap().stream_key(), "b");

    // An unknown preference falls back to the default rule
    let prefer_missing = MediaPreferences {
        stream: Some("z".to_string()),
        ..prefs()
    };
    assert_eq!(resolve_media(&work, &prefer_missing).unwrap().stream_key(), "a");
}

#[test]
fn test_highest_quality_rendition() {
    let work = video(json!({
        "movie": [rendition("480p"), rendition("1080p"), rendition("720p")]
    }));

    match resolve_media(&work, &prefs()).unwrap() {
        ResolvedMedia::Video {
            rendition,
            renditions,
            ..
        } => {
            assert_eq!(rendition.quality, "1080p");
            assert_eq!(renditions.len(), 3);
        }
        other => panic!("expected video, got {other:?}"),
    }
}

#[test]
fn test_equal_quality_keeps_earliest() {
    let mut tie_a = rendition("720p");
    tie_a["url"] = json!("first.mp4");
    let mut tie_b = rendition("720p");
    tie_b["url"] = json!("second.mp4");
    let work = video(json!({"movie": [rendition("360p"), tie_a, tie_b]}));

    let ResolvedMedia::Video { rendition, .. } = resolve_media(&work, &prefs()).unwrap() else {
        panic!("expected video");
    };
    assert_eq!(rendition.url, "first.mp4");
}

#[test]
fn test_unranked_labels_use_first_rendition() {
    let work = video(json!({"movie": [rendition("source"), rendition("mobile")]}));

    let ResolvedMedia::Video { rendition, .. } = resolve_media(&work, &prefs()).unwrap() else {
        panic!("expected video");
    };
    assert_eq!(rendition.quality, "source");
}

#[test]
fn test_max_height_caps_rendition() {
    let work = video(json!({
        "movie": [rendition("2160p"), rendition("1080p"), rendition("720p")]
    }));

    let capped = MediaPreferences {
        max_height: Some(1080),
        ..prefs()
    };
    let ResolvedMedia::Video { rendition, .. } = resolve_media(&work, &capped).unwrap() else {
        panic!("expected video");
    };
    assert_eq!(rendition.quality, "1080p");

    // Nothing fits under the cap: best available instead of nothing
    let tiny = MediaPreferences {
        max_height: Some(240),
        ..prefs()
    };
    let ResolvedMedia::Video { rendition, .. } = resolve_media(&work, &tiny).unwrap() else {
        panic!("expected video");
    };
    assert_eq!(rendition.quality, "2160p");
}

#[test]
fn test_comic_resolves_page_sequence() {
    let work = comic(3);

    match resolve_media(&work, &prefs()).unwrap() {
        ResolvedMedia::Pages {
            stream_key,
            chapter,
        } => {
            assert_eq!(stream_key, "chapter_1");
            assert_eq!(chapter.title.as_deref(), Some("Start"));
            let urls: Vec<&str> = chapter.pages.iter().map(|p| p.url.as_str()).collect();
            assert_eq!(
                urls,
                vec![
                    "https://cdn.test/p1.jpg",
                    "https://cdn.test/p2.jpg",
                    "https://cdn.test/p3.jpg"
                ]
            );
        }
        other => panic!("expected pages, got {other:?}"),
    }
}

#[test]
fn test_book_reads_like_comic() {
    let mut value = serde_json::to_value(comic(2)).unwrap();
    value["type"] = json!("book");
    let book = parse(value);

    assert!(matches!(
        resolve_media(&book, &prefs()).unwrap(),
        ResolvedMedia::Pages { .. }
    ));
}

#[test]
fn test_missing_raw_media() {
    let work = parse(json!({
        "id": "x",
        "external_ids": {},
        "original_title": "Nothing",
        "type": "video"
    }));
    assert_eq!(
        resolve_media(&work, &prefs()).unwrap_err(),
        ResolveError::NoRawMedia("x".to_string())
    );

    // An empty map is no better
    let empty = video(json!({}));
    assert!(matches!(
        resolve_media(&empty, &prefs()),
        Err(ResolveError::NoRawMedia(_))
    ));
}

#[test]
fn test_empty_streams_have_no_content() {
    let no_renditions = video(json!({"movie": []}));
    assert_eq!(
        resolve_media(&no_renditions, &prefs()).unwrap_err(),
        ResolveError::NoContent {
            work_id: "v1".to_string(),
            stream_key: "movie".to_string(),
        }
    );

    let no_pages = comic(0);
    assert!(matches!(
        resolve_media(&no_pages, &prefs()),
        Err(ResolveError::NoContent { .. })
    ));
}

#[test]
fn test_shape_must_match_work_type() {
    // A video work whose stream is shaped like a chapter
    let work = video(json!({"movie": {"pages": [{"page": 1, "url": "p1.jpg"}]}}));
    assert!(matches!(
        resolve_media(&work, &prefs()),
        Err(ResolveError::NoContent { .. })
    ));
}

#[test]
fn test_subtitles_filtered_by_kind() {
    let work = localized_video();

    let tracks = subtitles_for(&work, "episode_1", Some("en"));
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].url, "en.vtt");
    assert_eq!(tracks[0].kind, TrackKind::Subtitle);

    let tracks = subtitles_for(&work, "episode_1", Some("pt-BR"));
    assert_eq!(tracks.iter().map(|t| t.url.as_str()).collect::<Vec<_>>(), vec!["pt.vtt"]);
}

#[test]
fn test_subtitles_for_dangling_stream_are_empty() {
    let work = localized_video();

    // "episode_9" has tracks but no raw media
    assert!(subtitles_for(&work, "episode_9", Some("en")).is_empty());
    // No localization at all for this locale
    assert!(subtitles_for(&work, "episode_1", Some("ja")).is_empty());
    // A work without localizations plays without subtitles
    let bare = video(json!({"movie": [rendition("720p")]}));
    assert!(subtitles_for(&bare, "movie", None).is_empty());
}

#[test]
fn test_locale_selection() {
    let work = localized_video();

    let exact = select_localization(&work, Some("PT-br")).unwrap();
    assert_eq!(exact.locale, "pt-BR");

    // Same primary language
    let partial = select_localization(&work, Some("pt")).unwrap();
    assert_eq!(partial.locale, "pt-BR");
    let regional = select_localization(&work, Some("en-GB")).unwrap();
    assert_eq!(regional.locale, "en");

    // No preference: first listed
    assert_eq!(select_localization(&work, None).unwrap().locale, "en");
    assert!(select_localization(&work, Some("ja")).is_none());

    assert_eq!(display_title(&work, Some("pt-BR")), "Titulo");
    assert_eq!(display_title(&work, Some("ja")), "Original");
}

#[test]
fn test_comic_cursor_navigation() {
    let work = comic(3);
    let ResolvedMedia::Pages { chapter, .. } = resolve_media(&work, &prefs()).unwrap() else {
        panic!("expected pages");
    };

    let mut cursor = ComicCursor::new(&chapter.pages).unwrap();
    assert_eq!(cursor.len(), 3);
    assert!(cursor.is_first());
    assert_eq!(cursor.position(), (1, 3));

    // Can't go before the first page
    assert!(!cursor.prev_page());

    assert!(cursor.next_page());
    assert!(cursor.next_page());
    assert!(cursor.is_last());
    assert_eq!(cursor.current().url, "https://cdn.test/p3.jpg");

    // Never wraps around
    assert!(!cursor.next_page());
    assert_eq!(cursor.index(), PageIndex::new(2));

    cursor.seek(PageIndex::new(99));
    assert_eq!(cursor.index(), PageIndex::new(2));
    cursor.seek(PageIndex::new(0));
    assert_eq!(cursor.position(), (1, 3));

    assert!(ComicCursor::new(&[]).is_none());
}
