//! Structural validation of manifest payloads.
//!
//! Walks an arbitrary JSON value and reports the first structural violation
//! with a path like `$.works[0].raw_media.ch1.pages[2].url`. Unknown fields are
//! accepted. Nothing semantic (URL reachability, page ordering) is checked.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::Manifest;

const WORK_TYPES: &[&str] = &["video", "comic", "book"];
const VIDEO_FORMATS: &[&str] = &["mp4", "webm", "mkv"];
const TRACK_TYPES: &[&str] = &["subtitle", "audio", "script"];

/// The first structural problem found in a manifest payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid manifest at `{path}`: {reason}")]
pub struct ValidationError {
    pub path: String,
    pub reason: String,
}

impl ValidationError {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

type Check<T> = Result<T, ValidationError>;

/// Validate a raw payload and convert it into a [`Manifest`]
pub fn validate(raw: &Value) -> Result<Manifest, ValidationError> {
    check_manifest(raw, "$")?;

    // The walk above mirrors the typed schema, so this only fails if they drift apart
    serde_json::from_value(raw.clone()).map_err(|e| ValidationError::new("$", e.to_string()))
}

/// Parse bytes as JSON, then validate
pub fn validate_slice(bytes: &[u8]) -> Result<Manifest, ValidationError> {
    let raw: Value = serde_json::from_slice(bytes)
        .map_err(|e| ValidationError::new("$", format!("not valid JSON: {}", e)))?;
    validate(&raw)
}

fn check_manifest(value: &Value, path: &str) -> Check<()> {
    let obj = object(value, path)?;
    string(required(obj, path, "version")?, &field(path, "version"))?;
    string(required(obj, path, "maintainer")?, &field(path, "maintainer"))?;
    string(required(obj, path, "last_updated")?, &field(path, "last_updated"))?;

    let works_path = field(path, "works");
    for (i, work) in array(required(obj, path, "works")?, &works_path)?.iter().enumerate() {
        check_work(work, &index(&works_path, i))?;
    }
    Ok(())
}

fn check_work(value: &Value, path: &str) -> Check<()> {
    let obj = object(value, path)?;
    string(required(obj, path, "id")?, &field(path, "id"))?;
    string(required(obj, path, "original_title")?, &field(path, "original_title"))?;
    one_of(required(obj, path, "type")?, &field(path, "type"), WORK_TYPES)?;

    let ids_path = field(path, "external_ids");
    for (ns, id) in object(required(obj, path, "external_ids")?, &ids_path)? {
        if !(id.is_string() || id.is_number()) {
            return Err(ValidationError::new(
                &field(&ids_path, ns),
                "expected a string or number",
            ));
        }
    }

    for key in ["cover_url", "description"] {
        if let Some(v) = optional(obj, key) {
            string(v, &field(path, key))?;
        }
    }

    if let Some(media) = optional(obj, "raw_media") {
        let media_path = field(path, "raw_media");
        for (key, entry) in object(media, &media_path)? {
            check_raw_media(entry, &field(&media_path, key))?;
        }
    }

    if let Some(locs) = optional(obj, "localizations") {
        let locs_path = field(path, "localizations");
        for (i, loc) in array(locs, &locs_path)?.iter().enumerate() {
            check_localization(loc, &index(&locs_path, i))?;
        }
    }
    Ok(())
}

fn check_raw_media(value: &Value, path: &str) -> Check<()> {
    match value {
        Value::Array(renditions) => {
            for (i, rendition) in renditions.iter().enumerate() {
                let path = index(path, i);
                let obj = object(rendition, &path)?;
                string(required(obj, &path, "quality")?, &field(&path, "quality"))?;
                string(required(obj, &path, "url")?, &field(&path, "url"))?;
                one_of(required(obj, &path, "format")?, &field(&path, "format"), VIDEO_FORMATS)?;
            }
            Ok(())
        }
        Value::Object(obj) => {
            if let Some(title) = optional(obj, "title") {
                string(title, &field(path, "title"))?;
            }
            let pages_path = field(path, "pages");
            for (i, page) in array(required(obj, path, "pages")?, &pages_path)?.iter().enumerate() {
                let path = index(&pages_path, i);
                let page = object(page, &path)?;
                whole_number(required(page, &path, "page")?, &field(&path, "page"))?;
                string(required(page, &path, "url")?, &field(&path, "url"))?;
                for key in ["width", "height"] {
                    if let Some(v) = optional(page, key) {
                        dimension(v, &field(&path, key))?;
                    }
                }
            }
            Ok(())
        }
        _ => Err(ValidationError::new(
            path,
            "expected a rendition list or a chapter object",
        )),
    }
}

fn check_localization(value: &Value, path: &str) -> Check<()> {
    let obj = object(value, path)?;
    string(required(obj, path, "locale")?, &field(path, "locale"))?;
    for key in ["title", "description"] {
        if let Some(v) = optional(obj, key) {
            string(v, &field(path, key))?;
        }
    }

    if let Some(tracks) = optional(obj, "tracks") {
        let tracks_path = field(path, "tracks");
        for (key, list) in object(tracks, &tracks_path)? {
            let list_path = field(&tracks_path, key);
            for (i, track) in array(list, &list_path)?.iter().enumerate() {
                let path = index(&list_path, i);
                let track = object(track, &path)?;
                string(required(track, &path, "url")?, &field(&path, "url"))?;
                one_of(required(track, &path, "type")?, &field(&path, "type"), TRACK_TYPES)?;
                string(required(track, &path, "label")?, &field(&path, "label"))?;
                string(required(track, &path, "language")?, &field(&path, "language"))?;
            }
        }
    }

    if let Some(overlays) = optional(obj, "text_overlays") {
        let overlays_path = field(path, "text_overlays");
        for (key, url) in object(overlays, &overlays_path)? {
            string(url, &field(&overlays_path, key))?;
        }
    }
    Ok(())
}

fn field(path: &str, key: &str) -> String {
    format!("{}.{}", path, key)
}

fn index(path: &str, i: usize) -> String {
    format!("{}[{}]", path, i)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required<'a>(obj: &'a Map<String, Value>, path: &str, key: &str) -> Check<&'a Value> {
    obj.get(key)
        .ok_or_else(|| ValidationError::new(&field(path, key), "missing required field"))
}

/// Absent and `null` both mean "not provided"
fn optional<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn object<'a>(value: &'a Value, path: &str) -> Check<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::new(path, format!("expected an object, found {}", kind(value))))
}

fn array<'a>(value: &'a Value, path: &str) -> Check<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| ValidationError::new(path, format!("expected an array, found {}", kind(value))))
}

fn string<'a>(value: &'a Value, path: &str) -> Check<&'a str> {
    value
        .as_str()
        .ok_or_else(|| ValidationError::new(path, format!("expected a string, found {}", kind(value))))
}

/// `2` and `2.0` are the same page; `2.5` is not a page
fn whole_number(value: &Value, path: &str) -> Check<u32> {
    value
        .as_f64()
        .filter(|n| n.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(n))
        .map(|n| n as u32)
        .ok_or_else(|| ValidationError::new(path, "expected a non-negative whole number"))
}

fn dimension(value: &Value, path: &str) -> Check<f64> {
    value
        .as_f64()
        .filter(|n| *n >= 0.0)
        .ok_or_else(|| ValidationError::new(path, "expected a non-negative number"))
}

fn one_of(value: &Value, path: &str, allowed: &[&str]) -> Check<()> {
    let s = string(value, path)?;
    if allowed.contains(&s) {
        Ok(())
    } else {
        Err(ValidationError::new(
            path,
            format!("unknown value `{}`, expected one of: {}", s, allowed.join(", ")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawMedia;
    use serde_json::json;

    fn comic_manifest() -> Value {
        json!({
            "version": "1.0",
            "maintainer": "m1",
            "last_updated": "2024-01-01",
            "works": [{
                "id": "w1",
                "external_ids": {"mal": 42, "isbn": "978-3-16", "shelf": "A3"},
                "original_title": "Comic",
                "type": "comic",
                "raw_media": {"ch1": {"pages": [
                    {"page": 1, "url": "p1.jpg"},
                    {"page": 2, "url": "p2.jpg", "width": 800}
                ]}},
                "localizations": [{
                    "locale": "pt-BR",
                    "text_overlays": {"ch1": "scripts/ch1.json"}
                }]
            }]
        })
    }

    #[test]
    fn test_valid_manifest_converts() {
        let manifest = validate(&comic_manifest()).unwrap();
        assert_eq!(manifest.works.len(), 1);
        assert_eq!(manifest.works[0].external_ids.other.len(), 1);
    }

    #[test]
    fn test_missing_field_reports_path() {
        let mut raw = comic_manifest();
        raw["works"][0]["raw_media"]["ch1"]["pages"][1]
            .as_object_mut()
            .unwrap()
            .remove("url");

        let err = validate(&raw).unwrap_err();
        assert_eq!(err.path, "$.works[0].raw_media.ch1.pages[1].url");
        assert_eq!(err.reason, "missing required field");
    }

    #[test]
    fn test_unknown_work_type_rejected() {
        let mut raw = comic_manifest();
        raw["works"][0]["type"] = json!("podcast");

        let err = validate(&raw).unwrap_err();
        assert_eq!(err.path, "$.works[0].type");
        assert!(err.reason.contains("podcast"));
    }

    #[test]
    fn test_external_id_must_be_scalar() {
        let mut raw = comic_manifest();
        raw["works"][0]["external_ids"]["mal"] = json!({"id": 42});

        let err = validate(&raw).unwrap_err();
        assert_eq!(err.path, "$.works[0].external_ids.mal");
    }

    #[test]
    fn test_extra_fields_preserved() {
        let mut raw = comic_manifest();
        raw["homepage"] = json!("https://example.org");
        raw["works"][0]["raw_media"]["ch1"]["pages"][0]["blurhash"] = json!("LEHV6n");

        let manifest = validate(&raw).unwrap();
        assert_eq!(manifest.extra.get("homepage"), Some(&json!("https://example.org")));

        let back = serde_json::to_value(&manifest).unwrap();
        assert_eq!(back["works"][0]["raw_media"]["ch1"]["pages"][0]["blurhash"], json!("LEHV6n"));
    }

    #[test]
    fn test_null_optional_fields_are_absent() {
        let mut raw = comic_manifest();
        raw["works"][0]["cover_url"] = Value::Null;
        raw["works"][0]["localizations"] = Value::Null;

        let manifest = validate(&raw).unwrap();
        assert!(manifest.works[0].cover_url.is_none());
        assert!(manifest.works[0].localizations.is_none());
    }

    #[test]
    fn test_raw_media_must_have_known_shape() {
        let mut raw = comic_manifest();
        raw["works"][0]["raw_media"]["ch1"] = json!("p1.jpg");

        let err = validate(&raw).unwrap_err();
        assert_eq!(err.path, "$.works[0].raw_media.ch1");
    }

    #[test]
    fn test_page_fields_accept_json_numbers() {
        let mut doc = comic_manifest();
        let page = &mut doc["works"][0]["raw_media"]["ch1"]["pages"][1];
        page["page"] = json!(2.0);
        page["width"] = json!(800.5);
        page["height"] = json!(1200.0);

        let manifest = validate(&doc).unwrap();
        let Some(RawMedia::Comic(chapter)) = manifest.works[0].raw_media.as_ref().unwrap().get("ch1") else {
            panic!("expected a comic chapter");
        };
        assert_eq!(chapter.pages[1].page, 2);
        assert_eq!(chapter.pages[1].width, Some(800.5));
        assert_eq!(chapter.pages[1].height, Some(1200.0));
    }

    #[test]
    fn test_fractional_page_number_rejected() {
        let mut doc = comic_manifest();
        doc["works"][0]["raw_media"]["ch1"]["pages"][1]["page"] = json!(1.5);

        let err = validate(&doc).unwrap_err();
        assert_eq!(err.path, "$.works[0].raw_media.ch1.pages[1].page");

        doc["works"][0]["raw_media"]["ch1"]["pages"][1]["page"] = json!(-2);
        assert!(validate(&doc).is_err());
    }

    #[test]
    fn test_validate_slice_rejects_garbage() {
        let err = validate_slice(b"<html>").unwrap_err();
        assert_eq!(err.path, "$");
        assert!(err.reason.starts_with("not valid JSON"));
    }
}
