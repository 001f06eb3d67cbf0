//! Overlay scripts: positioned dialogue balloons per comic page.
//!
//! Scripts address pages by 1-based `pageNumber`, everything else in the
//! crate addresses pages by 0-based sequence index. [`PageIndex`] is the only
//! place where one becomes the other.

use serde::{Deserialize, Serialize};

/// 0-based position in a page sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PageIndex(usize);

impl PageIndex {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Convert a 1-based script page number; `0` has no index
    pub fn from_page_number(page_number: u32) -> Option<Self> {
        let index = page_number.checked_sub(1)?;
        usize::try_from(index).ok().map(Self)
    }

    pub fn get(&self) -> usize {
        self.0
    }

    /// The 1-based page number used by overlay scripts
    pub fn page_number(&self) -> u32 {
        u32::try_from(self.0)
            .ok()
            .and_then(|i| i.checked_add(1))
            .unwrap_or(u32::MAX)
    }
}

impl From<usize> for PageIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Visual style hint for a balloon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalloonStyle {
    Speech,
    Thought,
    Shout,
    Caption,
    #[serde(untagged)]
    Other(String),
}

/// A positioned text element. Coordinates are percentages (0-100) of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balloon {
    pub id: String,
    pub text: String,
    pub x: f64,
    pub y: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<BalloonStyle>,
}

/// Balloons for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptPage {
    #[serde(rename = "pageNumber")]
    pub page_number: u32,

    #[serde(default)]
    pub balloons: Vec<Balloon>,
}

/// Accepted on-the-wire shapes: a bare page array or `{version, pages}`
#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptDocument {
    Pages(Vec<ScriptPage>),
    Versioned {
        #[serde(default)]
        version: Option<String>,
        pages: Vec<ScriptPage>,
    },
}

impl From<ScriptDocument> for OverlayScript {
    fn from(doc: ScriptDocument) -> Self {
        match doc {
            ScriptDocument::Pages(pages) => Self {
                version: None,
                pages,
            },
            ScriptDocument::Versioned { version, pages } => Self { version, pages },
        }
    }
}

/// A localization script for one stream of one work
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ScriptDocument")]
pub struct OverlayScript {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub pages: Vec<ScriptPage>,
}

impl OverlayScript {
    pub fn new(pages: Vec<ScriptPage>) -> Self {
        Self {
            version: None,
            pages,
        }
    }

    /// The entry for a page. When several entries share a page number the
    /// first one wins and the rest are ignored.
    pub fn page(&self, index: PageIndex) -> Option<&ScriptPage> {
        let page_number = index.page_number();
        self.pages.iter().find(|p| p.page_number == page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_index_conversion() {
        assert_eq!(PageIndex::new(0).page_number(), 1);
        assert_eq!(PageIndex::new(41).page_number(), 42);
        assert_eq!(PageIndex::from_page_number(1), Some(PageIndex::new(0)));
        assert_eq!(PageIndex::from_page_number(0), None);
    }

    #[test]
    fn test_script_accepts_bare_array() {
        let script: OverlayScript = serde_json::from_value(json!([
            {"pageNumber": 1, "balloons": [{"id": "b1", "text": "Hi", "x": 10, "y": 20.5}]}
        ]))
        .unwrap();

        assert_eq!(script.version, None);
        assert_eq!(script.pages.len(), 1);
        assert_eq!(script.pages[0].balloons[0].x, 10.0);
    }

    #[test]
    fn test_script_accepts_versioned_object() {
        let script: OverlayScript = serde_json::from_value(json!({
            "version": "1",
            "pages": [{"pageNumber": 2, "balloons": [
                {"id": "b1", "text": "Hm...", "x": 50, "y": 50, "style": "thought"},
                {"id": "b2", "text": "Narration", "x": 5, "y": 5, "style": "boxed"}
            ]}]
        }))
        .unwrap();

        assert_eq!(script.version.as_deref(), Some("1"));
        let balloons = &script.page(PageIndex::new(1)).unwrap().balloons;
        assert_eq!(balloons[0].style, Some(BalloonStyle::Thought));
        assert_eq!(balloons[1].style, Some(BalloonStyle::Other("boxed".to_string())));
    }

    #[test]
    fn test_first_duplicate_page_wins() {
        let script = OverlayScript::new(vec![
            ScriptPage {
                page_number: 1,
                balloons: vec![Balloon {
                    id: "first".to_string(),
                    text: "a".to_string(),
                    x: 0.0,
                    y: 0.0,
                    width: None,
                    height: None,
                    style: None,
                }],
            },
            ScriptPage {
                page_number: 1,
                balloons: Vec::new(),
            },
        ]);

        let page = script.page(PageIndex::new(0)).unwrap();
        assert_eq!(page.balloons[0].id, "first");
    }
}
