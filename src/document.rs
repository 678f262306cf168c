// Document model returned by Document AI and the offset-based text reconstruction.
//
// Document AI does not repeat text per page. Every layout element points back
// into `Document::text` through one or more half-open character ranges.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use std::iter;
use tracing::debug;

use crate::error::RevealError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub page_number: u32,
    #[serde(default)]
    pub layout: Layout,
}

/// Ordered text segments of one layout element.
///
/// Segments may be non-contiguous (a paragraph wrapped across columns) and
/// are kept in the order the parser emitted them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "WireLayout")]
pub struct Layout {
    pub segments: Vec<TextSegment>,
}

/// Half-open character range `[start_index, end_index)` into the document text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSegment {
    #[serde(default, deserialize_with = "de_index")]
    pub start_index: usize,
    #[serde(default, deserialize_with = "de_index")]
    pub end_index: usize,
}

#[cfg(test)]
impl TextSegment {
    pub fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index,
            end_index,
        }
    }
}

#[cfg(test)]
impl Layout {
    pub fn new(segments: Vec<TextSegment>) -> Self {
        Self { segments }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLayout {
    text_anchor: Option<WireTextAnchor>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTextAnchor {
    #[serde(default)]
    text_segments: Vec<TextSegment>,
}

impl From<WireLayout> for Layout {
    fn from(wire: WireLayout) -> Self {
        Self {
            segments: wire
                .text_anchor
                .map(|anchor| anchor.text_segments)
                .unwrap_or_default(),
        }
    }
}

/// int64 fields arrive as JSON strings ("42"), but accept bare numbers too.
fn de_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawIndex {
        Number(u64),
        Text(String),
    }

    match RawIndex::deserialize(deserializer)? {
        RawIndex::Number(n) => usize::try_from(n).map_err(D::Error::custom),
        RawIndex::Text(s) => s
            .trim()
            .parse::<usize>()
            .map_err(|e| D::Error::custom(format!("invalid text index {:?}: {}", s, e))),
    }
}

/// Character view of the document text, built once and shared by every page.
struct CharIndex<'a> {
    text: &'a str,
    // Byte offset of every char plus the end; `None` for ASCII text, where
    // char offsets are byte offsets.
    boundaries: Option<Vec<usize>>,
}

impl<'a> CharIndex<'a> {
    fn new(text: &'a str) -> Self {
        let boundaries = if text.is_ascii() {
            None
        } else {
            Some(
                text.char_indices()
                    .map(|(i, _)| i)
                    .chain(iter::once(text.len()))
                    .collect(),
            )
        };
        Self { text, boundaries }
    }

    fn char_len(&self) -> usize {
        self.boundaries
            .as_ref()
            .map_or(self.text.len(), |b| b.len() - 1)
    }

    fn extract(&self, layout: &Layout) -> Result<String, RevealError> {
        let len = self.char_len();
        let mut out = String::new();
        for segment in &layout.segments {
            let (start, end) = (segment.start_index, segment.end_index);
            if start > end || end > len {
                return Err(RevealError::OutOfRange { start, end, len });
            }
            match &self.boundaries {
                Some(b) => out.push_str(&self.text[b[start]..b[end]]),
                None => out.push_str(&self.text[start..end]),
            }
        }
        Ok(out)
    }
}

/// Converts the offsets of a layout into the text they cover.
///
/// Offsets count characters, not bytes. Segments are concatenated in input
/// order; a segment outside `[0, text length]` or with `start > end` fails.
pub fn layout_to_text(layout: &Layout, text: &str) -> Result<String, RevealError> {
    CharIndex::new(text).extract(layout)
}

/// Builds the classifier context: the text of every page, in page order.
pub fn build_context(document: &Document) -> Result<String, RevealError> {
    let index = CharIndex::new(&document.text);
    let mut context = String::new();
    for page in &document.pages {
        let chunk = index.extract(&page.layout)?;
        debug!(
            "Page {} contributed {} characters",
            page.page_number,
            chunk.chars().count()
        );
        context.push_str(&chunk);
    }
    Ok(context)
}
