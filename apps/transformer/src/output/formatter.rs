//! Output formatting: turns one completion section into the batch of Docs
//! requests that recreate it with heading structure.
//!
//! Heading levels are inferred from line shape alone: the first line is the
//! title (HEADING_1); later short lines with a colon are sub-headings
//! (HEADING_2); everything else is body text.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;

use crate::drive::models::{
    DocsRequest, InsertText, Location, NamedStyle, ParagraphStyle, Range, TextStyle,
    UpdateParagraphStyle, UpdateTextStyle, WeightedFontFamily,
};

/// Lines with at least this many words are never sub-headings.
const SUBHEADING_MAX_WORDS: usize = 5;
/// Structured documents start with an implicit newline at index 0.
const BODY_START_INDEX: usize = 1;

lazy_static! {
    /// `**text**` on a single line.
    static ref BOLD: Regex = Regex::new(r"\*\*(.*?)\*\*").unwrap();
}

#[derive(Debug, Clone)]
pub struct FormattedDocument {
    pub title: String,
    pub body: String,
    pub requests: Vec<DocsRequest>,
}

/// Removes `**bold**` markers, keeping the enclosed text. Markers never pair
/// across a line break.
pub fn strip_bold(text: &str) -> Cow<'_, str> {
    BOLD.replace_all(text, "$1")
}

pub fn line_style(index: usize, line: &str) -> NamedStyle {
    if index == 0 {
        NamedStyle::Heading1
    } else if line.split_whitespace().count() < SUBHEADING_MAX_WORDS && line.contains(':') {
        NamedStyle::Heading2
    } else {
        NamedStyle::NormalText
    }
}

/// Length in the unit the document service indexes by (UTF-16 code units).
fn doc_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Plans the requests that insert `text` into an empty document.
///
/// The title is the first line of `text` as given. Each line is inserted at a
/// cursor that starts at 1 and advances by the line length plus its newline;
/// each resulting paragraph then gets its named style. When `font` is set the
/// whole inserted range is switched to that font family.
pub fn format_document(text: &str, font: Option<&str>) -> FormattedDocument {
    let title = text.lines().next().unwrap_or_default().to_string();
    let body = strip_bold(text).into_owned();

    let mut requests = Vec::new();
    let mut cursor = BODY_START_INDEX;

    for (index, line) in body.lines().enumerate() {
        let paragraph = format!("{line}\n");
        let end = cursor + doc_len(&paragraph);

        requests.push(DocsRequest::InsertText(InsertText {
            location: Location { index: cursor },
            text: paragraph,
        }));
        requests.push(DocsRequest::UpdateParagraphStyle(UpdateParagraphStyle {
            range: Range {
                start_index: cursor,
                end_index: end,
            },
            paragraph_style: ParagraphStyle {
                named_style_type: line_style(index, line),
            },
            fields: "namedStyleType",
        }));

        cursor = end;
    }

    if let Some(font) = font.filter(|f| !f.is_empty()) {
        if cursor > BODY_START_INDEX {
            requests.push(DocsRequest::UpdateTextStyle(UpdateTextStyle {
                range: Range {
                    start_index: BODY_START_INDEX,
                    end_index: cursor,
                },
                text_style: TextStyle {
                    weighted_font_family: WeightedFontFamily {
                        font_family: font.to_string(),
                    },
                },
                fields: "weightedFontFamily",
            }));
        }
    }

    FormattedDocument {
        title,
        body,
        requests,
    }
}
