// src/core/extractor.rs

//! Content extraction: turning a batch of raw interpreter output into plain text plus rich
//! content items.
//!
//! The session treats extraction as an opaque, pure function behind `ContentExtractor`. Two
//! implementations ship with the crate:
//!
//! - `PlainTextExtractor` passes everything through as plain text.
//! - `MarkerExtractor` recognizes whole lines starting with a marker prefix. Code running in the
//!   interpreter prints those lines to publish rich output:
//!
//! ```text
//! irepl: display data: {"data": {"text/html": "<b>hi</b>"}, "transient": {"display_id": "p1"}}
//! irepl: saved html data to: /tmp/plot.html
//! irepl: saved markdown data to: /tmp/notes.md
//! irepl: saved svg data to: /tmp/figure.svg
//! ```
//!
//! A marker line that cannot be turned into content becomes an `ErrorMarker` item; the rest of
//! the batch is unaffected.

use crate::models::{DisplayPayload, Extraction, RichContent};
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DISPLAY_DATA_PREFIX: &str = "irepl: display data: ";
pub const SAVED_HTML_PREFIX: &str = "irepl: saved html data to: ";
pub const SAVED_MARKDOWN_PREFIX: &str = "irepl: saved markdown data to: ";
pub const SAVED_SVG_PREFIX: &str = "irepl: saved svg data to: ";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid display payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("Display payload has no data.")]
    EmptyPayload,
    #[error("Could not read rich content from '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Splits raw interpreter output into plain text and rich content.
///
/// Implementations must be deterministic and must not fail as a whole; per-item failures are
/// reported as `RichContent::ErrorMarker`.
pub trait ContentExtractor: Send {
    fn extract(&self, raw: &str) -> Extraction;
}

impl<F> ContentExtractor for F
where
    F: Fn(&str) -> Extraction + Send,
{
    fn extract(&self, raw: &str) -> Extraction {
        self(raw)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl ContentExtractor for PlainTextExtractor {
    fn extract(&self, raw: &str) -> Extraction {
        Extraction::plain(raw)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerExtractor;

#[derive(Debug, Clone, Copy)]
enum MarkerKind {
    DisplayData,
    SavedFile { mime_type: &'static str },
}

const MARKERS: &[(&str, MarkerKind)] = &[
    (DISPLAY_DATA_PREFIX, MarkerKind::DisplayData),
    (
        SAVED_HTML_PREFIX,
        MarkerKind::SavedFile {
            mime_type: "text/html",
        },
    ),
    (
        SAVED_MARKDOWN_PREFIX,
        MarkerKind::SavedFile {
            mime_type: "text/markdown",
        },
    ),
    (
        SAVED_SVG_PREFIX,
        MarkerKind::SavedFile {
            mime_type: "image/svg+xml",
        },
    ),
];

impl MarkerExtractor {
    fn extract_line(line: &str) -> Option<Result<RichContent, ExtractError>> {
        MARKERS.iter().find_map(|(prefix, kind)| {
            line.strip_prefix(prefix).map(|argument| {
                let argument = argument.trim_end_matches('\r').trim();
                match kind {
                    MarkerKind::DisplayData => parse_display_data(argument),
                    MarkerKind::SavedFile { mime_type } => load_saved_file(argument, mime_type),
                }
                .map(RichContent::Display)
            })
        })
    }
}

impl ContentExtractor for MarkerExtractor {
    fn extract(&self, raw: &str) -> Extraction {
        let mut plain_lines = Vec::new();
        let mut items = Vec::new();

        for line in raw.split('\n') {
            match Self::extract_line(line) {
                Some(Ok(content)) => items.push(content),
                Some(Err(e)) => {
                    log::debug!("Rich content could not be extracted: {}", e);
                    items.push(RichContent::ErrorMarker(e.to_string()));
                }
                None => plain_lines.push(line),
            }
        }

        Extraction {
            plain: plain_lines.join("\n"),
            items,
        }
    }
}

fn parse_display_data(json: &str) -> Result<DisplayPayload, ExtractError> {
    let value: Value = serde_json::from_str(json)?;
    let payload: DisplayPayload = serde_json::from_value(value)?;
    if payload.data.is_empty() {
        return Err(ExtractError::EmptyPayload);
    }
    Ok(payload)
}

fn load_saved_file(path: &str, mime_type: &str) -> Result<DisplayPayload, ExtractError> {
    let content = fs::read_to_string(Path::new(path)).map_err(|e| ExtractError::ReadFile {
        path: path.to_string(),
        source: e,
    })?;
    Ok(DisplayPayload::new(mime_type, content))
}
