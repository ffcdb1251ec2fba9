// src/core/dispatcher.rs

//! Turns raw output batches into front-end events.
//!
//! The dispatcher owns the set of display ids already emitted as fresh displays. The first
//! occurrence of an id creates a display region (`DisplayData`); every later occurrence in the
//! same session replaces it (`UpdateDisplayData`). Items without an id are always fresh.

use crate::core::extractor::ContentExtractor;
use crate::models::{OutboundEvent, RichContent, StreamName};
use std::collections::HashSet;
use std::fmt;

/// The front-end's receiving end.
pub trait EventSink {
    fn send(&mut self, event: OutboundEvent);
}

impl EventSink for Vec<OutboundEvent> {
    fn send(&mut self, event: OutboundEvent) {
        self.push(event);
    }
}

pub struct OutputDispatcher {
    extractor: Box<dyn ContentExtractor>,
    known_display_ids: HashSet<String>,
}

impl fmt::Debug for OutputDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputDispatcher")
            .field("known_display_ids", &self.known_display_ids)
            .finish_non_exhaustive()
    }
}

impl OutputDispatcher {
    pub fn new(extractor: Box<dyn ContentExtractor>) -> Self {
        Self {
            extractor,
            known_display_ids: HashSet::new(),
        }
    }

    /// Extracts content from `raw` and forwards it to `sink`. Does nothing when `silent`.
    pub fn dispatch(&mut self, raw: &str, silent: bool, sink: &mut dyn EventSink) {
        if silent {
            return;
        }

        let extraction = self.extractor.extract(raw);
        if !extraction.plain.is_empty() {
            sink.send(OutboundEvent::Stream {
                name: StreamName::Stdout,
                text: extraction.plain,
            });
        }

        for item in extraction.items {
            match item {
                RichContent::StreamText(text) => {
                    if !text.is_empty() {
                        sink.send(OutboundEvent::Stream {
                            name: StreamName::Stdout,
                            text,
                        });
                    }
                }
                RichContent::ErrorMarker(message) => sink.send(OutboundEvent::Stream {
                    name: StreamName::Stderr,
                    text: message,
                }),
                RichContent::Display(payload) => {
                    let event = match payload.display_id() {
                        Some(id) if self.known_display_ids.contains(id) => {
                            OutboundEvent::UpdateDisplayData(payload)
                        }
                        Some(id) => {
                            log::trace!("New display id '{}'.", id);
                            self.known_display_ids.insert(id.to_string());
                            OutboundEvent::DisplayData(payload)
                        }
                        None => OutboundEvent::DisplayData(payload),
                    };
                    sink.send(event);
                }
            }
        }
    }

    /// Sends `text` as-is, bypassing the extractor. Used for kernel-originated notices.
    pub fn emit_stream(
        &self,
        name: StreamName,
        text: impl Into<String>,
        silent: bool,
        sink: &mut dyn EventSink,
    ) {
        let text = text.into();
        if silent || text.is_empty() {
            return;
        }
        sink.send(OutboundEvent::Stream { name, text });
    }

    pub fn is_known(&self, display_id: &str) -> bool {
        self.known_display_ids.contains(display_id)
    }

    pub fn known_display_ids(&self) -> &HashSet<String> {
        &self.known_display_ids
    }

    /// Forgets every display id. Called when the interpreter is respawned.
    pub fn reset(&mut self) {
        self.known_display_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::{MarkerExtractor, PlainTextExtractor};
    use crate::models::{DisplayPayload, Extraction};

    fn scripted(items: Vec<RichContent>) -> OutputDispatcher {
        OutputDispatcher::new(Box::new(move |raw: &str| Extraction {
            plain: raw.to_string(),
            items: items.clone(),
        }))
    }

    #[test]
    fn test_display_id_is_fresh_once_then_updates() {
        let progress = DisplayPayload::new("text/plain", "10%").with_display_id("bar");
        let mut dispatcher = scripted(vec![RichContent::Display(progress.clone())]);
        let mut sink: Vec<OutboundEvent> = Vec::new();

        dispatcher.dispatch("", false, &mut sink);
        dispatcher.dispatch("", false, &mut sink);
        dispatcher.dispatch("", false, &mut sink);

        assert_eq!(
            sink,
            vec![
                OutboundEvent::DisplayData(progress.clone()),
                OutboundEvent::UpdateDisplayData(progress.clone()),
                OutboundEvent::UpdateDisplayData(progress),
            ]
        );
        assert!(dispatcher.is_known("bar"));
    }

    #[test]
    fn test_items_without_id_are_always_fresh() {
        let chart = DisplayPayload::new("image/svg+xml", "<svg/>");
        let mut dispatcher = scripted(vec![RichContent::Display(chart.clone())]);
        let mut sink: Vec<OutboundEvent> = Vec::new();

        dispatcher.dispatch("", false, &mut sink);
        dispatcher.dispatch("", false, &mut sink);

        assert_eq!(
            sink,
            vec![
                OutboundEvent::DisplayData(chart.clone()),
                OutboundEvent::DisplayData(chart)
            ]
        );
        assert!(dispatcher.known_display_ids().is_empty());
    }

    #[test]
    fn test_plain_text_comes_before_items_in_order() {
        let mut dispatcher = scripted(vec![
            RichContent::StreamText("extra".to_string()),
            RichContent::StreamText(String::new()),
            RichContent::ErrorMarker("bad payload".to_string()),
        ]);
        let mut sink: Vec<OutboundEvent> = Vec::new();
        dispatcher.dispatch("hello\n", false, &mut sink);

        assert_eq!(
            sink,
            vec![
                OutboundEvent::Stream {
                    name: StreamName::Stdout,
                    text: "hello\n".to_string()
                },
                OutboundEvent::Stream {
                    name: StreamName::Stdout,
                    text: "extra".to_string()
                },
                OutboundEvent::Stream {
                    name: StreamName::Stderr,
                    text: "bad payload".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_silent_dispatch_is_a_no_op() {
        let payload = DisplayPayload::new("text/plain", "x").with_display_id("quiet");
        let mut dispatcher = scripted(vec![RichContent::Display(payload)]);
        let mut sink: Vec<OutboundEvent> = Vec::new();

        dispatcher.dispatch("text", true, &mut sink);
        dispatcher.emit_stream(StreamName::Stdout, "notice", true, &mut sink);

        assert!(sink.is_empty());
        // A silent batch must not mark the id as shown.
        assert!(!dispatcher.is_known("quiet"));
    }

    #[test]
    fn test_empty_plain_text_emits_nothing() {
        let mut dispatcher = OutputDispatcher::new(Box::new(PlainTextExtractor));
        let mut sink: Vec<OutboundEvent> = Vec::new();
        dispatcher.dispatch("", false, &mut sink);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_reset_makes_ids_fresh_again() {
        let mut dispatcher = OutputDispatcher::new(Box::new(MarkerExtractor));
        let line = "irepl: display data: {\"data\": {\"text/plain\": \"1\"}, \"transient\": {\"display_id\": \"d\"}}\n";
        let mut sink: Vec<OutboundEvent> = Vec::new();

        dispatcher.dispatch(line, false, &mut sink);
        dispatcher.reset();
        dispatcher.dispatch(line, false, &mut sink);

        assert_eq!(sink.len(), 2);
        assert!(sink
            .iter()
            .all(|event| matches!(event, OutboundEvent::DisplayData(_))));
    }
}
