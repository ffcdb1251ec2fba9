// src/cli/render.rs

//! Terminal rendering of outbound events.

use crate::core::dispatcher::EventSink;
use crate::models::{DisplayPayload, ExecutionOutcome, ExecutionStatus, OutboundEvent, StreamName};
use colored::*;
use std::io::{self, Write};

/// Prints events as they arrive, either human-readable or as JSON lines.
#[derive(Debug, Default)]
pub struct TerminalSink {
    json: bool,
}

impl TerminalSink {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn print_outcome(&self, outcome: &ExecutionOutcome) {
        if self.json {
            match serde_json::to_string(outcome) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("Could not serialize outcome: {}", e),
            }
            return;
        }
        if let ExecutionStatus::Error { ename, evalue, .. } = &outcome.status {
            if ename.is_empty() {
                eprintln!("{} {}", "exit status".red().bold(), evalue.red());
            } else {
                eprintln!("{}: {}", ename.red().bold(), evalue);
            }
        }
    }
}

impl EventSink for TerminalSink {
    fn send(&mut self, event: OutboundEvent) {
        if self.json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("Could not serialize event: {}", e),
            }
            return;
        }

        match event {
            OutboundEvent::Stream {
                name: StreamName::Stdout,
                text,
            } => {
                print!("{}", text);
                // Partial lines and `\r` progress output should show up immediately.
                io::stdout().flush().ok();
            }
            OutboundEvent::Stream {
                name: StreamName::Stderr,
                text,
            } => eprint!("{}", text.red()),
            OutboundEvent::DisplayData(payload) => println!("{}", describe(&payload, false)),
            OutboundEvent::UpdateDisplayData(payload) => println!("{}", describe(&payload, true)),
            OutboundEvent::Error { ename, evalue, .. } => {
                log::debug!("Error event: {:?} {:?}", ename, evalue);
            }
        }
    }
}

/// The plain-text form of a display, or a summary of its mime types.
fn describe(payload: &DisplayPayload, update: bool) -> String {
    let body = match payload.plain_text() {
        Some(text) => text.to_string(),
        None => {
            let kinds: Vec<&str> = payload.data.keys().map(String::as_str).collect();
            format!("[{}]", kinds.join(", ")).dimmed().to_string()
        }
    };
    match (update, payload.display_id()) {
        (true, Some(id)) => format!("{} {}", format!("[{}]", id).cyan(), body),
        _ => body,
    }
}
