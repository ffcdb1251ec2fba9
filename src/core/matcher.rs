// src/core/matcher.rs

//! Exact-string pattern search used by the read loop.
//!
//! A matcher holds an ordered list of patterns. Searching returns the match that starts earliest
//! in the buffer; when two patterns start at the same position, the one listed first wins (so
//! `"\r\n"` beats `"\r"`, and a prompt beats a line terminator).

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PromptError {
    #[error("The primary prompt must not be empty.")]
    EmptyPrimary,
    #[error("The continuation prompt must not be empty when set.")]
    EmptyContinuation,
}

/// The primary prompt and the optional continuation prompt of an interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSpec {
    primary: String,
    continuation: Option<String>,
}

impl PromptSpec {
    pub fn new(
        primary: impl Into<String>,
        continuation: Option<String>,
    ) -> Result<Self, PromptError> {
        let primary = primary.into();
        if primary.is_empty() {
            return Err(PromptError::EmptyPrimary);
        }
        if continuation.as_deref() == Some("") {
            return Err(PromptError::EmptyContinuation);
        }
        Ok(Self {
            primary,
            continuation,
        })
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }
}

/// What a match was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Prompt,
    Continuation,
    CrLf,
    Lf,
    Cr,
}

impl PatternKind {
    pub fn is_prompt(self) -> bool {
        matches!(self, Self::Prompt | Self::Continuation)
    }
}

/// A located match: byte offsets into the searched buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct PromptMatcher {
    patterns: Vec<(PatternKind, String)>,
}

impl PromptMatcher {
    /// Prompts, then `\r\n`, `\n` and `\r`, in that priority order.
    pub fn incremental(prompts: &PromptSpec) -> Self {
        let mut matcher = Self::prompts_only(prompts);
        matcher.patterns.extend([
            (PatternKind::CrLf, "\r\n".to_string()),
            (PatternKind::Lf, "\n".to_string()),
            (PatternKind::Cr, "\r".to_string()),
        ]);
        matcher
    }

    /// Only the primary and continuation prompts.
    pub fn prompts_only(prompts: &PromptSpec) -> Self {
        let mut patterns = vec![(PatternKind::Prompt, prompts.primary.clone())];
        if let Some(continuation) = &prompts.continuation {
            patterns.push((PatternKind::Continuation, continuation.clone()));
        }
        Self { patterns }
    }

    /// Only the primary prompt, as seen before the interpreter has printed anything.
    pub fn primary_only(prompts: &PromptSpec) -> Self {
        Self {
            patterns: vec![(PatternKind::Prompt, prompts.primary.clone())],
        }
    }

    pub fn find(&self, haystack: &str) -> Option<PatternMatch> {
        self.patterns
            .iter()
            .filter_map(|(kind, pattern)| {
                haystack.find(pattern.as_str()).map(|start| PatternMatch {
                    kind: *kind,
                    start,
                    end: start + pattern.len(),
                })
            })
            // `min_by_key` keeps the first of equal elements, i.e. the higher-priority pattern.
            .min_by_key(|m| m.start)
    }
}
