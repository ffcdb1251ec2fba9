// src/core/kernel_info.rs

use crate::models::KernelMetadata;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref VERSION_PATTERN: Regex =
        Regex::new(r"version (\d+(\.\d+)+)").expect("version pattern is a valid regex");
}

/// Describes the kernel and the interpreter behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelInfo {
    pub implementation: String,
    pub implementation_version: String,
    pub banner: String,
    /// Parsed from the banner; `None` when the banner names no version.
    pub language_version: Option<String>,
    pub language: String,
    pub file_extension: String,
}

impl KernelInfo {
    /// Builds the info from configuration; a configured banner wins over the captured one.
    pub fn new(metadata: &KernelMetadata, captured_banner: &str) -> Self {
        let banner = metadata
            .banner
            .clone()
            .unwrap_or_else(|| captured_banner.trim().to_string());
        Self {
            implementation: metadata.implementation.clone(),
            implementation_version: env!("CARGO_PKG_VERSION").to_string(),
            language_version: language_version(&banner),
            banner,
            language: metadata.language.clone(),
            file_extension: metadata.file_extension.clone(),
        }
    }
}

/// The first `version X.Y[.Z...]` in `banner`.
pub fn language_version(banner: &str) -> Option<String> {
    VERSION_PATTERN
        .captures(banner)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}
