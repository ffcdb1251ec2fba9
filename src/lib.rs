//! # irepl
//!
//! Drives a long-lived interactive interpreter (a read-eval-print loop) on behalf of a
//! request/response front-end and streams its output back line by line, instead of waiting for
//! each command to finish.
//!
//! - **`system`**: process plumbing (spawning, merged output readers, interrupts, UTF-8 decoding).
//! - **`core`**: the prompt-detecting driver, the output dispatcher, and the execution session.
//! - **`cli`**: a small terminal front-end built on top of the session.

include!(concat!(env!("OUT_DIR"), "/messages.rs"));

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Flag a front-end flips (e.g. on Ctrl+C) to interrupt the execution in flight.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
