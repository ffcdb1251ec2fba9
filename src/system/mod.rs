//! # System Interaction Layer
//!
//! This module is the boundary between the driver logic and the operating system.
//!
//! ## Modules
//!
//! - **`process`**: Spawns the interpreter on a pseudo-terminal with echo off, reads the
//!   terminal's single ordered output stream, delivers interrupts, and tears the process down.
//! - **`decoder`**: Turns the raw byte chunks into text without splitting multi-byte characters
//!   that straddle two reads.

pub mod decoder;
pub mod process;
