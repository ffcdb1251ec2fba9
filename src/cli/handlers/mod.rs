// src/cli/handlers/mod.rs

pub mod commons;
pub mod config;
pub mod console;
pub mod exec;
pub mod info;
