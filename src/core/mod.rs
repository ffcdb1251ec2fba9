// src/core/mod.rs

pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod extractor;
pub mod kernel_info;
pub mod matcher;
pub mod session;
