//! Movdemux - MOV/MP4 inspection tool
//!
//! This library crate exposes the CLI's config loading and report rendering
//! for integration testing. Demuxing itself lives in `movdemux-media`.

pub mod config;
pub mod report;
