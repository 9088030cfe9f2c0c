//! Mediarelay - range-seekable video and comic page relay
//!
//! This library crate exposes the relay, locator, and server for integration
//! testing and embedding.

pub mod catalog;
pub mod config;
pub mod locator;
pub mod provider;
pub mod relay;
pub mod retry;
pub mod server;
pub mod throttle;
