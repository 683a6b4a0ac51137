//! # STRM Helper MCP Server Core
//!
//! This module manages the 115 STRM helper plugin of a media-server host.
//!
//! ## Features
//! - Typed editing of the plugin configuration
//! - Path-list decoding and encoding at the host boundary
//! - Full sync, share sync and directory browsing
//! - QR code login with a cancellable status poller
//!
//! ## Modules
//! - `console`: Plugin configuration and management operations
//! - `error`: Custom error types and error handling
//! - `host_api`: Transport to the host plugin runtime
//! - `models`: Host responses and tool requests
//! - `path_list`: Path-list codec
//! - `qr_login`: QR code login session
//! - `settings`: Configuration document and working settings

pub mod console;
pub mod error;
pub mod host_api;
pub mod models;
pub mod path_list;
pub mod qr_login;
pub mod settings;

#[cfg(test)]
pub mod testing;
