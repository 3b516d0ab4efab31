//! Typed bindings for well-known D-Bus interfaces.
//!
//! ## Cargo features
//!
//! - `loopback`: Builds against the in-process backend.
//!   *Enabled by default.*
//! - `libsystemd`: Builds against the `sd-bus` backend.
//!   *Disabled by default.*
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod notifications;
