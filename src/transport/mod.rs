//! Inbound transport
//!
//! The dispatcher itself is transport-agnostic; this module exposes it over
//! HTTP with warp.

pub mod http;

pub use http::{routes, serve, ServerState};
