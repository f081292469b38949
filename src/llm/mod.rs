//! LLM access layer
//!
//! `provider` defines the single-call provider abstraction, `providers` holds
//! concrete backends, and `client` wraps a provider with the retry, timeout
//! and backoff policy used for every task.

pub mod client;
pub mod provider;
pub mod providers;

pub use client::*;
pub use provider::*;
pub use providers::*;
