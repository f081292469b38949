//! Testing utilities and mock implementations
//!
//! Scriptable stand-ins for the LLM backend so task handling can be tested
//! without network access or an API key.

pub mod mocks;

pub use mocks::*;
