//! Task handling
//!
//! `dispatcher` runs typed requests end to end; `detection` turns free-text
//! messages into typed requests for the `/message` adapter.

pub mod detection;
pub mod dispatcher;

pub use detection::{detect_task_type, request_from_text};
pub use dispatcher::TaskDispatcher;
