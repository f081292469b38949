//! Protocol types for the three-task evaluation exchange
//!
//! Request/result message shapes and the discovery descriptor advertised to
//! evaluators.

pub mod agent_card;
pub mod messages;

pub use agent_card::*;
pub use messages::*;
