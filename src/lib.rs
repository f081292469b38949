//! Finance Analyst - 10-K filing analysis agent
//!
//! Answers three fixed analysis tasks over a company's filing text with the
//! help of an LLM backend:
//! - `risk_classification`: named risk categories for the company
//! - `business_summary`: industry, products and geography
//! - `consistency_check`: prior risk labels the context does not support
//!
//! A request flows through [`agent::TaskDispatcher`]: the task type is taken
//! from the request, [`processing::PromptBuilder`] renders the prompt,
//! [`llm::LlmClient`] makes the bounded, retrying call, and
//! [`processing::ResponseParser`] normalizes the answer into a
//! [`protocol::TaskResult`].
//!
//! # Quick Start
//!
//! ```rust
//! use finance_analyst::processing::ResponseParser;
//! use finance_analyst::protocol::TaskType;
//!
//! let result = ResponseParser::parse(
//!     TaskType::RiskClassification,
//!     "1. Credit Risk\n2. Market Risk",
//! )
//! .unwrap();
//!
//! assert_eq!(
//!     serde_json::to_string(&result).unwrap(),
//!     r#"{"task":"risk_classification","risk_classification":["Credit Risk","Market Risk"]}"#
//! );
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod observability;
pub mod processing;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use agent::TaskDispatcher;
pub use config::*;
pub use error::{DispatchError, DispatchResult};
pub use protocol::*;
