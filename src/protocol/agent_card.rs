//! Discovery descriptor served at the well-known agent card path
//!
//! The card is built once from configuration. Its skill list is the same set
//! of task types the dispatcher accepts.

use crate::config::AnalystConfig;
use crate::protocol::messages::TaskType;
use serde::{Deserialize, Serialize};

/// Well-known path of the agent card
pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub capabilities: AgentCapabilities,
    pub skills: Vec<AgentSkill>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub streaming: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
}

impl AgentCard {
    pub fn from_config(config: &AnalystConfig) -> Self {
        let skills = config
            .supported_task_types()
            .into_iter()
            .map(AgentSkill::for_task)
            .collect();

        Self {
            name: config.agent.id.clone(),
            description: config.agent.description.clone(),
            url: config.server.advertised_url(),
            version: config.agent.version.clone(),
            default_input_modes: vec!["text".to_string(), "application/json".to_string()],
            default_output_modes: vec!["application/json".to_string()],
            capabilities: AgentCapabilities { streaming: false },
            skills,
        }
    }

    /// Task types declared by this card, in skill order
    pub fn declared_task_types(&self) -> Vec<TaskType> {
        self.skills
            .iter()
            .filter_map(|skill| TaskType::parse(&skill.id))
            .collect()
    }
}

impl AgentSkill {
    fn for_task(task_type: TaskType) -> Self {
        let (description, example) = match task_type {
            TaskType::RiskClassification => (
                "Classifies the risk factors of a 10-K filing into named risk categories",
                "Analyze this 10-K Risk Factors section and classify the risks",
            ),
            TaskType::BusinessSummary => (
                "Summarizes industry, products and geography from a 10-K Business section",
                "Extract a business summary from this filing",
            ),
            TaskType::ConsistencyCheck => (
                "Checks a prior risk list against the company context",
                "Which of these risks are not supported by the MD&A section?",
            ),
        };

        Self {
            id: task_type.as_str().to_string(),
            name: task_type.title().to_string(),
            description: description.to_string(),
            tags: vec![
                "finance".to_string(),
                "10-K".to_string(),
                task_type.as_str().replace('_', "-"),
            ],
            examples: vec![example.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_declares_all_configured_skills() {
        let config = AnalystConfig::test_config();
        let card = AgentCard::from_config(&config);

        assert_eq!(card.name, "test-analyst");
        assert_eq!(card.declared_task_types(), TaskType::ALL.to_vec());
        assert!(!card.capabilities.streaming);
    }

    #[test]
    fn test_card_serializes_camel_case() {
        let config = AnalystConfig::test_config();
        let card = AgentCard::from_config(&config);
        let json = serde_json::to_value(&card).unwrap();

        assert!(json["defaultInputModes"].is_array());
        assert!(json["defaultOutputModes"].is_array());
        assert_eq!(json["skills"][0]["id"], "risk_classification");
        assert_eq!(json["url"], "http://127.0.0.1:9020/");
    }

    #[test]
    fn test_card_limited_skills() {
        let mut config = AnalystConfig::test_config();
        config.agent.skills = vec!["business_summary".to_string()];
        let card = AgentCard::from_config(&config);

        assert_eq!(card.skills.len(), 1);
        assert_eq!(card.declared_task_types(), vec![TaskType::BusinessSummary]);
    }
}
