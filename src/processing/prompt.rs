//! Task-specific prompt construction
//!
//! Building a prompt is a pure function of its inputs: the same task type,
//! context and auxiliary data always produce the same [`Prompt`]. Auxiliary
//! data is held in a `BTreeMap`, so extra sections are emitted in key order.

use crate::llm::provider::Message;
use crate::protocol::messages::TaskType;
use std::collections::BTreeMap;

/// Auxiliary keys that carry the prior risk list for a consistency check
pub const PRIOR_RISK_KEYS: [&str; 3] = ["prior_risks", "risks", "risk_list"];

/// Category names offered to the model as a vocabulary hint
pub const RISK_VOCABULARY: [&str; 14] = [
    "Market Risk",
    "Credit Risk",
    "Operational Risk",
    "Liquidity Risk",
    "Financial Risk",
    "Legal/Regulatory Risk",
    "Technology Risk",
    "Cybersecurity Risk",
    "Competition Risk",
    "Supply Chain Risk",
    "Human Capital/Talent Risk",
    "Environmental/Climate Risk",
    "COVID-19/Pandemic Risk",
    "Geopolitical Risk",
];

const EMPTY_CONTEXT_NOTE: &str = "(no company context was provided)";

/// A rendered prompt: system instructions plus the user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }

    /// Single-string rendering, for logs and single-turn backends
    pub fn text(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// Stateless prompt builder
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build(
        task_type: TaskType,
        company_context: &str,
        auxiliary_data: &BTreeMap<String, String>,
    ) -> Prompt {
        let system = match task_type {
            TaskType::RiskClassification => risk_classification_instructions(),
            TaskType::BusinessSummary => business_summary_instructions(),
            TaskType::ConsistencyCheck => consistency_check_instructions(),
        };

        let mut user = format!(
            "Task: {}\n\nCompany context:\n{}\n",
            task_type.title(),
            context_or_note(company_context)
        );

        if task_type == TaskType::ConsistencyCheck {
            user.push_str("\nPrior risk list:\n");
            match prior_risks(auxiliary_data) {
                Some(risks) => {
                    user.push_str(risks.trim());
                    user.push('\n');
                }
                None => user.push_str(
                    "(no prior risk list was provided; answer with an empty list)\n",
                ),
            }
        }

        for (key, value) in auxiliary_data {
            if task_type == TaskType::ConsistencyCheck && PRIOR_RISK_KEYS.contains(&key.as_str())
            {
                continue;
            }
            user.push_str(&format!("\nAdditional input ({key}):\n{}\n", value.trim()));
        }

        Prompt { system, user }
    }
}

/// First matching prior-risk entry, in `PRIOR_RISK_KEYS` order
pub fn prior_risks(auxiliary_data: &BTreeMap<String, String>) -> Option<&str> {
    PRIOR_RISK_KEYS
        .iter()
        .find_map(|key| auxiliary_data.get(*key))
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
}

fn context_or_note(company_context: &str) -> &str {
    let trimmed = company_context.trim();
    if trimmed.is_empty() {
        EMPTY_CONTEXT_NOTE
    } else {
        trimmed
    }
}

fn risk_classification_instructions() -> String {
    let vocabulary = RISK_VOCABULARY
        .iter()
        .map(|name| format!("- {name}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a financial risk analyst. Read the company context (typically a 10-K Risk Factors section) and classify the risks it describes.

Prefer these category names, spelled exactly as shown:
{vocabulary}

If the company faces a material risk none of these cover, add a short company-specific category name ending in "Risk".

Return only a JSON object of this form, one category per array element:
{{"task": "risk_classification", "risk_classification": ["Category 1", "Category 2"]}}

Only include categories clearly supported by the text."#
    )
}

fn business_summary_instructions() -> String {
    r#"You are a business analyst. Read the company context (typically a 10-K Business section) and summarize it in exactly three fields:
- industry: the industry or sector the company operates in
- products: the main products or services it offers
- geography: the geographic markets it serves

Each field is a short free-text string. Return only a JSON object of this form:
{"task": "business_summary", "business_summary": {"industry": "...", "products": "...", "geography": "..."}}"#
        .to_string()
}

fn consistency_check_instructions() -> String {
    r#"You are a financial document analyst. You are given a company context and a prior list of claimed risks. Compare each listed risk against the context and identify the risks that are inconsistent with it or not supported by it.

Return only a JSON object of this form, using the risk names exactly as listed:
{"task": "consistency_check", "consistency_check": ["Risk A", "Risk B"]}

If every listed risk is supported, return an empty list:
{"task": "consistency_check", "consistency_check": []}"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_aux() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn test_build_is_deterministic() {
        let mut aux = BTreeMap::new();
        aux.insert("prior_risks".to_string(), "Credit Risk\nMarket Risk".to_string());
        aux.insert("filing_year".to_string(), "2023".to_string());

        for task_type in TaskType::ALL {
            let first = PromptBuilder::build(task_type, "A regional bank", &aux);
            let second = PromptBuilder::build(task_type, "A regional bank", &aux);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_risk_prompt_lists_vocabulary() {
        let prompt = PromptBuilder::build(
            TaskType::RiskClassification,
            "A mid-cap regional bank with heavy mortgage exposure",
            &no_aux(),
        );

        for name in ["Market Risk", "Credit Risk", "Liquidity Risk", "Operational Risk"] {
            assert!(prompt.system.contains(name), "missing {name}");
        }
        assert!(prompt.system.contains("\"risk_classification\""));
        assert!(prompt.user.contains("heavy mortgage exposure"));
    }

    #[test]
    fn test_business_prompt_names_three_fields() {
        let prompt = PromptBuilder::build(TaskType::BusinessSummary, "ACME", &no_aux());

        for field in ["industry", "products", "geography"] {
            assert!(prompt.system.contains(field), "missing {field}");
        }
    }

    #[test]
    fn test_consistency_prompt_includes_prior_risks() {
        let mut aux = BTreeMap::new();
        aux.insert(
            "prior_risks".to_string(),
            "Cybersecurity Risk, Geopolitical Risk".to_string(),
        );

        let prompt = PromptBuilder::build(TaskType::ConsistencyCheck, "ACME", &aux);

        assert!(prompt.user.contains("Prior risk list:\nCybersecurity Risk, Geopolitical Risk"));
        assert!(!prompt.user.contains("Additional input (prior_risks)"));
        assert!(prompt.system.contains("empty list"));
    }

    #[test]
    fn test_consistency_prompt_without_prior_risks() {
        let prompt = PromptBuilder::build(TaskType::ConsistencyCheck, "ACME", &no_aux());
        assert!(prompt.user.contains("no prior risk list was provided"));
    }

    #[test]
    fn test_prior_risk_key_aliases() {
        let mut aux = BTreeMap::new();
        aux.insert("risk_list".to_string(), "Market Risk".to_string());
        assert_eq!(prior_risks(&aux), Some("Market Risk"));

        aux.insert("prior_risks".to_string(), "  ".to_string());
        assert_eq!(prior_risks(&aux), None);
    }

    #[test]
    fn test_empty_context_still_produces_prompt() {
        for task_type in TaskType::ALL {
            let prompt = PromptBuilder::build(task_type, "   \n\t", &no_aux());
            assert!(!prompt.system.is_empty());
            assert!(prompt.user.contains(EMPTY_CONTEXT_NOTE));
        }
    }

    #[test]
    fn test_extra_auxiliary_data_in_key_order() {
        let mut aux = BTreeMap::new();
        aux.insert("zeta".to_string(), "last".to_string());
        aux.insert("alpha".to_string(), "first".to_string());

        let prompt = PromptBuilder::build(TaskType::BusinessSummary, "ACME", &aux);
        let alpha = prompt.user.find("Additional input (alpha)").unwrap();
        let zeta = prompt.user.find("Additional input (zeta)").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn test_messages_and_text() {
        let prompt = PromptBuilder::build(TaskType::BusinessSummary, "ACME", &no_aux());
        let messages = prompt.to_messages();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, prompt.system);
        assert_eq!(messages[1].content, prompt.user);
        assert!(prompt.text().starts_with(&prompt.system));
    }
}
