//! Configuration system for the finance analyst agent
//!
//! Configuration is loaded once from a TOML file at startup and passed by
//! reference to the components that need it. Secrets are never stored in the
//! file; `[llm].api_key_env` names the environment variable holding the key.

use crate::protocol::messages::TaskType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main analyst configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystConfig {
    pub agent: AgentSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// Agent identity, also published in the agent card
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Agent identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_agent_description")]
    pub description: String,
    #[serde(default = "default_agent_version")]
    pub version: String,
    /// Task types this agent declares support for
    #[serde(default = "default_skills")]
    pub skills: Vec<String>,
}

fn default_agent_name() -> String {
    "10-K Financial Analyst".to_string()
}

fn default_agent_description() -> String {
    "Analyzes SEC 10-K filings: risk classification, business summary and consistency checks"
        .to_string()
}

fn default_agent_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_skills() -> Vec<String> {
    TaskType::ALL.iter().map(|t| t.as_str().to_string()).collect()
}

/// LLM backend section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSection {
    /// Provider name: "openai" or "openrouter" (both speak chat completions)
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable containing API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Override of the provider's default endpoint
    pub base_url: Option<String>,
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap sent with every request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,
    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Request `json_object` response format from the backend
    #[serde(default = "default_json_mode")]
    pub json_mode: bool,
}

fn default_provider() -> String {
    "openrouter".to_string()
}

fn default_model() -> String {
    "deepseek/deepseek-v3.2".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> Option<u32> {
    Some(2000)
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_json_mode() -> bool {
    true
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            json_mode: default_json_mode(),
        }
    }
}

impl LlmSection {
    /// Endpoint for the configured provider, honouring `base_url`
    pub fn resolved_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match self.provider.as_str() {
                "openai" => "https://api.openai.com/v1".to_string(),
                _ => "https://openrouter.ai/api/v1".to_string(),
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on the whole handling of one request
    #[serde(default = "default_request_deadline_secs")]
    pub request_deadline_secs: u64,
    /// URL advertised in the agent card, if different from host:port
    pub public_url: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9020
}

fn default_request_deadline_secs() -> u64 {
    180
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_deadline_secs: default_request_deadline_secs(),
            public_url: None,
        }
    }
}

impl ServerSection {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }

    pub fn advertised_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/", self.host, self.port))
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid agent ID format: {0}")]
    InvalidAgentId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AnalystConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AnalystConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agent_id(&self.agent.id)?;
        validate_skills(&self.agent.skills)?;

        match self.llm.provider.as_str() {
            "openai" | "openrouter" => {}
            other => {
                return Err(ConfigError::InvalidConfig(format!(
                    "Unsupported LLM provider '{other}' (expected \"openai\" or \"openrouter\")"
                )))
            }
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidConfig(format!(
                "llm.temperature {} must be between 0.0 and 2.0",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "llm.timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.server.request_deadline_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.request_deadline_secs must be greater than zero".to_string(),
            ));
        }

        if let Some(base_url) = &self.llm.base_url {
            validate_url("llm.base_url", base_url)?;
        }
        if let Some(public_url) = &self.server.public_url {
            validate_url("server.public_url", public_url)?;
        }

        Ok(())
    }

    /// Task types declared in `[agent].skills`, in declaration order
    pub fn supported_task_types(&self) -> Vec<TaskType> {
        self.agent
            .skills
            .iter()
            .filter_map(|skill| TaskType::parse(skill))
            .collect()
    }

    /// Get LLM API key from environment variable
    pub fn get_llm_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.llm.api_key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.llm.api_key_env.clone()))
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[agent]
id = "test-analyst"
description = "A test analyst"

[llm]
provider = "openai"
model = "mock-model"
api_key_env = "TEST_ANALYST_API_KEY"
timeout_secs = 5
max_retries = 1
backoff_ms = 10
"#;
        Self::from_toml_str(toml_content).expect("Test config should parse")
    }
}

/// Validate agent ID format
fn validate_agent_id(agent_id: &str) -> Result<(), ConfigError> {
    let valid_chars = agent_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if agent_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidAgentId(format!(
            "Agent ID '{agent_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

fn validate_skills(skills: &[String]) -> Result<(), ConfigError> {
    if skills.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "agent.skills must declare at least one task type".to_string(),
        ));
    }

    for (i, skill) in skills.iter().enumerate() {
        if TaskType::parse(skill).is_none() {
            return Err(ConfigError::InvalidConfig(format!(
                "agent.skills contains unknown task type '{skill}'"
            )));
        }
        if skills[..i].contains(skill) {
            return Err(ConfigError::InvalidConfig(format!(
                "agent.skills lists '{skill}' more than once"
            )));
        }
    }

    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidConfig(format!("{field} '{value}' is not a URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::InvalidConfig(format!(
            "{field} must use http or https, got '{scheme}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AnalystConfig::from_toml_str(
            r#"
[agent]
id = "minimal"
"#,
        )
        .unwrap();

        assert_eq!(config.agent.id, "minimal");
        assert_eq!(config.agent.skills.len(), 3);
        assert_eq!(config.llm.provider, "openrouter");
        assert_eq!(config.llm.model, "deepseek/deepseek-v3.2");
        assert_eq!(config.llm.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(config.llm.temperature, 0.2);
        assert_eq!(config.llm.max_retries, 2);
        assert!(config.llm.json_mode);
        assert_eq!(config.server.port, 9020);
        assert_eq!(config.server.request_deadline(), Duration::from_secs(180));
    }

    #[test]
    fn test_full_config() {
        let config = AnalystConfig::from_toml_str(
            r#"
[agent]
id = "purple.analyst"
name = "Analyst"
description = "Full config"
version = "2.1.0"
skills = ["consistency_check", "risk_classification"]

[llm]
provider = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"
base_url = "http://localhost:8000/v1/"
temperature = 0.0
max_tokens = 512
timeout_secs = 10
max_retries = 4
backoff_ms = 250
json_mode = false

[server]
host = "0.0.0.0"
port = 8088
request_deadline_secs = 30
public_url = "https://analyst.example.com/"
"#,
        )
        .unwrap();

        assert_eq!(
            config.supported_task_types(),
            vec![TaskType::ConsistencyCheck, TaskType::RiskClassification]
        );
        assert_eq!(config.llm.resolved_base_url(), "http://localhost:8000/v1");
        assert_eq!(config.llm.timeout(), Duration::from_secs(10));
        assert_eq!(config.llm.max_tokens, Some(512));
        assert!(!config.llm.json_mode);
        assert_eq!(config.server.advertised_url(), "https://analyst.example.com/");
    }

    #[test]
    fn test_resolved_base_url_per_provider() {
        let mut llm = LlmSection::default();
        assert_eq!(llm.resolved_base_url(), "https://openrouter.ai/api/v1");

        llm.provider = "openai".to_string();
        assert_eq!(llm.resolved_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_invalid_agent_id() {
        assert!(validate_agent_id("invalid@agent").is_err());
        assert!(validate_agent_id("").is_err());
        assert!(validate_agent_id("valid-agent_123.test").is_ok());
    }

    #[test]
    fn test_unknown_skill_rejected() {
        let result = AnalystConfig::from_toml_str(
            r#"
[agent]
id = "a"
skills = ["forecast_revenue"]
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_and_empty_skills_rejected() {
        assert!(validate_skills(&[]).is_err());
        assert!(validate_skills(&[
            "business_summary".to_string(),
            "business_summary".to_string()
        ])
        .is_err());
    }

    #[test]
    fn test_temperature_out_of_range_rejected() {
        let result = AnalystConfig::from_toml_str(
            r#"
[agent]
id = "a"

[llm]
temperature = 3.5
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_unsupported_provider_rejected() {
        let result = AnalystConfig::from_toml_str(
            r#"
[agent]
id = "a"

[llm]
provider = "anthropic"
"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_urls_rejected() {
        assert!(validate_url("llm.base_url", "not a url").is_err());
        assert!(validate_url("llm.base_url", "ftp://example.com").is_err());
        assert!(validate_url("llm.base_url", "https://example.com/v1").is_ok());
    }

    #[test]
    fn test_missing_api_key_env() {
        let mut config = AnalystConfig::test_config();
        config.llm.api_key_env = "FINANCE_ANALYST_DEFINITELY_UNSET_VAR".to_string();
        assert!(matches!(
            config.get_llm_api_key(),
            Err(ConfigError::EnvVarNotFound(_))
        ));
    }
}
