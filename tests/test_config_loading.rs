//! Configuration loading tests against real files on disk

use finance_analyst::config::{AnalystConfig, ConfigError};
use finance_analyst::protocol::TaskType;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;


fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{}", content).unwrap();
    file
}

#[test]
fn test_load_valid_config_file() {
    let file = write_config(
        r#"
[agent]
id = "purple-analyst"
name = "Purple Analyst"
description = "Answers 10-K questions"
skills = ["risk_classification", "business_summary"]

[llm]
provider = "openrouter"
model = "deepseek/deepseek-v3.2"
api_key_env = "OPENROUTER_API_KEY"
temperature = 0.1
max_tokens = 1500
timeout_secs = 45
max_retries = 3

[server]
host = "0.0.0.0"
port = 9100
request_deadline_secs = 120
"#,
    );

    let config = AnalystConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.agent.id, "purple-analyst");
    assert_eq!(config.agent.name, "Purple Analyst");
    assert_eq!(
        config.supported_task_types(),
        vec![TaskType::RiskClassification, TaskType::BusinessSummary]
    );
    assert_eq!(config.llm.provider, "openrouter");
    assert_eq!(config.llm.max_tokens, Some(1500));
    assert_eq!(config.llm.timeout(), Duration::from_secs(45));
    assert_eq!(config.llm.max_retries, 3);
    assert_eq!(
        config.llm.resolved_base_url(),
        "https://openrouter.ai/api/v1"
    );
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.server.request_deadline(), Duration::from_secs(120));
}

#[test]
fn test_shared_test_config_is_valid() {
    let config = test_helpers::test_config();

    assert_eq!(config.agent.id, "test-analyst");
    assert_eq!(config.llm.provider, "openai");
    assert_eq!(config.llm.resolved_base_url(), "https://api.openai.com/v1");
    assert_eq!(config.supported_task_types().len(), 3);
}

#[test]
fn test_minimal_config_file_uses_defaults() {
    let file = write_config("[agent]\nid = \"minimal\"");

    let config = AnalystConfig::load_from_file(file.path()).unwrap();

    assert_eq!(config.supported_task_types(), TaskType::ALL.to_vec());
    assert_eq!(config.llm.provider, "openrouter");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.advertised_url(), "http://127.0.0.1:9020/");
}

#[test]
fn test_invalid_agent_id_rejected() {
    let file = write_config("[agent]\nid = \"bad id with spaces\"");

    let result = AnalystConfig::load_from_file(file.path());
    assert!(matches!(result, Err(ConfigError::InvalidAgentId(_))));
}

#[test]
fn test_unknown_skill_rejected() {
    let file = write_config(
        r#"
[agent]
id = "analyst"
skills = ["risk_classification", "stock_picking"]
"#,
    );

    match AnalystConfig::load_from_file(file.path()) {
        Err(ConfigError::InvalidConfig(message)) => assert!(message.contains("stock_picking")),
        other => panic!("Expected InvalidConfig, got {:?}", other),
    }
}

#[test]
fn test_duplicate_skill_rejected() {
    let file = write_config(
        r#"
[agent]
id = "analyst"
skills = ["business_summary", "business_summary"]
"#,
    );

    match AnalystConfig::load_from_file(file.path()) {
        Err(ConfigError::InvalidConfig(message)) => assert!(message.contains("more than once")),
        other => panic!("Expected InvalidConfig, got {:?}", other),
    }
}

#[test]
fn test_empty_skills_rejected() {
    let file = write_config("[agent]\nid = \"analyst\"\nskills = []");

    assert!(matches!(
        AnalystConfig::load_from_file(file.path()),
        Err(ConfigError::InvalidConfig(_))
    ));
}

#[test]
fn test_partial_llm_section_keeps_token_cap() {
    let file = write_config(
        r#"
[agent]
id = "analyst"

[llm]
model = "openai/gpt-4o-mini"
temperature = 0.0
"#,
    );

    let config = AnalystConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.llm.model, "openai/gpt-4o-mini");
    assert_eq!(config.llm.max_tokens, Some(2000));
    assert_eq!(config.llm.max_retries, 2);
}

#[test]
fn test_unsupported_provider_rejected() {
    let file = write_config(
        r#"
[agent]
id = "analyst"

[llm]
provider = "carrier-pigeon"
"#,
    );

    match AnalystConfig::load_from_file(file.path()) {
        Err(ConfigError::InvalidConfig(message)) => assert!(message.contains("carrier-pigeon")),
        other => panic!("Expected InvalidConfig, got {:?}", other),
    }
}

#[test]
fn test_temperature_out_of_range_rejected() {
    let file = write_config(
        r#"
[agent]
id = "analyst"

[llm]
temperature = 3.5
"#,
    );

    assert!(matches!(
        AnalystConfig::load_from_file(file.path()),
        Err(ConfigError::InvalidConfig(_))
    ));
}

#[test]
fn test_zero_deadline_rejected() {
    let file = write_config(
        r#"
[agent]
id = "analyst"

[server]
request_deadline_secs = 0
"#,
    );

    assert!(matches!(
        AnalystConfig::load_from_file(file.path()),
        Err(ConfigError::InvalidConfig(_))
    ));
}

#[test]
fn test_invalid_base_url_rejected() {
    let file = write_config(
        r#"
[agent]
id = "analyst"

[llm]
base_url = "ftp://models.internal"
"#,
    );

    match AnalystConfig::load_from_file(file.path()) {
        Err(ConfigError::InvalidConfig(message)) => assert!(message.contains("llm.base_url")),
        other => panic!("Expected InvalidConfig, got {:?}", other),
    }
}

#[test]
fn test_base_url_trailing_slash_trimmed() {
    let file = write_config(
        r#"
[agent]
id = "analyst"

[llm]
provider = "openai"
base_url = "http://localhost:8000/v1/"
"#,
    );

    let config = AnalystConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.llm.resolved_base_url(), "http://localhost:8000/v1");
}

#[test]
fn test_missing_file() {
    let result = AnalystConfig::load_from_file(std::path::Path::new(
        "/definitely/not/here/analyst.toml",
    ));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml() {
    let file = write_config("[agent\nid = ");

    assert!(matches!(
        AnalystConfig::load_from_file(file.path()),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn test_missing_agent_section() {
    let file = write_config("[llm]\nprovider = \"openai\"");

    assert!(matches!(
        AnalystConfig::load_from_file(file.path()),
        Err(ConfigError::TomlParse(_))
    ));
}

#[test]
fn test_api_key_from_environment() {
    let file = write_config(
        r#"
[agent]
id = "analyst"

[llm]
api_key_env = "FINANCE_ANALYST_CONFIG_TEST_KEY"
"#,
    );
    let config = AnalystConfig::load_from_file(file.path()).unwrap();

    std::env::remove_var("FINANCE_ANALYST_CONFIG_TEST_KEY");
    assert!(matches!(
        config.get_llm_api_key(),
        Err(ConfigError::EnvVarNotFound(name)) if name == "FINANCE_ANALYST_CONFIG_TEST_KEY"
    ));

    std::env::set_var("FINANCE_ANALYST_CONFIG_TEST_KEY", "sk-test-123");
    assert_eq!(config.get_llm_api_key().unwrap(), "sk-test-123");
    std::env::remove_var("FINANCE_ANALYST_CONFIG_TEST_KEY");
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = test_helpers::test_config();

    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = AnalystConfig::from_toml_str(&rendered).unwrap();

    assert_eq!(reparsed, config);
}
