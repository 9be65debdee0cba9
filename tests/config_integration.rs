use llm_kbc_probe::config::AppConfig;
use llm_kbc_probe::llm::Provider;
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("KBC_RETRY__MAX_ATTEMPTS");
        env::remove_var("KBC_RETRY__MULTIPLIER_SECS");
        env::remove_var("KBC_SEARCH__LANGUAGE");
        env::remove_var("KBC_LLM__MODEL");
        env::remove_var("LLM_BASE_URL");
        env::remove_var("LLM_MODEL");
        env::remove_var("LLM_API_KEY");
        env::remove_var("OPENAI_API_KEY");
        env::remove_var("AZURE_DEPLOYMENT_NAME");
        env::remove_var("AZURE_API_VERSION");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load(None).expect("defaults should load");
    assert_eq!(config.llm.base_url, "https://api.openai.com");
    assert_eq!(config.search.language, "en");
    assert_eq!(config.retry.max_attempts, 10);
    assert_eq!(config.disambiguation.model, "gpt-4");
    assert_eq!(config.paths.similar_examples.to_str(), Some("examples.jsonl"));

    let policy = config.retry_policy().expect("policy");
    assert_eq!(policy.max_attempts(), 10);
    assert_eq!(policy.backoff().max_delay, Duration::from_secs(60));
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("KBC_RETRY__MAX_ATTEMPTS", "3");
        env::set_var("KBC_SEARCH__LANGUAGE", "de");
    }

    let config = AppConfig::load(None).expect("Failed to load config");
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.search.language, "de");

    clear_env_vars();
}

#[test]
#[serial]
fn test_unrepresentable_backoff_is_config_error() {
    clear_env_vars();
    unsafe {
        env::set_var("KBC_RETRY__MULTIPLIER_SECS", "1e20");
    }

    let config = AppConfig::load(None).expect("Failed to load config");
    let err = config.retry_policy().unwrap_err();
    assert!(err.to_string().contains("retry.multiplier_secs"));

    clear_env_vars();
}

#[test]
#[serial]
fn test_llm_variables_take_precedence() {
    clear_env_vars();
    unsafe {
        env::set_var("KBC_LLM__MODEL", "from-prefixed-env");
        env::set_var("LLM_MODEL", "llama3.1:latest");
        env::set_var("LLM_BASE_URL", "http://localhost:11434");
        env::set_var("OPENAI_API_KEY", "sk-fallback");
    }

    let config = AppConfig::load(None).expect("Failed to load config");
    let settings = config.llm_settings().expect("settings");
    assert_eq!(settings.model, "llama3.1:latest");
    assert_eq!(settings.provider, Provider::Ollama);
    assert_eq!(settings.api_key.as_deref(), Some("sk-fallback"));

    unsafe {
        env::set_var("LLM_API_KEY", "sk-primary");
    }
    let config = AppConfig::load(None).expect("Failed to load config");
    assert_eq!(config.llm.api_key.as_deref(), Some("sk-primary"));

    clear_env_vars();
}

#[test]
#[serial]
fn test_azure_deployment() {
    clear_env_vars();
    unsafe {
        env::set_var("LLM_BASE_URL", "https://my-resource.openai.azure.com");
        env::set_var("AZURE_DEPLOYMENT_NAME", "gpt4-prod");
    }

    let settings = AppConfig::load(None)
        .expect("Failed to load config")
        .llm_settings()
        .expect("settings");
    assert_eq!(
        settings.provider,
        Provider::AzureOpenAI {
            deployment_name: "gpt4-prod".into(),
            api_version: "2024-08-01-preview".into(),
        }
    );

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("probe.yaml");
    fs::write(
        &file_path,
        r#"
llm:
  model: gpt-3.5-turbo
search:
  timeout_secs: 5
paths:
  data_dir: /srv/lm-kbc/data
"#,
    )
    .expect("Failed to write temp config");

    let config = AppConfig::load(file_path.to_str()).expect("Failed to load config from file");
    assert_eq!(config.llm.model, "gpt-3.5-turbo");
    assert_eq!(config.search.timeout_secs, 5);
    assert_eq!(config.paths.data_dir.to_str(), Some("/srv/lm-kbc/data"));
    // Untouched keys keep their defaults.
    assert_eq!(config.paths.predictions_dir.to_str(), Some("predictions"));
}

#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    clear_env_vars();
    assert!(AppConfig::load(Some("definitely-not-here.yaml")).is_err());
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    clear_env_vars();

    let cwd_path = "kbc.yaml";
    fs::write(cwd_path, "retry:\n  max_attempts: 4\n").expect("Failed to write ./kbc.yaml");

    let config = AppConfig::load(None);

    fs::remove_file(cwd_path).unwrap();

    assert_eq!(config.expect("Failed to load config").retry.max_attempts, 4);
}
