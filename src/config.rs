use std::env;
use std::path::Path;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{Error, LlmError, Result};
use crate::graph::GraphFormat;
use crate::llm::provider::DEFAULT_AZURE_API_VERSION;
use crate::llm::{Backoff, LlmSettings, Provider, RetryPolicy};
use crate::probe::ProbeSetting;
use crate::prompt::PromptType;
use crate::workspace::{RunSpec, Workspace};

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "kbc.yaml";

/// Prefix of environment overrides, e.g. `KBC_RETRY__MAX_ATTEMPTS=3`.
pub const ENV_PREFIX: &str = "KBC";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, env = "CONFIG_FILE", global = true)]
    pub config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub task: Task,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Task {
    /// Probe the model for every subject of a relation
    Run(RunArgs),
    /// Score a prediction run against the ground truth
    Evaluate {
        #[command(flatten)]
        run: RunArgs,
        /// Report records whose predicted ids differ from the ground truth
        #[arg(short = 'c', long)]
        compare: bool,
        /// Save the report under the evaluations directory
        #[arg(short = 'w', long)]
        write: bool,
    },
    /// Re-link the object labels of a prediction batch
    Disambiguate(RunArgs),
    /// Extract a knowledge graph from a text file
    ExtractGraph(GraphArgs),
}

/// Identifies a probing run.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Dataset split (`train`, `val`, `test`)
    #[arg(short = 'd', long, default_value = "val")]
    pub dataset: String,

    /// Model name, as sent to the chat API
    #[arg(short = 'm', long, default_value = "gpt-3.5-turbo")]
    pub model: String,

    /// Probing setting
    #[arg(short = 's', long, value_enum, default_value_t = ProbeSetting::FewShot)]
    pub setting: ProbeSetting,

    /// Prompt type
    #[arg(short = 'p', long, value_enum, default_value_t = PromptType::Question)]
    pub prompt: PromptType,

    /// Relation name, or `all` when evaluating
    #[arg(short = 'r', long)]
    pub relation: String,
}

impl RunArgs {
    #[must_use]
    pub fn spec(&self) -> RunSpec {
        RunSpec {
            dataset: self.dataset.clone(),
            model: self.model.clone(),
            setting: self.setting,
            prompt_type: self.prompt,
            relation: self.relation.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct GraphArgs {
    /// Text file to extract the graph from
    #[arg(short = 'i', long)]
    pub input: String,

    /// Output serialization
    #[arg(short = 'f', long, value_enum, default_value_t = GraphFormat::Turtle)]
    pub format: GraphFormat,

    /// Ontology the graph should follow
    #[arg(short = 'o', long, default_value = "https://schema.org/")]
    pub ontology: String,

    /// Model override; the configured model otherwise
    #[arg(short = 'm', long)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub wikipedia: WikipediaConfig,
    pub retry: RetryConfig,
    pub disambiguation: DisambiguationConfig,
    pub paths: Workspace,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub azure_deployment: Option<String>,
    pub azure_api_version: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub language: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WikipediaConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub multiplier_secs: f64,
    pub max_delay_secs: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DisambiguationConfig {
    /// Model that arbitrates between candidates.
    pub model: String,
    pub temperature: f32,
}

impl AppConfig {
    /// Load configuration: built-in defaults, then the YAML file (the given
    /// path, which must exist, or `./kbc.yaml` if present), then `KBC_`
    /// environment variables, then `LLM_BASE_URL` / `LLM_MODEL` /
    /// `LLM_API_KEY` (falling back to `OPENAI_API_KEY`).
    pub fn load(config_file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("llm.base_url", "https://api.openai.com")?
            .set_default("llm.model", "gpt-4")?
            .set_default("llm.timeout_secs", 120)?
            .set_default("search.endpoint", "https://www.wikidata.org/w/api.php")?
            .set_default("search.language", "en")?
            .set_default("search.timeout_secs", 30)?
            .set_default("wikipedia.endpoint", "https://en.wikipedia.org/w/api.php")?
            .set_default("wikipedia.timeout_secs", 30)?
            .set_default("retry.max_attempts", 10)?
            .set_default("retry.multiplier_secs", 1.0)?
            .set_default("retry.max_delay_secs", 60.0)?
            .set_default("disambiguation.model", "gpt-4")?
            .set_default("disambiguation.temperature", 0.0)?
            .set_default("paths.data_dir", "data")?
            .set_default("paths.predictions_dir", "predictions")?
            .set_default("paths.evaluations_dir", "evaluations")?
            .set_default("paths.question_prompts", "question-prompts.json")?
            .set_default("paths.similar_examples", "examples.jsonl")?;

        // 2. Config file
        builder = match config_file {
            Some(path) => builder.add_source(File::new(path, FileFormat::Yaml).required(true)),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder.add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml))
            }
            None => builder,
        };

        // 3. Prefixed environment, e.g. KBC_SEARCH__LANGUAGE=de
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 4. Conventional LLM variables
        if let Some(val) = non_empty_var("LLM_BASE_URL") {
            builder = builder.set_override("llm.base_url", val)?;
        }
        if let Some(val) = non_empty_var("LLM_MODEL") {
            builder = builder.set_override("llm.model", val)?;
        }
        if let Some(val) = non_empty_var("LLM_API_KEY").or_else(|| non_empty_var("OPENAI_API_KEY")) {
            builder = builder.set_override("llm.api_key", val)?;
        }
        if let Some(val) = non_empty_var("AZURE_DEPLOYMENT_NAME") {
            builder = builder.set_override("llm.azure_deployment", val)?;
        }
        if let Some(val) = non_empty_var("AZURE_API_VERSION") {
            builder = builder.set_override("llm.azure_api_version", val)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Chat client settings; the provider is detected from the base URL.
    pub fn llm_settings(&self) -> Result<LlmSettings> {
        let base_url = self.llm.base_url.trim();
        if base_url.is_empty() {
            return Err(Error::Config("llm.base_url cannot be empty".to_string()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model cannot be empty".to_string()));
        }

        let mut provider = Provider::detect_from_url(base_url);
        if let (true, Some(deployment)) = (
            matches!(provider, Provider::AzureOpenAI { .. }),
            &self.llm.azure_deployment,
        ) {
            provider = Provider::AzureOpenAI {
                deployment_name: deployment.clone(),
                api_version: self
                    .llm
                    .azure_api_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            };
        }

        Ok(LlmSettings {
            base_url: base_url.to_string(),
            api_key: self.llm.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: self.llm.model.clone(),
            provider,
            timeout: Duration::from_secs(self.llm.timeout_secs),
        })
    }

    /// Retry policy for every outbound chat call.
    ///
    /// # Errors
    ///
    /// Returns an error when a backoff duration is not representable.
    pub fn retry_policy(&self) -> Result<RetryPolicy<LlmError>> {
        let backoff = Backoff {
            multiplier: seconds("retry.multiplier_secs", self.retry.multiplier_secs)?,
            max_delay: seconds("retry.max_delay_secs", self.retry.max_delay_secs)?,
        };
        Ok(RetryPolicy::transient(self.retry.max_attempts, backoff))
    }
}

fn seconds(key: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs.max(0.0))
        .map_err(|e| Error::Config(format!("{key} = {secs}: {e}")))
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "llm-kbc-probe",
            "run",
            "-d",
            "test",
            "-m",
            "gpt-4",
            "-s",
            "sem-sim",
            "-p",
            "triple",
            "-r",
            "PersonHasSpouse",
        ])
        .unwrap();

        let Task::Run(args) = cli.task else {
            panic!("expected run task");
        };
        let spec = args.spec();
        assert_eq!(spec.run_name(), "test-gpt-4-sem-sim-triple");
        assert_eq!(spec.relation, "PersonHasSpouse");
    }

    #[test]
    fn test_cli_parses_evaluate_flags() {
        let cli = Cli::try_parse_from([
            "llm-kbc-probe",
            "--json-logs",
            "evaluate",
            "-r",
            "all",
            "-c",
            "-w",
        ])
        .unwrap();

        assert!(cli.json_logs);
        assert!(matches!(
            cli.task,
            Task::Evaluate {
                compare: true,
                write: true,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_rejects_unknown_setting() {
        let result = Cli::try_parse_from(["llm-kbc-probe", "run", "-s", "one-shot", "-r", "X"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parses_extract_graph() {
        let cli = Cli::try_parse_from([
            "llm-kbc-probe",
            "extract-graph",
            "--input",
            "doc.txt",
            "--format",
            "nt",
        ])
        .unwrap();
        let Task::ExtractGraph(args) = cli.task else {
            panic!("expected extract-graph task");
        };
        assert_eq!(args.format, GraphFormat::NTriples);
        assert!(args.model.is_none());
    }
}
