//! LLM knowledge-base probing CLI
//!
//! Entry point for the `run`, `evaluate`, `disambiguate` and
//! `extract-graph` tasks.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use mimalloc::MiMalloc;
use tracing::info;

use llm_kbc_probe::config::{AppConfig, Cli, GraphArgs, RunArgs, Task};
use llm_kbc_probe::context::WikipediaContext;
use llm_kbc_probe::disambiguation::{DispatchTable, LlmArbiter, Orchestrator, Outcome};
use llm_kbc_probe::evaluate::{EvaluateOptions, Evaluator};
use llm_kbc_probe::graph::GraphExtractor;
use llm_kbc_probe::llm::{ChatCompletionsClient, ChatModel};
use llm_kbc_probe::probe::ProbeRunner;
use llm_kbc_probe::search::{EntitySearch, WikidataSearch};
use llm_kbc_probe::telemetry;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env (if present) before clap reads env-backed arguments
    let _ = dotenv();

    let cli = Cli::parse();
    telemetry::init(cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(name: "task.failed", error = format!("{e:#}"), "Task failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    info!(
        name: "config.loaded",
        base_url = %config.llm.base_url,
        model = %config.llm.model,
        data_dir = %config.paths.data_dir.display(),
        "Configuration loaded"
    );

    match cli.task {
        Task::Run(args) => probe(&config, &args).await,
        Task::Evaluate {
            run,
            compare,
            write,
        } => evaluate(&config, &run, EvaluateOptions { compare, write }),
        Task::Disambiguate(args) => disambiguate(&config, &args).await,
        Task::ExtractGraph(args) => extract_graph(&config, &args).await,
    }
}

async fn probe(config: &AppConfig, args: &RunArgs) -> anyhow::Result<()> {
    let context = WikipediaContext::new(
        &config.wikipedia.endpoint,
        Duration::from_secs(config.wikipedia.timeout_secs),
    )?;
    let runner = ProbeRunner::new(
        chat_client(config)?,
        search_client(config)?,
        Arc::new(context),
        config.retry_policy()?,
        config.paths.clone(),
    );

    let spec = args.spec();
    let summary = runner
        .run(&spec)
        .await
        .with_context(|| format!("Probing {} failed", spec.run_name()))?;

    println!(
        "Probed {} subjects of {} ({} without answer) -> {}",
        summary.records,
        summary.relation,
        summary.empty,
        summary.output.display()
    );
    Ok(())
}

fn evaluate(config: &AppConfig, args: &RunArgs, options: EvaluateOptions) -> anyhow::Result<()> {
    let spec = args.spec();
    let evaluation = Evaluator::new(config.paths.clone())
        .evaluate(&spec, options)
        .with_context(|| format!("Evaluating {} failed", spec.run_name()))?;

    if options.write {
        if let Some(path) = &evaluation.saved_to {
            println!("Evaluation results saved at {}.", path.display());
        }
    } else {
        print!("{}", evaluation.report);
    }
    Ok(())
}

async fn disambiguate(config: &AppConfig, args: &RunArgs) -> anyhow::Result<()> {
    let arbiter = LlmArbiter::new(chat_client(config)?, config.retry_policy()?)
        .with_model(config.disambiguation.model.clone())
        .with_temperature(config.disambiguation.temperature);
    let orchestrator = Orchestrator::new(
        DispatchTable::standard().context("Invalid keyword pattern in dispatch table")?,
        search_client(config)?,
        Some(arbiter),
    );

    let spec = args.spec();
    let dir = config.paths.run_dir(&spec);
    let relations = orchestrator.select(&dir, &spec.relation);
    if relations.is_empty() {
        println!("{}: no disambiguation assigned", spec.relation);
    }

    for relation in relations {
        let outcome = orchestrator
            .run(&dir, relation)
            .await
            .with_context(|| format!("Disambiguating {relation} in {} failed", dir.display()))?;
        match outcome {
            Outcome::Completed(summary) => println!(
                "{relation}: {} records, {} labels ({} resolved, {} kept as text)",
                summary.records, summary.labels, summary.resolved, summary.unresolved
            ),
            Outcome::Unsupported => println!("{relation}: no disambiguation assigned"),
        }
    }
    Ok(())
}

async fn extract_graph(config: &AppConfig, args: &GraphArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input))?;

    let extractor = GraphExtractor::new(chat_client(config)?, config.retry_policy()?)
        .with_model(args.model.clone());
    let graph = extractor
        .extract(&text, &args.ontology, args.format)
        .await
        .context("Graph extraction failed")?;

    println!("{graph}");
    Ok(())
}

fn chat_client(config: &AppConfig) -> anyhow::Result<Arc<dyn ChatModel>> {
    let settings = config.llm_settings()?;
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        provider = ?settings.provider,
        "LLM configuration loaded"
    );
    Ok(Arc::new(ChatCompletionsClient::new(settings)?))
}

fn search_client(config: &AppConfig) -> anyhow::Result<Arc<dyn EntitySearch>> {
    Ok(Arc::new(WikidataSearch::new(
        &config.search.endpoint,
        config.search.language.clone(),
        Duration::from_secs(config.search.timeout_secs),
    )?))
}
