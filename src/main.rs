use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use multirag_agent::{parse_sub_questions, LlmOracle, Pipeline, RouterSettings, RunReport};
use multirag_core::config::{AppConfig, ModelConfig};
use multirag_core::error::RagError;
use multirag_core::traits::LlmClient;
use multirag_core::types::Reference;

#[derive(Parser)]
#[command(
    name = "multirag",
    version,
    about = "Multi-source retrieval orchestration: classify, route, retrieve"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "multirag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question with the worker roster (reads stdin when no question is given)
    Run {
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
        /// Maximum number of worker results to accept
        #[arg(long)]
        max_agents: Option<usize>,
        /// Maximum number of graph steps per run
        #[arg(long)]
        recursion_limit: Option<usize>,
        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
        /// Abort the whole run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Classify a question as single-step or multi-step
    Classify {
        #[arg(trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// List the worker roster with scopes
    Workers,
    /// Show the effective configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries results only.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("multirag=info,warn")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "multirag", &mut io::stdout());
        return Ok(());
    }

    let mut config = load_config(&cli.config)?;
    multirag_llm::apply_preset_defaults(&mut config.model);

    if let Commands::Config = &cli.command {
        print!("{}", render_config(&config)?);
        return Ok(());
    }

    let llm: Arc<dyn LlmClient> = Arc::new(
        multirag_llm::create_retrying_client(&config.model, &config.fallback_models)
            .context("failed to create LLM client")?,
    );
    let oracle = Arc::new(LlmOracle::new(llm.clone(), config.model.clone()));
    let roster = multirag_workers::build_roster(&config, llm).context("failed to build worker roster")?;
    let pipeline = Pipeline::new(
        oracle,
        roster,
        RouterSettings::from_config(&config.orchestration),
    )?;

    match cli.command {
        Commands::Run {
            question,
            max_agents,
            recursion_limit,
            json,
            timeout_secs,
        } => {
            let question = read_question(question)?;
            let max_agents = max_agents.unwrap_or(config.orchestration.max_agents);
            let recursion_limit = recursion_limit.unwrap_or(config.orchestration.recursion_limit);

            let run = pipeline.run_report(&question, max_agents, recursion_limit);
            let report = match timeout_secs {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run)
                    .await
                    .map_err(|_| RagError::RunTimeout(secs))??,
                None => run.await?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Classify { question } => {
            let question = read_question(question)?;
            let outcome = pipeline
                .classifier()
                .classify(&question, config.orchestration.recursion_limit)
                .await?;
            println!("{}", outcome.kind);
            if let Some(raw) = &outcome.sub_questions_raw {
                for (i, sub) in parse_sub_questions(raw).iter().enumerate() {
                    println!("  {}. {}", i + 1, sub);
                }
            }
        }
        Commands::Workers => {
            let fallback = config.orchestration.fallback();
            for name in pipeline.roster().names() {
                let marker = if Some(name) == fallback { " (fallback)" } else { "" };
                println!("{:<12} {}{}", name, pipeline.roster().scope(name), marker);
            }
        }
        // Handled before the pipeline was built
        Commands::Config | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// `--config`, then `~/.multirag/config.toml`, then environment defaults.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return AppConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()));
    }

    if let Some(home) = dirs_home().map(|h| h.join(".multirag").join("config.toml")) {
        if home.exists() {
            info!(path = %home.display(), "Loading config from home directory");
            return AppConfig::load(&home)
                .with_context(|| format!("failed to load config from {}", home.display()));
        }
    }

    eprintln!("Warning: No config file found. Set OPENAI_API_KEY or create multirag.toml");
    eprintln!("See multirag.toml.example for reference.");
    Ok(create_env_config())
}

fn create_env_config() -> AppConfig {
    let model = if let Ok(key) = std::env::var("DEEPSEEK_API_KEY") {
        let mut model = ModelConfig::new("deepseek", "deepseek-chat");
        model.api_key = Some(key);
        model.base_url = std::env::var("DEEPSEEK_BASE_URL").ok();
        model
    } else if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        let mut model = ModelConfig::new("openai", "gpt-4o-mini");
        model.api_key = Some(key);
        model
    } else {
        // Local Ollama
        ModelConfig::new("ollama", "llama3.2")
    };
    AppConfig::with_model(model)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

/// Joined CLI words, or all of stdin when none were given.
fn read_question(words: Vec<String>) -> anyhow::Result<String> {
    let question = if words.is_empty() {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read question from stdin")?;
        buf
    } else {
        words.join(" ")
    };
    let question = question.trim().to_string();
    anyhow::ensure!(!question.is_empty(), "no question given");
    Ok(question)
}

/// Effective config as TOML, with API keys masked.
fn render_config(config: &AppConfig) -> anyhow::Result<String> {
    let mut shown = config.clone();
    for model in std::iter::once(&mut shown.model).chain(shown.fallback_models.iter_mut()) {
        if model.api_key.is_some() {
            model.api_key = Some("***".to_string());
        }
    }
    Ok(toml::to_string_pretty(&shown)?)
}

fn print_report(report: &RunReport) {
    println!("Classification: {}", report.kind);
    if let Some(raw) = &report.sub_questions_raw {
        println!("Sub-questions:");
        for (i, sub) in parse_sub_questions(raw).iter().enumerate() {
            println!("  {}. {}", i + 1, sub);
        }
    }
    if !report.excluded_agents.is_empty() {
        println!("Excluded: {}", report.excluded_agents.join(", "));
    }

    println!("\nRetrieved references ({}):", report.references.len());
    for name in &report.completed_agents {
        let Some(reference) = report.references.get(name) else {
            continue;
        };
        println!("\n[{}]", name.to_uppercase());
        match reference {
            Reference::Text(text) => println!("{}", text),
            Reference::Structured(value) => println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            ),
            Reference::Failed { error } => println!("[error] {}", error),
        }
    }
}
