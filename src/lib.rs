pub mod agent;
pub mod analytics;
pub mod cli;
pub mod config;
pub mod db;
pub mod errors;
pub mod extractor;
pub mod generator;
pub mod history;
pub mod logging;
pub mod models;
pub mod session;

use crate::agent::ClaudeCliAgent;
use crate::analytics::AnalyticsCache;
use crate::cli::{render_dashboard, render_generation_report, render_history, render_interaction, Cli, Commands};
use crate::config::AppConfig;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::generator::{open_or_bootstrap, populate_sample_data, SampleDataConfig};
use crate::history::InteractionHistory;
use crate::session::{QuerySession, EXAMPLE_QUESTIONS};
use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{Read, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env()?.apply(cli.overrides());
    if let Err(error) = logging::init_tracing(&config.log_dir) {
        eprintln!("warning: file logging disabled: {}", error);
    }

    match cli.command {
        Commands::Setup { scans, repairs, seed } => {
            let sample = SampleDataConfig {
                scan_count: scans,
                repair_count: repairs,
                ..SampleDataConfig::default()
            };
            let db = Database::create_store(&config.db_path)
                .with_context(|| format!("failed to create store at {}", config.db_path.display()))?;
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let report = populate_sample_data(&db, &sample, &mut rng)?;
            println!("{}", render_generation_report(&report));
            println!("Database saved as '{}'", config.db_path.display());
        }
        Commands::Extract { file } => {
            let trace = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            match extractor::extract_sql(&trace) {
                Some(statements) => {
                    for statement in statements {
                        println!("{}", statement);
                    }
                }
                None => println!("No SQL found."),
            }
        }
        Commands::Stats { json } => {
            let db = open_store(&config)?;
            let dashboard = analytics::dashboard(&db)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&dashboard)?);
            } else {
                print!("{}", render_dashboard(&dashboard));
            }
        }
        Commands::Schema => {
            let db = open_store(&config)?;
            println!("{}", db.schema_description()?);
        }
        Commands::Ask { question, show_sql } => {
            let db = open_store(&config)?;
            let session = QuerySession::new(Arc::new(ClaudeCliAgent::new(&config, &db)?));
            let mut history = InteractionHistory::new();
            let interaction = session.ask(&question.join(" "), &mut history).await?;
            println!("{}", render_interaction(&interaction, show_sql));
        }
        Commands::Chat { show_sql } => {
            let db = open_store(&config)?;
            chat(&config, &db, show_sql).await?;
        }
    }
    Ok(())
}

/// Opens the configured store, generating sample data on first run.
fn open_store(config: &AppConfig) -> anyhow::Result<Database> {
    let (db, report) = open_or_bootstrap(&config.db_path, &SampleDataConfig::default())
        .with_context(|| format!("failed to open store at {}", config.db_path.display()))?;
    if let Some(report) = report {
        println!("{}", render_generation_report(&report));
    }
    Ok(db)
}

async fn chat(config: &AppConfig, db: &Database, mut show_sql: bool) -> anyhow::Result<()> {
    let agent = ClaudeCliAgent::new(config, db)?;
    let schema = agent.schema_info().to_string();
    let session = QuerySession::new(Arc::new(agent));
    let cache = AnalyticsCache::new(config.stats_ttl());
    let mut history = match config.history_limit {
        Some(limit) => InteractionHistory::bounded(limit),
        None => InteractionHistory::new(),
    };

    println!("GPR Defect Analysis Agent - Interactive Mode");
    println!("Commands: quit, schema, stats, history, clear, sql, examples, rerun [n], or an example number\n");
    print_examples();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nYour question: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        let question = match input.to_ascii_lowercase().as_str() {
            "" => continue,
            "quit" | "exit" => break,
            "schema" => {
                println!("{}", schema);
                continue;
            }
            "stats" => {
                print!("{}", stats_report(&cache, db));
                continue;
            }
            "history" => {
                print!("{}", render_history(&history));
                continue;
            }
            "clear" => {
                history.clear();
                println!("History cleared.");
                continue;
            }
            "sql" => {
                show_sql = !show_sql;
                println!("Show generated SQL: {}", if show_sql { "on" } else { "off" });
                continue;
            }
            "examples" => {
                print_examples();
                continue;
            }
            lowered => match resolve_shortcut(lowered, &history) {
                Ok(Some(question)) => question,
                Ok(None) => input.to_string(),
                Err(error) => {
                    println!("Error: {}", error);
                    continue;
                }
            },
        };

        match session.ask(&question, &mut history).await {
            Ok(interaction) => println!("\n{}", render_interaction(&interaction, show_sql)),
            Err(error) => println!("\nError: {}", error),
        }
    }
    println!("Goodbye!");
    Ok(())
}

/// Dashboard text for the interactive `stats` command. A storage failure is
/// reported in the text and the session carries on.
fn stats_report(cache: &AnalyticsCache, db: &Database) -> String {
    match cache.dashboard(db) {
        Ok(dashboard) => render_dashboard(&dashboard),
        Err(error) => format!("Error: {}\n", error),
    }
}

/// Maps an example number, `rerun` or `rerun <n>` to the question it stands for.
///
/// `Ok(None)` means the input is an ordinary question.
fn resolve_shortcut(input: &str, history: &InteractionHistory) -> AppResult<Option<String>> {
    if let Ok(number) = input.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|index| EXAMPLE_QUESTIONS.get(index))
            .map(|question| Some(question.to_string()))
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "No example question {} (choose 1-{})",
                    number,
                    EXAMPLE_QUESTIONS.len()
                ))
            });
    }

    let Some(rest) = input.strip_prefix("rerun") else {
        return Ok(None);
    };
    let rest = rest.trim();
    if rest.is_empty() {
        return history
            .latest()
            .map(|entry| Some(entry.question.clone()))
            .ok_or_else(|| AppError::NotFound("No queries yet".to_string()));
    }
    let Ok(position) = rest.parse::<usize>() else {
        return Ok(None);
    };
    history
        .nth_newest(position)
        .map(|entry| Some(entry.question.clone()))
        .ok_or_else(|| AppError::NotFound(format!("No such history entry: {}", position)))
}

fn print_examples() {
    println!("Example questions:");
    for (index, example) in EXAMPLE_QUESTIONS.iter().enumerate() {
        println!("   {}. {}", index + 1, example);
    }
}
