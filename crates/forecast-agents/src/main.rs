use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use forecast_agents::benchmark::BenchmarkRunner;
use forecast_agents::config::ForecastConfig;
use forecast_agents::orchestrator::{DebateOrchestrator, DebateRequest};
use forecast_agents::run_log::RunLog;
use forecast_coordination::benchmark::load_questions;
use forecast_coordination::{ForecastQuestion, JsonFileSessionStore, SessionStore, TimeHorizon};
use tracing::info;

/// Adversarial superforecasting: two advocates debate, a judge rules,
/// calibration rules keep the ruling honest.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (env vars still override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON session store (overrides FORECAST_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Do not record sessions
    #[arg(long, global = true, default_value_t = false)]
    no_store: bool,

    /// OpenRouter model id (overrides DEFAULT_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Forecast one question
    Forecast {
        question: String,

        #[arg(long, default_value = "")]
        background: String,

        /// Comma-separated horizons, e.g. "7d,30d,90d"
        #[arg(long)]
        horizons: Option<String>,

        #[arg(long)]
        rounds: Option<u32>,

        #[arg(long)]
        search_budget: Option<u32>,

        /// Evidence published on or after this date (YYYY-MM-DD) is excluded
        #[arg(long)]
        cutoff: Option<NaiveDate>,

        /// Print the full result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Forecast and score a file of resolved questions
    Benchmark {
        questions: PathBuf,

        #[arg(long)]
        workers: Option<usize>,

        #[arg(long)]
        rounds: Option<u32>,

        /// Only the first N questions
        #[arg(long)]
        limit: Option<usize>,

        /// Write the JSON report here
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Inspect recorded sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SessionsAction {
    /// Most recent sessions first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// One session with its activity log
    Show { id: String },
}

fn open_store(config: &ForecastConfig, disabled: bool) -> Result<Option<Arc<dyn SessionStore>>> {
    if disabled {
        return Ok(None);
    }
    let Some(path) = &config.store_path else {
        return Ok(None);
    };
    let store = JsonFileSessionStore::open(path)
        .with_context(|| format!("Failed to open session store {}", path.display()))?;
    Ok(Some(Arc::new(store)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ForecastConfig::load(args.config.as_deref())?;
    if let Some(path) = args.store {
        config.store_path = Some(path);
    }
    if let Some(model) = args.model {
        config.model.model = model;
    }

    match args.command {
        Command::Forecast {
            question,
            background,
            horizons,
            rounds,
            search_budget,
            cutoff,
            json,
        } => {
            if let Some(raw) = horizons {
                config.debate.horizons = TimeHorizon::parse_list(&raw)?;
            }
            if let Some(r) = rounds {
                config.debate.rounds = r;
            }
            if let Some(b) = search_budget {
                config.debate.search_budget = b;
            }
            let store = open_store(&config, args.no_store)?;
            let log = RunLog::new("forecast");
            let orchestrator = DebateOrchestrator::from_config(&config, store, log)?;
            info!(model = orchestrator.model_name(), rounds = config.debate.rounds, "Forecast starting");

            let question = ForecastQuestion::new(question)
                .with_background(background)
                .with_horizons(config.debate.horizons.clone())
                .with_cutoff(cutoff);
            let result = orchestrator
                .run(DebateRequest::from_settings(question, &config.debate))
                .await;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.summary_line());
                for h in &result.horizons {
                    let (lo, hi) = h.interval;
                    println!(
                        "  {:>5}  {:5.1}%  [{:.0}%-{:.0}%]  {}  {}",
                        h.horizon.label(),
                        h.prediction.probability * 100.0,
                        lo * 100.0,
                        hi * 100.0,
                        h.prediction.confidence_label,
                        h.prediction.reasoning.lines().next().unwrap_or_default()
                    );
                }
            }
        }
        Command::Benchmark {
            questions,
            workers,
            rounds,
            limit,
            output,
        } => {
            if let Some(w) = workers {
                config.workers = w;
            }
            if let Some(r) = rounds {
                config.debate.rounds = r;
            }
            let mut questions = load_questions(&questions)?;
            if let Some(n) = limit {
                questions.truncate(n);
            }
            let store = open_store(&config, args.no_store)?;
            let runner = BenchmarkRunner::from_config(&config, store)?;
            let report = runner.run(questions).await;

            println!("{}", report.summary.format_report());
            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(path = %path.display(), "Benchmark report written");
            }
        }
        Command::Sessions { action } => {
            let Some(store) = open_store(&config, false)? else {
                bail!("no session store configured (use --store or FORECAST_STORE_PATH)");
            };
            match action {
                SessionsAction::List { limit } => {
                    for session in store.list_sessions(limit)? {
                        println!("{}", session.summary_line());
                    }
                }
                SessionsAction::Show { id } => {
                    let Some(session) = store.get_session(&id)? else {
                        bail!("session {id} not found");
                    };
                    println!("{}", serde_json::to_string_pretty(&session)?);
                    for activity in store.activities(&id)? {
                        println!(
                            "{}  {:<24} {}",
                            activity.timestamp.format("%H:%M:%S"),
                            activity.stage,
                            serde_json::to_string(&activity.outcome)?
                        );
                    }
                }
            }
        }
    }

    Ok(())
}
