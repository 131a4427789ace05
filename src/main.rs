use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use poma::chat::handle_chat_turn;
use poma::config::{Config, load_env};
use poma::lookup::{HttpBalanceProvider, HttpPriceProvider};
use poma::planner::{ChatMessage, ModelPlanner, OpenAiCompatibleClient, PlannerStack};
use poma::portfolio::store::JsonFileStore;
use poma::server::{AppState, router};
use poma::summary::build_summary;

#[derive(Parser)]
#[command(name = "poma", about = "Conversational portfolio management engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8787.
        #[arg(long, env = "POMA_BIND_ADDR")]
        bind: Option<SocketAddr>,
    },
    /// Run a single chat turn and print the outcomes.
    Chat { message: String },
    /// Print the enriched portfolio summary as JSON.
    Summary,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let store = Arc::new(JsonFileStore::new(config.store.path.clone()));

    let planner = match &config.llm {
        Some(llm) => {
            let client = OpenAiCompatibleClient::new(llm).context("building model client")?;
            PlannerStack::new(Some(ModelPlanner::new(Arc::new(client))))
        }
        None => {
            tracing::info!("no model collaborator configured, planning with heuristics only");
            PlannerStack::heuristic_only()
        }
    };

    Ok(AppState {
        store,
        planner: Arc::new(planner),
        balances: Arc::new(
            HttpBalanceProvider::new(&config.lookup).context("building balance provider")?,
        ),
        prices: Arc::new(
            HttpPriceProvider::new(&config.lookup).context("building price provider")?,
        ),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let state = build_state(&config)?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let addr = bind.unwrap_or(config.http.bind_addr);
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            tracing::info!(%addr, "listening");
            axum::serve(listener, router(state)).await?;
        }
        Command::Chat { message } => {
            let messages = vec![ChatMessage::user(message)];
            let turn = handle_chat_turn(&*state.planner, &*state.store, &messages).await?;
            println!("{}", turn.reply);
            for outcome in &turn.operations {
                println!(
                    "  [{}] {}: {}",
                    match outcome.status {
                        poma::ops::OutcomeStatus::Applied => "applied",
                        poma::ops::OutcomeStatus::Skipped => "skipped",
                    },
                    outcome.action,
                    outcome.detail
                );
            }
        }
        Command::Summary => {
            let summary =
                build_summary(&*state.store, &*state.balances, &*state.prices).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
