use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{EnvFilter, fmt};

mod agent;
mod models;
mod prompt;
mod records;
mod server;
mod session;
mod settings;
mod sql_guard;
mod store;

use agent::engine::{AgentEngine, TurnLimits};
use models::OpenAICompatible;
use records::RecordStore;
use settings::{AgentConfig, ConfigOverrides, resolve_config};
use store::SessionStore;

#[derive(Debug, Parser)]
#[command(name = "data_concierge")]
#[command(about = "Headless conversational data agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the agent over HTTP.
    Start {
        #[arg(long)]
        listen: Option<String>,
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Talk to the agent on stdin/stdout; type 'exit' to quit.
    Chat {
        #[arg(long)]
        database: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

async fn build_engine(config: &AgentConfig) -> anyhow::Result<Arc<AgentEngine>> {
    let records = Arc::new(RecordStore::open(&config.database).await?);
    let store = Arc::new(SessionStore::new());
    let model = Arc::new(OpenAICompatible::from_env(config.model.clone()));
    let limits = TurnLimits {
        max_tool_calls: config.max_tool_calls,
        turn_timeout: Duration::from_secs(config.turn_timeout_secs),
        max_result_rows: config.max_result_rows,
    };
    Ok(Arc::new(AgentEngine::new(model, records, store, limits).await?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let env = ConfigOverrides::from_env();
    match cli.command {
        Commands::Start { listen, database, model } => {
            let overrides = ConfigOverrides { listen, database, model, ..Default::default() };
            let config = resolve_config(&env, &overrides);
            let addr: SocketAddr = config.listen.parse()?;
            let metrics = PrometheusBuilder::new().install_recorder()?;
            let engine = build_engine(&config).await?;
            let state = server::AppState { engine, metrics: Some(metrics) };
            let idle_evict = config.idle_evict_secs.map(Duration::from_secs);
            server::serve(addr, state, idle_evict).await?;
        }
        Commands::Chat { database, model } => {
            let overrides = ConfigOverrides { database, model, ..Default::default() };
            let config = resolve_config(&env, &overrides);
            let engine = build_engine(&config).await?;
            let stdin = std::io::stdin();
            let mut thread = None;
            loop {
                print!("\nWhat's up:\t");
                std::io::stdout().flush()?;
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text == "exit" {
                    break;
                }
                match engine.handle_turn(thread, text).await {
                    Ok(turn) => {
                        thread = Some(turn.thread_id);
                        println!("{}", turn.reply);
                    }
                    Err(e) => eprintln!("error: {e}"),
                }
            }
        }
    }
    Ok(())
}
