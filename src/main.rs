use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polytier::config::Config;
use polytier::hierarchy::{Hierarchy, RankScope};
use polytier::ranking::SortWeight;
use polytier::{api, render};

#[derive(Parser)]
#[command(name = "polytier")]
#[command(about = "Organize and rank radar-chart tier lists")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Print the hierarchy as a tree
    Tree,
    /// Rank entities by weighted attributes
    Rank {
        /// Weights as INDEX:WEIGHT pairs, e.g. `0:0.5,2:0.5`
        #[arg(short, long, value_delimiter = ',', value_parser = parse_weight)]
        weights: Vec<SortWeight>,

        /// Rank one group's items instead of the root
        #[arg(short, long, conflicts_with = "all")]
        group: Option<uuid::Uuid>,

        /// Rank every entity, grouped or not
        #[arg(short, long)]
        all: bool,
    },
}

fn parse_weight(s: &str) -> Result<SortWeight, String> {
    let (index, weight) = s
        .split_once(':')
        .ok_or_else(|| format!("expected INDEX:WEIGHT, got '{}'", s))?;
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("bad attribute index '{}': {}", index, e))?;
    let weight = weight
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("bad weight '{}': {}", weight, e))?;
    Ok(SortWeight::new(index, weight))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "polytier=debug,tower_http=debug".into()),
    );

    // stdout carries command output, so logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_hierarchy(config: &Config) -> anyhow::Result<Hierarchy> {
    let store = config.open_store().context("Failed to open store")?;
    let hierarchy = Hierarchy::load(store, config.owner_id, config.attribute_count)?
        .with_autosave_window(config.autosave_window);
    Ok(hierarchy)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve { port: 3000 }) {
        Commands::Serve { port } => {
            tracing::info!("Starting polytier server on port {}", port);

            let hierarchy = Arc::new(Mutex::new(load_hierarchy(&config)?));
            let tick = (config.autosave_window / 4).max(Duration::from_millis(50));
            let autosave = api::spawn_autosave(hierarchy.clone(), tick);
            let app = api::create_router(hierarchy.clone());

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
            tracing::info!("polytier listening on http://127.0.0.1:{}", port);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;

            autosave.abort();
            let written = hierarchy
                .lock()
                .map_err(|_| anyhow::anyhow!("hierarchy lock poisoned"))?
                .flush_all()?;
            tracing::info!(written, "Flushed pending edits on shutdown");
        }
        Commands::Tree => {
            let hierarchy = load_hierarchy(&config)?;
            print!("{}", render::render_tree(hierarchy.root()));
        }
        Commands::Rank {
            weights,
            group,
            all,
        } => {
            let hierarchy = load_hierarchy(&config)?;
            let scope = match (group, all) {
                (Some(id), _) => RankScope::Group(id),
                (None, true) => RankScope::All,
                (None, false) => RankScope::Root,
            };
            for (i, scored) in hierarchy.rank(scope, &weights)?.iter().enumerate() {
                println!("{:>3}. {:<24} {:>6.2}", i + 1, scored.entity.name, scored.score);
            }
        }
    }

    Ok(())
}
