use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use client_core::{CacheOrchestrator, HttpWireClient, ListingWindow, PokeApiMapper, ResultStream};
use futures::StreamExt;
use shared::{
    domain::{Entity, Event},
    ResultState,
};
use storage::Storage;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, load_settings_from, normalize_database_url};

#[derive(Parser, Debug)]
#[command(about = "Fetch a random Pokémon and keep it in a local cache")]
struct Cli {
    /// Settings file; defaults to ./pokedex.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    api_base_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pick a random entity from the remote listing and replace the cache with it.
    Refresh,
    /// Print the cached entity without touching the network.
    Show,
    /// Print only the cached moves.
    Moves,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_settings_from(path),
        None => load_settings(),
    };
    if let Some(v) = cli.api_base_url {
        settings.api_base_url = v;
    }
    if let Some(v) = cli.database_url {
        settings.database_url = v;
    }
    if let Some(v) = cli.timeout_secs {
        settings.request_timeout_secs = v;
    }
    debug!(?settings, "pokedex: settings resolved");

    let storage = Storage::new(&normalize_database_url(&settings.database_url)).await?;
    let wire = HttpWireClient::new(
        &settings.api_base_url,
        Duration::from_secs(settings.request_timeout_secs),
    )?;
    let orchestrator = Arc::new(
        CacheOrchestrator::new(Arc::new(wire), Arc::new(PokeApiMapper), Arc::new(storage))
            .with_listing_window(ListingWindow {
                limit: settings.listing_limit,
                offset: settings.listing_offset,
            }),
    );

    let succeeded = match cli.command {
        Command::Refresh => drain(orchestrator.refresh(), print_entity).await,
        Command::Show => drain(orchestrator.load_cached(), print_entity).await,
        Command::Moves => {
            let render = |events: &Vec<Event>| print_events(events);
            drain(orchestrator.load_cached_events(), render).await
        }
    };

    if !succeeded {
        bail!("operation failed");
    }
    Ok(())
}

/// Renders every state as it arrives; true when the terminal state succeeded.
async fn drain<T>(mut stream: ResultStream<T>, render: impl Fn(&T)) -> bool {
    let mut succeeded = false;
    while let Some(state) = stream.next().await {
        match state {
            ResultState::Pending => println!("loading..."),
            ResultState::Succeeded(value) => {
                render(&value);
                succeeded = true;
            }
            ResultState::Failed { message, cause } => {
                if let Some(cause) = cause {
                    debug!(kind = ?cause.kind(), "failure cause: {cause:?}");
                }
                eprintln!("error: {message}");
                succeeded = false;
            }
        }
    }
    succeeded
}

fn print_entity(entity: &Entity) {
    if entity.is_empty() {
        println!("no cached entity; run `pokedex refresh` first");
        return;
    }
    println!("{}", entity.name);
    println!("  front sprite: {}", entity.sprites.front_image_url);
    println!("  back sprite:  {}", entity.sprites.back_image_url);
    println!("  stats:");
    for attribute in &entity.attributes {
        println!("    {:<16} {}", attribute.kind, attribute.value);
    }
    println!("  moves: {}", entity.events.len());
}

fn print_events(events: &[Event]) {
    for event in events {
        println!("{}", event.kind);
    }
}
