use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{EntityMapper, PokeApiMapper};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/pokedex.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Health,
    Clear,
    /// Print the cached entity as JSON.
    Dump,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Health => {
            storage.health_check().await?;
            println!("ok");
        }
        Command::Clear => {
            storage.clear().await?;
            println!("cache cleared");
        }
        Command::Dump => match storage.read_all().await? {
            Some(rows) => {
                let entity = PokeApiMapper.rows_to_entity(&rows);
                if let Some(cached_at) = storage.cached_at().await? {
                    println!("cached_at={}", cached_at.to_rfc3339());
                }
                println!("{}", serde_json::to_string_pretty(&entity)?);
            }
            None => println!("cache is empty"),
        },
    }

    Ok(())
}
