mod cli;

use anyhow::{Context, Result};
use batoto_connector::prelude::*;
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = ConnectorConfig::load(cli.config.as_deref())?;
    let connector = Connector::new(&cfg).context("creating connector")?;

    match cli.command {
        Commands::Search { query, offset, limit } => {
            let found = connector.search_series(&query, offset, limit).await?;
            emit(cli.json, &found, || {
                for r in &found.results {
                    println!("{}\t{}", r.identifier, r.name);
                }
            })
        }
        Commands::Chapters { series_id, offset, limit, since, order } => {
            let query = ChapterQuery { offset, limit, since, order };
            let list = connector.list_chapters(&series_id, &query).await?;
            emit(cli.json, &list, || {
                for c in &list.chapters {
                    let when = c.timestamp().map(|t| t.to_rfc3339()).unwrap_or_default();
                    println!("{}\t{}\t{}\t{}", c.identifier, c.number, c.title, when);
                }
            })
        }
        Commands::Pages { chapter_id, low } => {
            let pages = match low {
                Some(low) => connector.resolve_dual_resolution(&chapter_id, &low).await?,
                None => connector.resolve_chapter_pages(&chapter_id).await?,
            };
            emit(cli.json, &pages, || {
                for p in &pages.pages {
                    match p.low_url() {
                        Some(low) => println!("{}\t{}", p.high_url(), low),
                        None => println!("{}", p.high_url()),
                    }
                }
            })
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn emit<T: Serialize>(json: bool, value: &T, plain: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        plain();
    }
    Ok(())
}
