use std::path::PathBuf;

use batoto_connector::types::SortOrder;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

/// Command-line access to the bato.to connector, for debugging
#[derive(Parser, Debug)]
#[command(name = "batoto", version)]
#[command(about = "Search series, list chapters and resolve chapter pages", long_about = None)]
pub struct Cli {
    /// Config file (defaults to config.toml in the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as pretty JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search for series
    Search {
        query: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List a series' chapters
    Chapters {
        series_id: String,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
        /// Only chapters uploaded at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        #[arg(long, value_enum, default_value_t = SortOrder::Asc)]
        order: SortOrder,
    },
    /// Resolve a chapter's page image URLs
    Pages {
        chapter_id: String,
        /// Chapter whose pages become the low-resolution variants
        #[arg(long)]
        low: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chapters_flags() {
        let cli = Cli::parse_from([
            "batoto", "--json", "chapters", "123", "--limit", "5", "--order", "desc", "--since", "2024-01-02T03:04:05Z",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Chapters { series_id, offset, limit, since, order } => {
                assert_eq!(series_id, "123");
                assert_eq!(offset, 0);
                assert_eq!(limit, Some(5));
                assert_eq!(order, SortOrder::Desc);
                assert_eq!(since.unwrap().timestamp(), 1_704_164_645);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn global_config_after_subcommand() {
        let cli = Cli::parse_from(["batoto", "pages", "99", "--low", "98", "--config", "/tmp/c.toml"]);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Pages { ref chapter_id, low: Some(ref l) } if chapter_id == "99" && l == "98"));
    }
}
