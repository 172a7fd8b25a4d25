use std::path::PathBuf;

use briefcast::commands::{
    ingest, init_config, script, search, show, show_config, status, vectorize, Granularity,
};
use briefcast::config::Config;
use briefcast::database::sqlite::models::ArticleCriteria;
use briefcast::ingest::SourceKind;
use briefcast::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "briefcast")]
#[command(about = "An article indexing, retrieval and podcast scripting pipeline")]
#[command(version)]
struct Cli {
    /// Directory holding the config file, metadata database and vector index
    #[arg(long, global = true, default_value = ".briefcast")]
    base_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a JSON file of crawler payloads
    Ingest {
        /// Path to a JSON array of payloads
        file: PathBuf,
        /// Payload shape: 'apify' or 'generic'
        #[arg(long, default_value = "generic")]
        source: SourceKind,
        /// Replace duplicates instead of skipping them
        #[arg(long)]
        overwrite: bool,
    },
    /// Chunk, embed and index all pending articles
    Vectorize,
    /// Find articles by semantic similarity
    Search {
        /// Natural-language query
        query: String,
        /// Maximum number of articles to return
        #[arg(short = 'k', long, default_value_t = 5)]
        limit: usize,
        /// Only articles from this domain
        #[arg(long)]
        domain: Option<String>,
        /// Only articles carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Only articles published on or after this date (YYYY-MM-DD)
        #[arg(long)]
        after: Option<NaiveDate>,
        /// Only articles published on or before this date (YYYY-MM-DD)
        #[arg(long)]
        before: Option<NaiveDate>,
    },
    /// Print one article
    Show {
        /// Article fingerprint (from search output)
        fingerprint: String,
        /// How much to print: 'full', 'chunks' or 'summary'
        #[arg(long, default_value = "full")]
        granularity: Granularity,
    },
    /// Generate a narration script from stored summaries
    Script {
        /// Restrict to specific articles; defaults to every summarized one
        #[arg(long = "fingerprint")]
        fingerprints: Vec<String>,
        /// Target narration length in minutes
        #[arg(long, default_value_t = 1)]
        minutes: u32,
        /// Narration tone
        #[arg(long, default_value = "informative")]
        style: String,
        /// Skip the introduction and conclusion
        #[arg(long)]
        no_intro: bool,
        /// Name each story's source in the narration
        #[arg(long)]
        attribution: bool,
        /// Write the script to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Show store counts and cross-store consistency
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.base_dir)?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                init_config(&config)?;
            }
        }
        Commands::Ingest {
            file,
            source,
            overwrite,
        } => {
            ingest(&config, &file, source, overwrite).await?;
        }
        Commands::Vectorize => {
            vectorize(&config).await?;
        }
        Commands::Search {
            query,
            limit,
            domain,
            tag,
            after,
            before,
        } => {
            let criteria = ArticleCriteria {
                domain,
                tag,
                published_after: after,
                published_before: before,
                vectorized: None,
            };
            search(&config, &query, limit, criteria).await?;
        }
        Commands::Show {
            fingerprint,
            granularity,
        } => {
            show(&config, &fingerprint, granularity).await?;
        }
        Commands::Script {
            fingerprints,
            minutes,
            style,
            no_intro,
            attribution,
            output,
        } => {
            script(
                &config,
                fingerprints,
                minutes,
                style,
                no_intro,
                attribution,
                output.as_deref(),
            )
            .await?;
        }
        Commands::Status => {
            status(&config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["briefcast", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn ingest_command_with_source() {
        let cli = Cli::try_parse_from([
            "briefcast",
            "ingest",
            "payloads.json",
            "--source",
            "apify",
            "--overwrite",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest {
                file,
                source,
                overwrite,
            } = parsed.command
            {
                assert_eq!(file, PathBuf::from("payloads.json"));
                assert_eq!(source, SourceKind::Apify);
                assert!(overwrite);
            }
        }
    }

    #[test]
    fn search_command_with_filters() {
        let cli = Cli::try_parse_from([
            "briefcast",
            "search",
            "model releases",
            "-k",
            "3",
            "--domain",
            "news.example.com",
            "--after",
            "2025-01-01",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                query,
                limit,
                domain,
                after,
                ..
            } = parsed.command
            {
                assert_eq!(query, "model releases");
                assert_eq!(limit, 3);
                assert_eq!(domain, Some("news.example.com".to_string()));
                assert_eq!(after, NaiveDate::from_ymd_opt(2025, 1, 1));
            }
        }
    }

    #[test]
    fn show_command_granularity() {
        let cli = Cli::try_parse_from([
            "briefcast",
            "show",
            "abc123",
            "--granularity",
            "summary",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Show { granularity, .. } = parsed.command {
                assert_eq!(granularity, Granularity::Summary);
            }
        }
    }

    #[test]
    fn invalid_granularity_is_rejected() {
        let cli = Cli::try_parse_from(["briefcast", "show", "abc123", "--granularity", "pages"]);
        assert!(cli.is_err());
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["briefcast", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["briefcast", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
