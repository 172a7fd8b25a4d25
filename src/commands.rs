use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use console::style;
use tracing::info;

use crate::config::Config;
use crate::database::lancedb::vector_store::VectorIndex;
use crate::database::sqlite::models::ArticleCriteria;
use crate::database::sqlite::Database;
use crate::embeddings::ollama::OllamaEmbedder;
use crate::ingest::{ingest_batch, DuplicatePolicy, SourceKind};
use crate::llm::OpenAiChatGenerator;
use crate::pipeline::Vectorizer;
use crate::script::{ScriptGenerator, ScriptRequest, ScriptSource};
use crate::search::SearchEngine;
use crate::{BriefcastError, Result};

/// How much of an article `show` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Full,
    Chunks,
    Summary,
}

impl FromStr for Granularity {
    type Err = BriefcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Granularity::Full),
            "chunks" => Ok(Granularity::Chunks),
            "summary" => Ok(Granularity::Summary),
            other => Err(BriefcastError::Config(format!(
                "unknown granularity '{other}' (expected 'full', 'chunks' or 'summary')"
            ))),
        }
    }
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(config.database_path()).await
}

async fn open_index(config: &Config) -> Result<VectorIndex> {
    VectorIndex::open(
        config.vector_index_path(),
        config.embedding.distance_metric()?,
        config.embedding.dimension,
    )
    .await
}

/// Print the active configuration as TOML.
pub fn show_config(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| BriefcastError::Config(format!("failed to render config: {e}")))?;
    println!("# {}", config.config_file_path().display());
    print!("{rendered}");
    Ok(())
}

/// Write the default configuration file if none exists yet.
pub fn init_config(config: &Config) -> Result<()> {
    if config.config_file_path().exists() {
        println!(
            "Config already exists at {}",
            config.config_file_path().display()
        );
        return Ok(());
    }
    config.save()?;
    println!("Wrote {}", config.config_file_path().display());
    Ok(())
}

/// Ingest a JSON file holding an array of crawler payloads.
pub async fn ingest(
    config: &Config,
    file: &Path,
    source: SourceKind,
    overwrite: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read payload file: {}", file.display()))?;
    let payloads: Vec<serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| BriefcastError::MalformedPayload(format!("invalid payload file: {e}")))?;

    let database = open_database(config).await?;
    let policy = if overwrite {
        DuplicatePolicy::Overwrite
    } else {
        DuplicatePolicy::Skip
    };

    info!("ingesting {} payload(s) from {}", payloads.len(), file.display());
    let report = ingest_batch(&database, source, &payloads, policy).await?;

    println!(
        "Ingested {} payload(s): {} stored, {} overwritten, {} duplicate(s), {} failed",
        report.total(),
        style(report.stored.len()).green(),
        report.overwritten.len(),
        report.duplicates.len(),
        style(report.failures.len()).red(),
    );
    for failure in &report.failures {
        println!("  payload {}: {}", failure.index, failure.reason);
    }

    Ok(())
}

/// Run the vectorization pipeline over everything pending.
pub async fn vectorize(config: &Config) -> Result<()> {
    let database = open_database(config).await?;
    let index = Arc::new(tokio::sync::Mutex::new(open_index(config).await?));
    let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);

    let vectorizer = Vectorizer::new(
        database,
        index,
        embedder,
        config.chunking.clone(),
        config.pipeline.clone(),
    );

    let report = vectorizer.process_pending().await?;
    println!(
        "Vectorized {} article(s) ({} chunks), {} skipped, {} failed",
        style(report.processed.len()).green(),
        report.chunks_indexed,
        report.skipped.len(),
        style(report.failures.len()).red(),
    );
    for failure in &report.failures {
        println!("  {}: {}", failure.fingerprint, failure.reason);
    }

    Ok(())
}

/// Similarity search, optionally narrowed by metadata criteria.
pub async fn search(
    config: &Config,
    query: &str,
    limit: usize,
    criteria: ArticleCriteria,
) -> Result<()> {
    let database = open_database(config).await?;
    let index = Arc::new(tokio::sync::Mutex::new(open_index(config).await?));
    let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);
    let engine = SearchEngine::new(database, index, embedder);

    let results = if criteria.is_empty() {
        engine.similarity_search(query, limit).await?
    } else {
        engine.advanced_search(query, &criteria, limit).await?
    };

    if results.is_empty() {
        println!("No matching articles.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} (distance {:.4})",
            rank + 1,
            style(&result.article.title).bold(),
            result.distance
        );
        println!("   {}", result.article.url);
        println!("   fingerprint: {}", result.article.fingerprint);
        if let Some(domain) = &result.article.domain {
            println!("   domain: {domain}");
        }
    }

    Ok(())
}

/// Print one article at the requested granularity.
pub async fn show(config: &Config, fingerprint: &str, granularity: Granularity) -> Result<()> {
    let database = open_database(config).await?;
    let index = Arc::new(tokio::sync::Mutex::new(open_index(config).await?));
    let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);
    let engine = SearchEngine::new(database, index, embedder);

    match granularity {
        Granularity::Full => {
            let articles = engine
                .retrieve_full_articles(std::slice::from_ref(&fingerprint.to_string()))
                .await?;
            let article = &articles[0];
            println!("{}", style(&article.title).bold());
            println!("{}", article.url);
            if let Some(published) = article.published_at {
                println!("published: {published}");
            }
            if !article.authors.is_empty() {
                println!("authors: {}", article.authors.join(", "));
            }
            if !article.tags.is_empty() {
                println!("tags: {}", article.tags.join(", "));
            }
            println!();
            println!("{}", article.body);
        }
        Granularity::Chunks => {
            let chunks = engine
                .retrieve_chunks(std::slice::from_ref(&fingerprint.to_string()))
                .await?;
            if chunks.is_empty() {
                println!("No chunks stored yet; run `vectorize` first.");
                return Ok(());
            }
            for chunk in chunks {
                println!("{}", style(format!("--- chunk {} ---", chunk.chunk_index)).dim());
                println!("{}", chunk.content);
            }
        }
        Granularity::Summary => {
            let summaries = engine
                .retrieve_summaries(std::slice::from_ref(&fingerprint.to_string()))
                .await?;
            println!("{}", summaries[0].1);
        }
    }

    Ok(())
}

/// Generate a narration script from stored summaries.
pub async fn script(
    config: &Config,
    fingerprints: Vec<String>,
    minutes: u32,
    style_name: String,
    no_intro: bool,
    attribution: bool,
    output: Option<&Path>,
) -> Result<()> {
    let database = open_database(config).await?;

    let articles = if fingerprints.is_empty() {
        // No explicit selection: use every summarized article.
        database
            .find_all()
            .await?
            .into_iter()
            .filter(|a| a.has_summary())
            .collect()
    } else {
        let mut selected = Vec::with_capacity(fingerprints.len());
        for fingerprint in &fingerprints {
            let article = database
                .find_by_fingerprint(fingerprint)
                .await?
                .ok_or_else(|| BriefcastError::ArticleNotFound(fingerprint.clone()))?;
            if !article.has_summary() {
                return Err(BriefcastError::SummaryNotGenerated(fingerprint.clone()));
            }
            selected.push(article);
        }
        selected
    };

    let sources: Vec<ScriptSource> = articles
        .into_iter()
        .map(|article| ScriptSource {
            title: article.title,
            url: article.url,
            summary: article.summary.unwrap_or_default(),
        })
        .collect();

    let generator = Arc::new(OpenAiChatGenerator::new(&config.generation)?);
    let script_generator = ScriptGenerator::new(generator, config.script.words_per_minute);

    let request = ScriptRequest {
        style: style_name,
        target_duration_minutes: minutes,
        include_intro_conclusion: !no_intro,
        source_attribution: attribution,
    };
    let text = script_generator.generate(&sources, &request).await?;

    match output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("Failed to write script to {}", path.display()))?;
            println!(
                "Wrote {}-word script to {}",
                text.split_whitespace().count(),
                path.display()
            );
        }
        None => println!("{text}"),
    }

    Ok(())
}

/// Print store counts and the mirror/index consistency check.
pub async fn status(config: &Config) -> Result<()> {
    let database = open_database(config).await?;
    let index = open_index(config).await?;

    let articles = database.article_count().await?;
    let vectorized = database.vectorized_count().await?;
    let mirrored_chunks = database.total_chunk_count().await?;
    let indexed_vectors = index.count_all().await?;

    println!("Articles:        {articles} ({vectorized} vectorized)");
    println!("Chunks mirrored: {mirrored_chunks}");
    println!("Vectors indexed: {indexed_vectors}");
    println!("Distance metric: {}", index.metric());

    let index = Arc::new(tokio::sync::Mutex::new(index));
    let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);
    let vectorizer = Vectorizer::new(
        database,
        index,
        embedder,
        config.chunking.clone(),
        config.pipeline.clone(),
    );

    let consistency = vectorizer.verify_consistency().await?;
    if consistency.is_consistent() {
        println!(
            "{} ({} article(s) checked)",
            style("Stores are consistent").green(),
            consistency.checked
        );
    } else {
        println!("{}", style("Store mismatch detected:").red());
        for mismatch in &consistency.mismatches {
            println!(
                "  {}: {} mirrored chunk(s) vs {} indexed vector(s)",
                mismatch.fingerprint, mismatch.mirrored_chunks, mismatch.indexed_vectors
            );
        }
    }

    Ok(())
}
