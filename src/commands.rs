use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use repodoc_core::Config;
use repodoc_core::bootstrap;
use repodoc_index::document::{FileAnalysis, FileSummary};
use repodoc_index::{HybridRetriever, ScoredChunk};
use repodoc_llm::any::AnyProvider;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::QueryOpts;

/// Search hit as printed, without the embedding vector.
#[derive(Serialize)]
struct HitView<'a> {
    rank: usize,
    id: &'a str,
    score: f32,
    file_path: Option<&'a str>,
    line_range: Option<&'a str>,
    element_type: Option<&'a str>,
    content: &'a str,
}

impl<'a> HitView<'a> {
    fn new(rank: usize, hit: &'a ScoredChunk) -> Self {
        Self {
            rank,
            id: &hit.chunk.id,
            score: hit.score,
            file_path: hit.chunk.meta("file_path"),
            line_range: hit.chunk.meta("line_range"),
            element_type: hit.chunk.meta("element_type"),
            content: &hit.chunk.content,
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

fn index_dir(config: &Config, explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(&config.index.path))
}

fn open(config: &Config, opts: &QueryOpts) -> anyhow::Result<HybridRetriever<AnyProvider>> {
    let dir = index_dir(config, opts.index.clone());
    let mut retriever = bootstrap::open_retriever(config, &dir)?;
    if let Some(alpha) = opts.alpha {
        retriever.set_alpha(alpha).context("invalid --alpha")?;
    }
    Ok(retriever)
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

pub async fn index(
    config: &Config,
    analyses: &Path,
    summaries: Option<&Path>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let analyses: Vec<FileAnalysis> = read_json(analyses)?;
    let summaries: Vec<FileSummary> = match summaries {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let built = bootstrap::document_builder(config)?.build(&analyses, &summaries);
    if built.chunks.is_empty() {
        bail!(
            "no chunks produced from {} analyses ({} skipped)",
            built.report.files_seen,
            built.report.files_skipped
        );
    }

    let mut retriever = bootstrap::build_retriever(config)?;
    let added = retriever
        .index(built.chunks)
        .await
        .context("failed to index chunks")?;

    let dir = index_dir(config, output);
    retriever
        .persist(&dir)
        .with_context(|| format!("failed to save index to {}", dir.display()))?;

    println!(
        "Indexed {added} chunks: {} file-level, {} code elements ({} files skipped)",
        built.report.file_chunks, built.report.element_chunks, built.report.files_skipped
    );
    println!("Saved index to {}", dir.display());
    Ok(())
}

pub async fn search(config: &Config, query: &str, opts: &QueryOpts) -> anyhow::Result<()> {
    let retriever = open(config, opts)?;
    let top_k = opts.top_k.unwrap_or(config.retrieval.top_k);
    let results = retriever.search(query, top_k).await?;

    if opts.json {
        let hits: Vec<HitView<'_>> = results
            .iter()
            .enumerate()
            .map(|(i, hit)| HitView::new(i + 1, hit))
            .collect();
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results for \"{query}\"");
        return Ok(());
    }
    for (i, hit) in results.iter().enumerate() {
        let location = match (hit.chunk.meta("file_path"), hit.chunk.meta("line_range")) {
            (Some(file), Some(lines)) => format!("{file}:{lines}"),
            (Some(file), None) => file.to_owned(),
            _ => hit.chunk.id.clone(),
        };
        println!("{}. [{:.3}] {location}", i + 1, hit.score);
        println!("   {}", preview(&hit.chunk.content, 160));
    }
    Ok(())
}

pub async fn ask(config: &Config, question: &str, opts: &QueryOpts) -> anyhow::Result<()> {
    let retriever = open(config, opts)?;
    let mut bot = bootstrap::build_qa_bot(config, retriever)?;
    let top_k = opts.top_k.unwrap_or(bot.settings().top_k);
    let answer = bot.query_with_top_k(question, top_k).await;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!("\nSources (confidence {:.3}):", answer.confidence);
        for source in &answer.sources {
            println!(
                "- {} (lines {}, {}) relevance {:.3}",
                source.file, source.line_range, source.element_type, source.relevance
            );
        }
    }
    Ok(())
}

pub fn stats(config: &Config, index: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = index_dir(config, index);
    let retriever = bootstrap::open_retriever(config, &dir)?;
    let stats = retriever.store().stats();
    println!("Index:      {}", dir.display());
    println!("Documents:  {}", stats.total_documents);
    println!("Vectors:    {}", stats.index_size);
    println!("Dimension:  {}", stats.dimension);
    println!("Model:      {}", stats.model);
    println!("Alpha:      {}", retriever.alpha());
    Ok(())
}

pub fn show_config(config: &Config, validate: bool) -> anyhow::Result<()> {
    print!("{}", config.summary());
    if validate {
        let problems = config.validate();
        if problems.is_empty() {
            println!("\nConfiguration is valid");
        } else {
            println!("\nProblems:");
            for p in &problems {
                println!("- {p}");
            }
            bail!("{} configuration problem(s)", problems.len());
        }
    }
    Ok(())
}
