use std::env;
use std::sync::Arc;

use patentdb_core::config::{expand_path, Config};
use patentdb_embed::get_default_embedder;
use patentdb_hybrid::{HybridSearchEngine, LifecycleManager, LoadStatus, RuleBasedExpander};
use patentdb_rerank::get_default_reranker;

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} <query> [--top-k N] [--section LABEL]");
    eprintln!("Example: {prog} 'word limit for abstract' --top-k 5 --section 'MPEP 608'");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let prog = args[0].clone();
    if args.len() < 2 {
        usage(&prog);
    }
    let query = args[1].clone();
    let mut top_k: Option<usize> = None;
    let mut section: Option<String> = None;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--top-k" | "-k" => {
                let Some(value) = args.get(i + 1).and_then(|v| v.parse().ok()) else {
                    eprintln!("Error: --top-k requires a number");
                    std::process::exit(1);
                };
                top_k = Some(value);
                i += 1;
            }
            "--section" | "-s" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("Error: --section requires a label");
                    std::process::exit(1);
                };
                section = Some(value.clone());
                i += 1;
            }
            _ => usage(&prog),
        }
        i += 1;
    }

    let config = Config::load()?;
    let retrieval = config.retrieval()?;
    let index_dir = expand_path(&retrieval.index_dir);
    let top_k = top_k.unwrap_or(retrieval.final_top_k);

    let embedder = get_default_embedder(&retrieval)?;
    let reranker = get_default_reranker(&retrieval);
    let lifecycle = Arc::new(LifecycleManager::new(
        index_dir,
        retrieval.clone(),
        embedder.clone(),
    ));
    match lifecycle.load().await {
        Ok(LoadStatus::Ready) => {}
        Ok(LoadStatus::NotBuilt) => {
            eprintln!("Index not built. Run `patentdb-indexer <chunks.jsonl>` first.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to load index: {e}");
            std::process::exit(1);
        }
    }

    let engine = HybridSearchEngine::new(
        lifecycle,
        embedder,
        reranker,
        Some(Arc::new(RuleBasedExpander::new())),
        retrieval,
    );

    let results = engine.search(&query, top_k, section.as_deref()).await?;
    println!("🔍 Found {} results for: \"{}\"", results.len(), query);
    for result in &results {
        println!(
            "\n  {}. score={:.4}  id={}  section={}{}",
            result.rank,
            result.relevance_score,
            result.id,
            result.source_section,
            result
                .page
                .map(|p| format!("  page={p}"))
                .unwrap_or_default()
        );
        println!("     📝 {}", result.text);
    }
    Ok(())
}
