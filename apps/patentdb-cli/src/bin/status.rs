use patentdb_core::config::{expand_path, Config};
use patentdb_embed::get_default_embedder;
use patentdb_hybrid::LifecycleManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    let retrieval = config.retrieval()?;
    let index_dir = expand_path(&retrieval.index_dir);

    let embedder = get_default_embedder(&retrieval)?;
    let lifecycle = LifecycleManager::new(index_dir.clone(), retrieval, embedder);
    let status = lifecycle.status();

    println!("patentdb status\n===============");
    println!("Index directory: {}", index_dir.display());
    println!("Built: {}", status.built);
    println!("Chunks: {}", status.chunk_count);
    println!("Model: {} (dim {})", status.model_name, status.embedding_dim);
    if let Some(built_at) = &status.built_at {
        println!("Built at: {built_at}");
    }
    if !status.built {
        println!("\n💡 Run `patentdb-indexer <chunks.jsonl>` to build the index.");
    }
    Ok(())
}
