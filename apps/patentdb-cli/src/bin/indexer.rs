use std::io::BufRead;
use std::{env, fs, path::PathBuf};

use patentdb_core::config::{expand_path, Config};
use patentdb_core::types::Chunk;
use patentdb_embed::get_default_embedder;
use patentdb_hybrid::{BuildOutcome, LifecycleManager, LoadStatus};

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} <chunks.jsonl> [--force] [--append]");
    eprintln!("  chunks.jsonl  one Chunk JSON object per line, from the ingestion pipeline");
    eprintln!("  --force       rebuild even when the corpus is unchanged");
    eprintln!("  --append      add the chunks to the existing index instead of rebuilding");
    std::process::exit(1);
}

fn read_chunks(path: &PathBuf) -> anyhow::Result<Vec<Chunk>> {
    let file = fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut chunks = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: Chunk = serde_json::from_str(&line)
            .map_err(|e| anyhow::anyhow!("{}:{}: {e}", path.display(), line_no + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let prog = args[0].clone();
    let mut chunks_path = None;
    let mut force = false;
    let mut append = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "--force" | "-f" => force = true,
            "--append" | "-a" => append = true,
            _ if !arg.starts_with('-') => chunks_path = Some(PathBuf::from(arg)),
            _ => usage(&prog),
        }
    }
    let Some(chunks_path) = chunks_path else {
        usage(&prog)
    };

    let config = Config::load()?;
    let retrieval = config.retrieval()?;
    let index_dir = expand_path(&retrieval.index_dir);

    println!("patentdb indexer\n================");
    println!("Chunks file: {}", chunks_path.display());
    println!("Index directory: {}", index_dir.display());

    let chunks = read_chunks(&chunks_path)?;
    println!("Read {} chunks", chunks.len());

    let embedder = get_default_embedder(&retrieval)?;
    let lifecycle = LifecycleManager::new(index_dir, retrieval, embedder);

    if append {
        match lifecycle.load().await? {
            LoadStatus::Ready => {}
            LoadStatus::NotBuilt => {
                eprintln!("No existing index to append to; run a full build first.");
                std::process::exit(1);
            }
        }
        let added = lifecycle.append(&chunks).await?;
        println!("✅ Appended {added} chunks ({} total)", lifecycle.status().chunk_count);
        return Ok(());
    }

    match lifecycle.build(&chunks, force).await? {
        BuildOutcome::Built => {
            let status = lifecycle.status();
            println!("✅ Index built: {} chunks, model {}", status.chunk_count, status.model_name);
        }
        BuildOutcome::UpToDate => {
            println!("Index already matches this corpus; nothing to do (use --force to rebuild)");
        }
    }
    println!("\n💡 To search: cargo run --bin patentdb-search \"<query>\"");
    Ok(())
}
