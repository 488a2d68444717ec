use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use patentdb_core::config::{ExpansionMode, RetrievalConfig};
use patentdb_core::error::Error;
use patentdb_core::types::Chunk;
use patentdb_embed::FakeEmbedder;
use patentdb_hybrid::{
    BuildOutcome, HybridSearchEngine, IndexManifest, LifecycleManager, LoadStatus,
};
use patentdb_rerank::LexicalReranker;

const DIM: usize = 64;

fn test_config() -> RetrievalConfig {
    RetrievalConfig {
        embedding_dim: DIM,
        embed_batch_size: 2,
        expansion_mode: ExpansionMode::None,
        ..RetrievalConfig::default()
    }
}

fn chunk(id: &str, section: &str, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        source_section: section.to_string(),
        page: None,
        metadata: Default::default(),
    }
}

fn corpus() -> Vec<Chunk> {
    vec![
        chunk("c1", "MPEP 2173", "the claim must be definite"),
        chunk("c2", "MPEP 608", "drawings require reference numerals"),
        chunk("c3", "MPEP 608", "abstract must not exceed 150 words"),
    ]
}

fn manager(index_dir: &Path, cfg: &RetrievalConfig) -> Arc<LifecycleManager> {
    Arc::new(LifecycleManager::new(
        index_dir.to_path_buf(),
        cfg.clone(),
        Arc::new(FakeEmbedder::new(DIM)),
    ))
}

fn engine(lifecycle: Arc<LifecycleManager>, cfg: RetrievalConfig) -> HybridSearchEngine {
    HybridSearchEngine::new(
        lifecycle,
        Arc::new(FakeEmbedder::new(DIM)),
        Arc::new(LexicalReranker::new()),
        None,
        cfg,
    )
}

#[tokio::test]
async fn abstract_question_finds_the_abstract_rule() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    let lifecycle = manager(tmp.path(), &cfg);
    lifecycle.build(&corpus(), false).await.expect("build");

    let engine = engine(lifecycle, cfg);
    let results = engine
        .search("word limit for abstract", 1, None)
        .await
        .expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "c3");
    assert_eq!(results[0].rank, 1);
    assert_eq!(results[0].source_section, "MPEP 608");
}

#[tokio::test]
async fn results_are_ordered_and_clamped() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    let lifecycle = manager(tmp.path(), &cfg);
    lifecycle.build(&corpus(), false).await.expect("build");
    let engine = engine(lifecycle, cfg);

    let exact = engine
        .search("definite claim", 3, None)
        .await
        .expect("search");
    assert_eq!(exact.len(), 3, "top_k == chunk_count returns top_k");
    for pair in exact.windows(2) {
        assert!(
            pair[0].relevance_score >= pair[1].relevance_score,
            "non-increasing relevance"
        );
    }
    for (i, r) in exact.iter().enumerate() {
        assert_eq!(r.rank, i + 1);
    }

    let over = engine
        .search("definite claim", 10, None)
        .await
        .expect("search");
    assert_eq!(over.len(), 3, "top_k > chunk_count returns chunk_count");
}

#[tokio::test]
async fn unforced_rebuild_of_same_corpus_is_a_no_op() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    let lifecycle = manager(tmp.path(), &cfg);

    let first = lifecycle.build(&corpus(), false).await.expect("build");
    assert_eq!(first, BuildOutcome::Built);
    let manifest_before = IndexManifest::load(tmp.path()).expect("load").expect("some");

    let second = lifecycle.build(&corpus(), false).await.expect("rebuild");
    assert_eq!(second, BuildOutcome::UpToDate);
    let manifest_after = IndexManifest::load(tmp.path()).expect("load").expect("some");
    assert_eq!(
        manifest_before.built_at, manifest_after.built_at,
        "no-op build leaves the manifest untouched"
    );

    let forced = lifecycle.build(&corpus(), true).await.expect("force");
    assert_eq!(forced, BuildOutcome::Built);
}

#[tokio::test]
async fn empty_corpus_builds_a_valid_empty_index() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    let lifecycle = manager(tmp.path(), &cfg);
    lifecycle.build(&[], false).await.expect("build");

    let engine = engine(lifecycle, cfg);
    let status = engine.status();
    assert!(status.built);
    assert_eq!(status.chunk_count, 0);

    let results = engine.search("anything", 5, None).await.expect("search");
    assert!(results.is_empty(), "empty index searches cleanly");
}

#[tokio::test]
async fn search_before_build_reports_not_built() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    let lifecycle = manager(tmp.path(), &cfg);
    assert_eq!(
        lifecycle.load().await.expect("load"),
        LoadStatus::NotBuilt,
        "missing manifest is a status, not an error"
    );
    let engine = engine(lifecycle, cfg);
    assert!(!engine.status().built);
    let err = engine.search("anything", 5, None).await.expect_err("err");
    assert!(matches!(err, Error::NotBuilt(_)));
}

#[tokio::test]
async fn corrupt_sparse_index_degrades_to_dense_only() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    {
        let lifecycle = manager(tmp.path(), &cfg);
        lifecycle.build(&corpus(), false).await.expect("build");
    }
    // Simulate sparse corruption by removing its artifacts.
    let manifest = IndexManifest::load(tmp.path()).expect("load").expect("some");
    std::fs::remove_dir_all(manifest.generation_dir(tmp.path()).join("tantivy"))
        .expect("remove sparse artifacts");

    let lifecycle = manager(tmp.path(), &cfg);
    assert_eq!(lifecycle.load().await.expect("load"), LoadStatus::Ready);
    let engine = engine(lifecycle, cfg);
    let results = engine
        .search("abstract word limit", 2, None)
        .await
        .expect("dense-only search still works");
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.sparse_score.is_none()));
}

#[tokio::test]
async fn expansion_single_equals_none_without_a_generator() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    let lifecycle = manager(tmp.path(), &cfg);
    lifecycle.build(&corpus(), false).await.expect("build");

    let none_engine = engine(lifecycle.clone(), cfg.clone());
    let single_cfg = RetrievalConfig {
        expansion_mode: ExpansionMode::Single,
        ..cfg
    };
    let single_engine = engine(lifecycle, single_cfg);

    let a = none_engine
        .search("reference numerals", 3, None)
        .await
        .expect("search");
    let b = single_engine
        .search("reference numerals", 3, None)
        .await
        .expect("search");
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.id, y.id, "both modes fall back to the raw query");
        assert!((x.relevance_score - y.relevance_score).abs() < 1e-6);
    }
}

#[tokio::test]
async fn section_filter_applies_before_fusion() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    let lifecycle = manager(tmp.path(), &cfg);
    lifecycle.build(&corpus(), false).await.expect("build");
    let engine = engine(lifecycle, cfg);

    let results = engine
        .search("must", 3, Some("MPEP 608"))
        .await
        .expect("search");
    assert!(!results.is_empty());
    assert!(
        results.len() <= 2,
        "a filter matching fewer chunks than top_k returns fewer results"
    );
    assert!(results.iter().all(|r| r.source_section == "MPEP 608"));
}

#[tokio::test]
async fn get_by_section_bypasses_ranking() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    let lifecycle = manager(tmp.path(), &cfg);
    lifecycle.build(&corpus(), false).await.expect("build");
    let engine = engine(lifecycle, cfg);

    let chunks = engine.get_by_section("MPEP 608").await.expect("lookup");
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].id, "c2");
    assert_eq!(chunks[1].id, "c3");
}

#[tokio::test]
async fn append_grows_the_corpus_incrementally() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    let lifecycle = manager(tmp.path(), &cfg);
    lifecycle.build(&corpus(), false).await.expect("build");

    let added = lifecycle
        .append(&[chunk(
            "c4",
            "MPEP 714",
            "amendments must comply with formal requirements",
        )])
        .await
        .expect("append");
    assert_eq!(added, 1);
    assert_eq!(lifecycle.status().chunk_count, 4);

    let engine = engine(lifecycle, cfg);
    let results = engine
        .search("amendments formal requirements", 1, None)
        .await
        .expect("search");
    assert_eq!(results[0].id, "c4", "appended chunk is searchable");
}

#[tokio::test]
async fn reload_reproduces_the_ranking() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    let lifecycle = manager(tmp.path(), &cfg);
    lifecycle.build(&corpus(), false).await.expect("build");
    let before = engine(lifecycle, cfg.clone())
        .search("definite claim", 3, None)
        .await
        .expect("search");

    let fresh = manager(tmp.path(), &cfg);
    assert_eq!(fresh.load().await.expect("load"), LoadStatus::Ready);
    let after = engine(fresh, cfg)
        .search("definite claim", 3, None)
        .await
        .expect("search");

    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(a.id, b.id, "ordering survives reload");
        assert!((a.relevance_score - b.relevance_score).abs() < 1e-6);
    }
}

#[tokio::test]
async fn dimension_mismatch_is_fatal_at_load() {
    let tmp = TempDir::new().expect("tempdir");
    let cfg = test_config();
    {
        let lifecycle = manager(tmp.path(), &cfg);
        lifecycle.build(&corpus(), false).await.expect("build");
    }
    // A provider with a different dimension must be rejected, not truncated.
    let mismatched = Arc::new(LifecycleManager::new(
        tmp.path().to_path_buf(),
        RetrievalConfig {
            embedding_dim: 32,
            ..cfg
        },
        Arc::new(FakeEmbedder::new(32)),
    ));
    let err = mismatched.load().await.expect_err("mismatch");
    assert!(matches!(err, Error::Configuration(_)));
}
