use tempfile::TempDir;

use patentdb_core::traits::Embedder;
use patentdb_core::types::Chunk;
use patentdb_embed::FakeEmbedder;
use patentdb_vector::DenseIndex;

const DIM: usize = 64;

fn chunk(id: &str, section: &str, text: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        source_section: section.to_string(),
        page: Some(1),
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

async fn build(dir: &TempDir) -> (DenseIndex, FakeEmbedder) {
    let embedder = FakeEmbedder::new(DIM);
    let chunks = corpus();
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed(&texts, false).expect("embed");
    let index = DenseIndex::open(dir.path(), DIM).await.expect("open");
    index.add_chunks(&chunks, &embeddings).await.expect("add");
    (index, embedder)
}

#[tokio::test]
async fn top_k_is_clamped_and_ordered() {
    let tmp = TempDir::new().expect("tempdir");
    let (index, embedder) = build(&tmp).await;
    let q = embedder
        .embed(&["abstract word limit".to_string()], true)
        .expect("embed")
        .remove(0);

    let hits = index.search_vec(&q, 2, None).await.expect("search");
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score, "descending similarity");

    let all = index.search_vec(&q, 10, None).await.expect("search");
    assert_eq!(all.len(), 3, "top_k > rows returns every row");
}

#[tokio::test]
async fn empty_index_returns_empty_not_error() {
    let tmp = TempDir::new().expect("tempdir");
    let index = DenseIndex::open(tmp.path(), DIM).await.expect("open");
    let hits = index.search_vec(&vec![0.1; DIM], 5, None).await.expect("search");
    assert!(hits.is_empty());
    assert_eq!(index.count().await.expect("count"), 0);
}

#[tokio::test]
async fn reopen_yields_identical_ranking() {
    let tmp = TempDir::new().expect("tempdir");
    let (index, embedder) = build(&tmp).await;
    let q = embedder
        .embed(&["definite claim requirement".to_string()], true)
        .expect("embed")
        .remove(0);
    let before = index.search_vec(&q, 3, None).await.expect("search");
    drop(index);

    let reopened = DenseIndex::open(tmp.path(), DIM).await.expect("reopen");
    let after = reopened.search_vec(&q, 3, None).await.expect("search");
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(a.id, b.id, "ordering survives reload");
        assert!((a.score - b.score).abs() < 1e-6, "scores survive reload");
    }
}

#[tokio::test]
async fn section_filter_applies_before_top_k() {
    let tmp = TempDir::new().expect("tempdir");
    let (index, embedder) = build(&tmp).await;
    let q = embedder
        .embed(&["anything at all".to_string()], true)
        .expect("embed")
        .remove(0);
    let hits = index
        .search_vec(&q, 10, Some("MPEP 608"))
        .await
        .expect("search");
    assert_eq!(hits.len(), 2, "filter matching fewer rows returns fewer hits");
    assert!(hits.iter().all(|h| h.id != "c1"));
}

#[tokio::test]
async fn direct_lookups_bypass_ranking() {
    let tmp = TempDir::new().expect("tempdir");
    let (index, _) = build(&tmp).await;

    let section = index.get_by_section("MPEP 608").await.expect("get");
    assert_eq!(section.len(), 2);
    assert_eq!(section[0].id, "c2", "ordered by id");
    assert_eq!(section[0].page, Some(1));

    let by_id = index
        .get_chunks(&["c3".to_string(), "missing".to_string()])
        .await
        .expect("get");
    assert_eq!(by_id.len(), 1);
    assert_eq!(by_id["c3"].text, "abstract must not exceed 150 words");
}
