use tempfile::TempDir;

use patentdb_core::types::Chunk;
use patentdb_text::SparseIndex;

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

#[test]
fn bm25_ranks_the_overlapping_chunk_first() {
    let tmp = TempDir::new().expect("tempdir");
    let index = SparseIndex::create(tmp.path()).expect("create");
    index.add_chunks(&corpus()).expect("add");

    let hits = index.search("word limit for abstract", 3, None).expect("search");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].id, "c3", "only c3 contains 'abstract'");
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score, "descending scores");
    }
}

#[test]
fn build_and_query_tokenization_match() {
    let tmp = TempDir::new().expect("tempdir");
    let index = SparseIndex::create(tmp.path()).expect("create");
    index
        .add_chunks(&[chunk("c1", "MPEP 608", "Drawings require Reference-Numerals.")])
        .expect("add");

    // Case folding and punctuation splitting must apply identically on both
    // sides, or this recall silently disappears.
    let hits = index.search("reference numerals", 5, None).expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "c1");
}

#[test]
fn section_filter_restricts_candidates() {
    let tmp = TempDir::new().expect("tempdir");
    let index = SparseIndex::create(tmp.path()).expect("create");
    index.add_chunks(&corpus()).expect("add");

    let hits = index
        .search("must", 10, Some("MPEP 608"))
        .expect("search");
    assert!(!hits.is_empty());
    for hit in &hits {
        assert_ne!(hit.id, "c1", "filtered section excludes MPEP 2173");
    }
}

#[test]
fn zero_overlap_query_returns_empty() {
    let tmp = TempDir::new().expect("tempdir");
    let index = SparseIndex::create(tmp.path()).expect("create");
    index.add_chunks(&corpus()).expect("add");

    let hits = index.search("zymurgy quux", 5, None).expect("search");
    assert!(hits.is_empty());
}

#[test]
fn reopen_preserves_the_index() {
    let tmp = TempDir::new().expect("tempdir");
    {
        let index = SparseIndex::create(tmp.path()).expect("create");
        index.add_chunks(&corpus()).expect("add");
    }
    let reopened = SparseIndex::open(tmp.path()).expect("open");
    assert_eq!(reopened.doc_count().expect("count"), 3);
    let hits = reopened.search("definite claim", 5, None).expect("search");
    assert_eq!(hits[0].id, "c1");
}

#[test]
fn empty_index_searches_cleanly() {
    let tmp = TempDir::new().expect("tempdir");
    let index = SparseIndex::create(tmp.path()).expect("create");
    index.add_chunks(&[]).expect("add");
    let hits = index.search("anything", 5, None).expect("search");
    assert!(hits.is_empty());
}
