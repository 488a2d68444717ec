use patentdb_core::traits::Embedder;
use patentdb_embed::FakeEmbedder;

#[test]
fn fake_embedder_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(768);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed(&texts, false).expect("embed");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 768, "embedding dim matches construction");

    // Norm approximately 1.0
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    // Deterministic for same input
    for (a, b) in v1.iter().zip(v2.iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[test]
fn fake_embedder_tracks_token_overlap() {
    let embedder = FakeEmbedder::new(768);
    let texts = vec![
        "abstract must not exceed one hundred fifty words".to_string(),
        "word limit for the abstract".to_string(),
        "drawings require reference numerals".to_string(),
    ];
    let embs = embedder.embed(&texts, false).expect("embed");
    let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let overlap = dot(&embs[0], &embs[1]);
    let disjoint = dot(&embs[0], &embs[2]);
    assert!(
        overlap > disjoint,
        "shared vocabulary should score higher ({overlap} vs {disjoint})"
    );
}

#[test]
fn empty_batch_is_a_no_op() {
    let embedder = FakeEmbedder::new(32);
    let embs = embedder.embed(&[], true).expect("embed");
    assert!(embs.is_empty());
}
