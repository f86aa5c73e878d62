//! Chunking, persistence, and search behaviour of the index.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{DIM, HashEmbedder, write_file};
use personal_rag::{
    Chunk, Chunker, Document, DocumentSource, EmbedOptions, EmbeddingProvider, IndexState,
    Indexer, PersistentIndex, RagConfig, RagError, RecursiveChunker, Result, UrlOutcome,
    VectorStore,
};
use proptest::prelude::*;

/// Embedder returning a fixed vector per chunk text of the form `c{i}`.
struct TableEmbedder {
    vectors: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let i: usize = text.trim_start_matches('c').parse().unwrap();
        Ok(self.vectors[i].clone())
    }

    fn dimensions(&self) -> usize {
        4
    }
}

fn chunk(id: &str, text: &str) -> Chunk {
    Chunk { id: id.into(), text: text.into(), embedding: Vec::new(), metadata: BTreeMap::new() }
}

fn config_for(source: &std::path::Path, persist: &std::path::Path) -> RagConfig {
    RagConfig::builder()
        .source_path(source)
        .persist_dir(persist)
        .chunk_size(60)
        .top_k(3)
        .build()
        .unwrap()
}

mod prop_chunking {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn splitting_is_deterministic_and_bounded(
            text in "[a-zA-Z .!?\n]{0,600}",
            size in 5usize..120,
            overlap_ratio in 0usize..4,
        ) {
            let overlap = size * overlap_ratio / 5;
            let chunker = RecursiveChunker::new(size, overlap).unwrap();
            let first = chunker.split_text(&text);
            let second = chunker.split_text(&text);
            prop_assert_eq!(&first, &second);
            for piece in &first {
                prop_assert!(piece.chars().count() <= size);
                prop_assert!(!piece.trim().is_empty());
            }
        }

        #[test]
        fn short_documents_become_one_chunk(text in "[a-z][a-z ]{0,40}[a-z]") {
            let chunker = RecursiveChunker::new(250, 0).unwrap();
            let document = Document::new(text.clone(), DocumentSource::File("a.txt".into()));
            let chunks = chunker.chunk(&document).unwrap();
            prop_assert_eq!(chunks.len(), 1);
            prop_assert_eq!(&chunks[0].text, &text);
        }
    }
}

mod prop_query_ordering {
    use super::*;

    fn arb_vector() -> impl Strategy<Value = Vec<f32>> {
        proptest::collection::vec(-1.0f32..1.0f32, 4)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn results_are_sorted_and_bounded_by_k(
            vectors in proptest::collection::vec(arb_vector(), 1..15),
            query in arb_vector(),
            k in 1usize..20,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let chunks: Vec<Chunk> =
                (0..vectors.len()).map(|i| chunk(&format!("id{i}"), &format!("c{i}"))).collect();
            let count = chunks.len();
            let embedder = TableEmbedder { vectors };

            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let index = PersistentIndex::build(
                    chunks,
                    &embedder,
                    "props",
                    dir.path(),
                    EmbedOptions::default(),
                )
                .await
                .unwrap();
                index.query(&query, k).unwrap()
            });

            prop_assert_eq!(results.len(), k.min(count));
            for pair in results.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}

#[tokio::test]
async fn equal_scores_keep_insertion_order() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = TableEmbedder { vectors: vec![vec![1.0, 0.0, 0.0, 0.0]; 3] };
    let chunks = vec![chunk("first", "c0"), chunk("second", "c1"), chunk("third", "c2")];
    let index =
        PersistentIndex::build(chunks, &embedder, "ties", dir.path(), EmbedOptions::default())
            .await
            .unwrap();

    let ids: Vec<String> =
        index.query(&[1.0, 0.0, 0.0, 0.0], 3).unwrap().into_iter().map(|r| r.chunk.id).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn query_rejects_wrong_dimension() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = TableEmbedder { vectors: vec![vec![1.0, 0.0, 0.0, 0.0]] };
    let index = PersistentIndex::build(
        vec![chunk("a", "c0")],
        &embedder,
        "dims",
        dir.path(),
        EmbedOptions::default(),
    )
    .await
    .unwrap();

    let err = index.query(&[1.0, 0.0], 1).unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 4, actual: 2 }));
}

#[tokio::test]
async fn load_from_missing_directory_is_index_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let persist = dir.path().join("never_built");
    let err = PersistentIndex::load("docs", &persist, &HashEmbedder::default()).await.unwrap_err();
    assert!(matches!(err, RagError::IndexNotFound { .. }));
    assert!(err.is_not_ready());
}

#[tokio::test]
async fn persisted_index_answers_like_the_built_one() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = HashEmbedder::default();
    let chunks = vec![
        chunk("a", "Joel is a friend of Raul"),
        chunk("b", "Raul is a cat who likes fish"),
        chunk("c", "The weather in Lisbon is mild"),
    ];
    let built = PersistentIndex::build(
        chunks,
        &embedder,
        "docs",
        dir.path(),
        EmbedOptions { batch_size: 2, timeout: None },
    )
    .await
    .unwrap();
    let reopened = PersistentIndex::load("docs", dir.path(), &embedder).await.unwrap();

    let query = embedder.embed("who is Raul").await.unwrap();
    assert_eq!(built.search(&query, 2).await.unwrap(), reopened.search(&query, 2).await.unwrap());
    assert_eq!(reopened.manifest().chunk_count, 3);

    let own = embedder.embed("Raul is a cat who likes fish").await.unwrap();
    let top = reopened.search(&own, 1).await.unwrap();
    assert_eq!(top[0].chunk.id, "b");
    assert!((top[0].score - 1.0).abs() < 1e-6);
    assert_eq!(reopened.dimensions(), DIM);
}

#[tokio::test]
async fn reopening_with_a_different_dimension_fails() {
    let dir = tempfile::tempdir().unwrap();
    PersistentIndex::build(
        vec![chunk("a", "Joel")],
        &HashEmbedder::default(),
        "docs",
        dir.path(),
        EmbedOptions::default(),
    )
    .await
    .unwrap();

    let other = TableEmbedder { vectors: Vec::new() };
    let err = PersistentIndex::load("docs", dir.path(), &other).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: DIM, actual: 4 }));
}

#[tokio::test]
async fn indexer_reports_indexed_only_after_a_build() {
    let source = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    let persist_dir = persist.path().join("db");
    write_file(source.path(), "joel.txt", "Joel is a friend of Raul, a cat.");
    write_file(source.path(), "ignored.md", "not a text extension");

    let indexer = Indexer::builder()
        .config(config_for(source.path(), &persist_dir))
        .embedding_provider(Arc::new(HashEmbedder::default()))
        .build()
        .unwrap();
    assert!(!indexer.is_indexed());
    assert_eq!(indexer.state().await, IndexState::Absent);

    let handle = indexer.get_or_build().await.unwrap();
    let report = handle.report.unwrap();
    assert_eq!(report.document_count, 1);
    assert_eq!(report.chunk_count, 1);
    assert!(indexer.is_indexed());
    assert_eq!(indexer.state().await, IndexState::Ready);

    // second call loads instead of rebuilding
    let again = indexer.get_or_build().await.unwrap();
    assert!(again.report.is_none());
    assert_eq!(again.index.len(), 1);
}

#[tokio::test]
async fn failed_build_publishes_nothing() {
    let source = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    let persist_dir = persist.path().join("db");
    write_file(source.path(), "joel.txt", "Joel is a friend of Raul, a cat.");

    let indexer = Indexer::builder()
        .config(config_for(source.path(), &persist_dir))
        .embedding_provider(Arc::new(HashEmbedder::failing()))
        .build()
        .unwrap();

    let err = indexer.force_reindex().await.unwrap_err();
    assert!(matches!(err, RagError::Provider { .. }));
    assert!(!persist_dir.exists());
    assert!(!indexer.is_indexed());
    assert_eq!(indexer.state().await, IndexState::Absent);
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_collection() {
    let source = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    write_file(source.path(), "joel.txt", "Joel is a friend of Raul, a cat.");

    let embedder = Arc::new(HashEmbedder::default());
    let indexer = Indexer::builder()
        .config(config_for(source.path(), persist.path()))
        .embedding_provider(embedder.clone())
        .build()
        .unwrap();
    indexer.get_or_build().await.unwrap();

    write_file(source.path(), "more.txt", "Raul likes fish.");
    embedder.set_failing(true);
    assert!(indexer.force_reindex().await.is_err());

    embedder.set_failing(false);
    let loaded = indexer.load().await.unwrap();
    assert_eq!(loaded.len(), 1);
}

#[tokio::test]
async fn reindex_picks_up_new_sources() {
    let source = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    write_file(source.path(), "joel.txt", "Joel is a friend of Raul, a cat.");

    let indexer = Indexer::builder()
        .config(config_for(source.path(), persist.path()))
        .embedding_provider(Arc::new(HashEmbedder::default()))
        .build()
        .unwrap();
    assert_eq!(indexer.get_or_build().await.unwrap().index.len(), 1);

    write_file(source.path(), "raul.txt", "Raul likes fish.");
    let rebuilt = indexer.force_reindex().await.unwrap();
    assert_eq!(rebuilt.index.len(), 2);
    assert_eq!(indexer.load().await.unwrap().len(), 2);
}

fn entry_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn leftover_from_an_interrupted_build_does_not_block_a_new_one() {
    let source = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    let persist_dir = persist.path().join("db");
    write_file(source.path(), "joel.txt", "Joel is a friend of Raul, a cat.");
    std::fs::create_dir_all(persist_dir.join(".staging-my_text_docs-dead")).unwrap();

    let indexer = Indexer::builder()
        .config(config_for(source.path(), &persist_dir))
        .embedding_provider(Arc::new(HashEmbedder::default()))
        .build()
        .unwrap();

    let handle = indexer.get_or_build().await.unwrap();
    assert_eq!(handle.report.unwrap().chunk_count, 1);
    assert_eq!(indexer.state().await, IndexState::Ready);
    assert_eq!(indexer.load().await.unwrap().len(), 1);
}

#[tokio::test]
async fn builds_leave_only_the_collection_in_the_persist_dir() {
    let source = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    let persist_dir = persist.path().join("db");
    write_file(source.path(), "joel.txt", "Joel is a friend of Raul, a cat.");

    let indexer = Indexer::builder()
        .config(config_for(source.path(), &persist_dir))
        .embedding_provider(Arc::new(HashEmbedder::default()))
        .build()
        .unwrap();
    indexer.get_or_build().await.unwrap();
    assert_eq!(entry_names(&persist_dir), vec!["my_text_docs"]);

    write_file(source.path(), "raul.txt", "Raul likes fish.");
    indexer.force_reindex().await.unwrap();
    assert_eq!(entry_names(&persist_dir), vec!["my_text_docs"]);
    assert_eq!(entry_names(persist.path()), vec!["db"]);
}

#[tokio::test]
async fn rejected_documents_are_skipped() {
    let source = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    write_file(source.path(), "good.txt", "Joel is a friend of Raul, a cat.");
    write_file(source.path(), "bad.txt", "binary\0payload");

    let indexer = Indexer::builder()
        .config(config_for(source.path(), persist.path()))
        .embedding_provider(Arc::new(HashEmbedder::default()))
        .build()
        .unwrap();
    let report = indexer.force_reindex().await.unwrap().report.unwrap();

    assert_eq!(report.document_count, 2);
    assert_eq!(report.chunk_count, 1);
    assert_eq!(report.skipped_documents.len(), 1);
    assert!(report.skipped_documents[0].source.ends_with("bad.txt"));
}

#[tokio::test]
async fn unreachable_urls_are_reported_not_fatal() {
    let source = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();
    write_file(source.path(), "joel.txt", "Joel is a friend of Raul, a cat.");

    let config = RagConfig::builder()
        .source_path(source.path())
        .persist_dir(persist.path())
        .urls(["http://127.0.0.1:1/unreachable"])
        .build()
        .unwrap();
    let indexer = Indexer::builder()
        .config(config)
        .embedding_provider(Arc::new(HashEmbedder::default()))
        .build()
        .unwrap();
    let report = indexer.force_reindex().await.unwrap().report.unwrap();

    assert_eq!(report.chunk_count, 1);
    assert_eq!(report.url_outcomes.len(), 1);
    assert!(matches!(&report.url_outcomes[0], UrlOutcome::Failed { url, .. } if url.contains("127.0.0.1:1")));
}

#[tokio::test]
async fn missing_source_path_is_fatal() {
    let persist = tempfile::tempdir().unwrap();
    let missing = persist.path().join("no_such_dir");

    let indexer = Indexer::builder()
        .config(config_for(&missing, &persist.path().join("db")))
        .embedding_provider(Arc::new(HashEmbedder::default()))
        .build()
        .unwrap();
    let err = indexer.get_or_build().await.unwrap_err();
    assert!(matches!(err, RagError::Load { .. }));
}

#[tokio::test]
async fn empty_corpus_builds_an_empty_collection() {
    let source = tempfile::tempdir().unwrap();
    let persist = tempfile::tempdir().unwrap();

    let indexer = Indexer::builder()
        .config(config_for(source.path(), persist.path()))
        .embedding_provider(Arc::new(HashEmbedder::default()))
        .build()
        .unwrap();
    let handle = indexer.get_or_build().await.unwrap();

    assert!(handle.index.is_empty());
    assert!(indexer.is_indexed());
    let query = HashEmbedder::default().embed("anything").await.unwrap();
    assert!(handle.index.search(&query, 6).await.unwrap().is_empty());
}

#[test]
fn chunker_trait_object_chunks_documents() {
    let chunker: Arc<dyn Chunker> = Arc::new(RecursiveChunker::new(20, 0).unwrap());
    let document = Document::new(
        "first paragraph.\n\nsecond paragraph.",
        DocumentSource::Url("https://example.com".into()),
    );
    let chunks = chunker.chunk(&document).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].id, "https://example.com_1");
    assert_eq!(chunks[1].metadata.get("chunk_index").map(String::as_str), Some("1"));
}
