use std::fs;
use tempfile::TempDir;

use island_core::chunker::{chunk_corpus, Chunker};
use island_core::config::{Config, EmbeddingProvider};
use island_core::corpus::{list_worlds, load_corpus_dir};
use island_core::types::{BuildParams, ChunkingConfig, CorpusDocument, Decision, Thresholds, WorldStatus};

#[test]
fn load_corpus_dir_skips_empty_and_sorts() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("b.txt"), "Hera watched from the clouds.").unwrap();
    fs::write(dir.join("a.txt"), "  Zeus ruled from Mount Olympus.\n").unwrap();
    fs::write(dir.join("empty.txt"), "   \n").unwrap();
    fs::write(dir.join("notes.md"), "not part of the corpus").unwrap();

    let docs = load_corpus_dir(dir, &[]).expect("load");

    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["a.txt", "b.txt"]);
    assert_eq!(docs[0].text, "Zeus ruled from Mount Olympus.");
}

#[test]
fn load_corpus_dir_applies_patterns() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("gods.txt"), "alpha").unwrap();
    fs::write(tmp.path().join("heroes.txt"), "bravo").unwrap();

    let docs = load_corpus_dir(tmp.path(), &["her*.txt".to_string()]).expect("load");

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id, "heroes.txt");
}

#[test]
fn load_corpus_dir_supports_glob_classes() {
    let tmp = TempDir::new().unwrap();
    for name in ["book1.txt", "book2.txt", "book10.txt", "appendix.txt"] {
        fs::write(tmp.path().join(name), name).unwrap();
    }

    let docs = load_corpus_dir(tmp.path(), &["book?.txt".to_string(), "[a]*.txt".to_string()]).expect("load");
    let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["appendix.txt", "book1.txt", "book2.txt"]);

    assert!(load_corpus_dir(tmp.path(), &["book[.txt".to_string()]).is_err());
}

#[test]
fn load_corpus_dir_missing_dir_errors() {
    let tmp = TempDir::new().unwrap();
    assert!(load_corpus_dir(&tmp.path().join("nope"), &[]).is_err());
}

#[test]
fn list_worlds_returns_sorted_subdirectories() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("vampire_cyberpunk")).unwrap();
    fs::create_dir(tmp.path().join("greek_myth")).unwrap();
    fs::write(tmp.path().join("README.txt"), "x").unwrap();

    assert_eq!(list_worlds(tmp.path()).unwrap(), vec!["greek_myth", "vampire_cyberpunk"]);
}

#[test]
fn chunker_covers_document_with_overlap() {
    let text: String = (0..50).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let config = ChunkingConfig { chunk_size: 20, overlap: 5, min_chunk_length: 1 };

    let chunks: Vec<_> = Chunker::new("doc", &text, config).unwrap().collect();

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].start_offset, 0);
    assert_eq!(chunks[1].start_offset, 15);
    assert_eq!(chunks[2].start_offset, 30);
    assert_eq!(chunks[2].length, 20);
    // consecutive chunks share `overlap` characters
    assert_eq!(&chunks[0].text[15..], &chunks[1].text[..5]);
    let last = chunks.last().unwrap();
    assert_eq!(last.start_offset + last.length, 50, "last chunk reaches the end");
}

#[test]
fn chunker_drops_short_trimmed_windows() {
    // second window trims to "klm"; third is only whitespace
    let text = "abcdefghij  klm          ";
    let config = ChunkingConfig { chunk_size: 10, overlap: 0, min_chunk_length: 4 };

    let chunks: Vec<_> = Chunker::new("doc", text, config).unwrap().collect();

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "abcdefghij");
    assert_eq!(chunks[0].id, "doc:0");
}

#[test]
fn chunker_offsets_count_characters_not_bytes() {
    let text = "ζεύς ήρα αθηνά ποσειδών";
    let config = ChunkingConfig { chunk_size: 8, overlap: 2, min_chunk_length: 1 };

    let chunks: Vec<_> = Chunker::new("greek", text, config).unwrap().collect();

    let all: Vec<char> = text.chars().collect();
    for chunk in &chunks {
        let expected: String = all[chunk.start_offset..chunk.start_offset + chunk.length].iter().collect();
        assert_eq!(chunk.text, expected);
    }
}

#[test]
fn chunk_corpus_preserves_attribution() {
    let docs = vec![
        CorpusDocument::new("zeus.txt", "Zeus hurled thunderbolts from the peak."),
        CorpusDocument::new("empty.txt", ""),
        CorpusDocument::new("hera.txt", "Hera guarded marriage and the hearth."),
    ];
    let config = ChunkingConfig { chunk_size: 1000, overlap: 10, min_chunk_length: 5 };

    let chunks: Vec<_> = chunk_corpus(&docs, config).unwrap().collect();

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].source_document_id, "zeus.txt");
    assert_eq!(chunks[1].source_document_id, "hera.txt");
    assert_eq!(chunks[1].id, "hera.txt:0");
}

#[test]
fn build_params_validation() {
    assert!(BuildParams::default().validate().is_ok());
    let bad_k = BuildParams { k: 0, ..BuildParams::default() };
    assert!(bad_k.validate().is_err());
    let inverted = BuildParams { accept_percentile: 0.99, review_percentile: 0.95, ..BuildParams::default() };
    assert!(inverted.validate().is_err());
    let overlap = BuildParams { chunk_size: 10, overlap: 10, ..BuildParams::default() };
    assert!(overlap.validate().is_err());
}

#[test]
fn config_merges_file_env_and_defaults() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
            [paths]
            corpus_dir = "worlds"

            [build]
            chunk_size = 300
            overlap = 60

            [embedding]
            provider = "hash"
            dim = 64
            "#,
        )?;
        jail.create_file("config.test.toml", "[index]\nflat_threshold = 32\n")?;
        jail.set_env("APP_BUILD__K", "4");

        let config = Config::load_for_env("test").map_err(|e| e.to_string())?;
        let settings = config.settings().map_err(|e| e.to_string())?;

        assert_eq!(settings.paths.corpus_dir, "worlds");
        assert_eq!(settings.paths.artifacts_dir, "artifacts");
        assert_eq!(settings.build.params.chunk_size, 300);
        assert_eq!(settings.build.params.overlap, 60);
        assert_eq!(settings.build.params.k, 4);
        assert_eq!(settings.build.params.min_chunk_length, 40);
        assert_eq!(settings.build.embed_batch_size, 32);
        assert_eq!(settings.index.flat_threshold, 32);
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Hash);
        assert_eq!(settings.embedding.dim, 64);
        Ok(())
    });
}

#[test]
fn config_rejects_invalid_percentiles() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("config.toml", "[build]\naccept_percentile = 0.99\nreview_percentile = 0.9\n")?;
        let config = Config::load_for_env("dev").map_err(|e| e.to_string())?;
        assert!(config.settings().is_err());
        Ok(())
    });
}

#[test]
fn decisions_and_status_serialize_for_callers() {
    assert_eq!(serde_json::to_string(&Decision::Accept).unwrap(), "\"ACCEPT\"");
    let parsed: Decision = serde_json::from_str("\"REVIEW\"").unwrap();
    assert_eq!(parsed, Decision::Review);

    let missing = serde_json::to_value(WorldStatus::missing("atlantis")).unwrap();
    assert_eq!(missing["world_id"], "atlantis");
    assert_eq!(missing["exists"], false);
    assert!(missing["accept_distance"].is_null());

    let t = Thresholds { accept_distance: 0.5, review_distance: 0.75, max_distance: 1.0, k: 4 };
    let round: Thresholds = serde_json::from_value(serde_json::to_value(t).unwrap()).unwrap();
    assert_eq!(round, t);
    assert!(t.is_ordered());
    assert!(!Thresholds { review_distance: 0.5, ..t }.is_ordered());
}
