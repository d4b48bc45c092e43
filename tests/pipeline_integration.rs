//! End-to-end ingestion scenarios through the assembled runtime.

use anchor::{AnchorConfig, IngestStatus, Provenance, Runtime, SearchRequest};
use tempfile::TempDir;

fn runtime(dir: &TempDir) -> Runtime {
    Runtime::open(dir.path(), AnchorConfig::default()).expect("open runtime")
}

#[test]
fn non_ascii_roundtrip() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);

    let report = rt
        .ingest(
            "Hello 🌍 World. Test 🚀.".as_bytes(),
            "unicode.md",
            Provenance::Internal,
            vec![],
            vec![],
        )
        .unwrap();
    assert_eq!(report.n_molecules, 2, "two sentences, two molecules");

    let store = rt.store();
    let body = store.compound_body(&report.compound_id).unwrap().unwrap();
    for molecule in store.molecules_for(&report.compound_id).unwrap() {
        let slice = &body[molecule.range.start..molecule.range.end];
        assert_eq!(slice, molecule.content);
        assert!(std::str::from_utf8(slice.as_bytes()).is_ok());
    }

    let response = rt
        .search(SearchRequest {
            query: "World".into(),
            max_chars: Some(8_192),
            ..Default::default()
        })
        .unwrap();
    assert!(!response.results.is_empty(), "search for World must hit");
    let window = &response.results[0];
    assert!(std::str::from_utf8(window.content.as_bytes()).is_ok());
    assert!(window.content.contains('🌍'), "window: {:?}", window.content);
    rt.shutdown();
}

#[test]
fn drift_gate_marks_trailing_newline_variant() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);

    let first = rt
        .ingest(
            b"The cache evicts on LRU.",
            "cache-a.md",
            Provenance::Internal,
            vec![],
            vec![],
        )
        .unwrap();
    let vectors_before = rt.vectors().len();

    let second = rt
        .ingest(
            b"The cache evicts on LRU.\n",
            "cache-b.md",
            Provenance::Internal,
            vec![],
            vec![],
        )
        .unwrap();

    assert_eq!(second.n_variants, 1);
    assert_eq!(
        rt.vectors().len(),
        vectors_before,
        "variants must not grow the vector index"
    );

    let store = rt.store();
    let meta = store.compound_meta(&second.compound_id).unwrap().unwrap();
    assert_eq!(meta.provenance, Provenance::Variant);

    let original = store.molecules_for(&first.compound_id).unwrap();
    let variant = store.molecules_for(&second.compound_id).unwrap();
    assert!(variant[0].vector_id.is_none());
    assert!(original[0].vector_id.is_some());
    let (target, weight) = store
        .variant_target(&variant[0].id)
        .unwrap()
        .expect("is_variant_of edge");
    assert_eq!(target, original[0].id);
    assert!(weight > 0.9);
    rt.shutdown();
}

#[test]
fn bucket_filter_honored_on_radial_path() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);

    let personal = rt
        .ingest(
            b"Zeppelin hangar inventory notes for the week.",
            "a.md",
            Provenance::Internal,
            vec!["personal".into()],
            vec![],
        )
        .unwrap();
    rt.ingest(
        b"Zeppelin hangar inventory notes for the week.",
        "b.md",
        Provenance::Internal,
        vec!["code".into()],
        vec![],
    )
    .unwrap();

    let response = rt
        .search(SearchRequest {
            query: "zeppelin".into(),
            max_chars: Some(10_000),
            buckets: vec!["personal".into()],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].compound_id, personal.compound_id);
    rt.shutdown();
}

#[test]
fn replayed_ingest_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);
    let content = b"Replayed journal entry about the kiln firing schedule.";

    let first = rt
        .ingest(content, "kiln.md", Provenance::Internal, vec![], vec![])
        .unwrap();
    let second = rt
        .ingest(content, "kiln.md", Provenance::Internal, vec![], vec![])
        .unwrap();

    assert_eq!(first.status, IngestStatus::Stored);
    assert_eq!(second.status, IngestStatus::Unchanged);
    assert_eq!(second.n_variants, 0);
    assert_eq!(rt.store().count_compounds().unwrap(), 1);
    assert_eq!(rt.vectors().len(), first.n_molecules);
    rt.shutdown();
}

#[test]
fn oversized_tag_skipped_with_warning() {
    let dir = TempDir::new().unwrap();
    let rt = runtime(&dir);

    let accepted = "t".repeat(255);
    let skipped = "t".repeat(256);
    let report = rt
        .ingest(
            b"Tagged entry about the greenhouse irrigation system.",
            "tags.md",
            Provenance::Internal,
            vec![],
            vec![accepted.clone(), skipped],
        )
        .unwrap();
    assert_eq!(report.warnings.len(), 1, "256-byte tag warns: {:?}", report.warnings);

    // The 255-byte tag is queryable; the 256-byte one is gone.
    let ok = rt
        .search(SearchRequest {
            query: "greenhouse".into(),
            tags: vec![accepted],
            max_chars: Some(4_096),
            ..Default::default()
        })
        .unwrap();
    assert!(!ok.results.is_empty());
    rt.shutdown();
}

#[test]
fn streaming_path_survives_restart() {
    let dir = TempDir::new().unwrap();
    let compound_id;
    let n_molecules;
    {
        let mut config = AnchorConfig::default();
        config.ingest.max_content_bytes = 4 * 1024;
        config.ingest.chunk_bytes = 2 * 1024;
        let rt = Runtime::open(dir.path(), config).unwrap();
        let mut content = String::new();
        for i in 0..120 {
            content.push_str(&format!(
                "Streaming entry {i} documents one distinct idea per paragraph here.\n\n"
            ));
        }
        let report = rt
            .ingest(
                content.as_bytes(),
                "stream.md",
                Provenance::Internal,
                vec![],
                vec![],
            )
            .unwrap();
        compound_id = report.compound_id.clone();
        n_molecules = report.n_molecules;
        assert!(n_molecules >= 100, "got {n_molecules}");
        rt.shutdown();
    }

    let rt = runtime(&dir);
    let molecules = rt.store().molecules_for(&compound_id).unwrap();
    assert_eq!(molecules.len(), n_molecules);
    let body = rt.store().compound_body(&compound_id).unwrap().unwrap();
    for (i, m) in molecules.iter().enumerate() {
        assert_eq!(m.sequence as usize, i);
        assert_eq!(&body[m.range.start..m.range.end], m.content);
    }
    assert_eq!(rt.vectors().len(), n_molecules);
    rt.shutdown();
}
