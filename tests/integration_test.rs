//! Integration tests for dishmatch.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]

use dishmatch::storage::{ArtifactStore, InMemoryArtifactStore};
use dishmatch::{
    ArtifactRef, ColorHistogramExtractor, Error, FilesystemArtifactStore, RecognitionService,
    TemplateStore, classify,
};
use std::sync::Arc;
use tempfile::TempDir;

fn memory_store(dir: &TempDir) -> TemplateStore {
    TemplateStore::open(
        dir.path().join("templates.json"),
        Arc::new(InMemoryArtifactStore::new()),
        None,
    )
    .expect("open store")
}

fn png(rgb: [u8; 3]) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::from_pixel(8, 8, image::Rgb(rgb))
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}

#[test]
fn test_error_types() {
    let err = Error::InvalidInput("test message".to_string());
    let display = format!("{err}");
    assert!(display.contains("invalid input"));
    assert!(display.contains("test message"));

    let err = Error::PersistFailed {
        operation: "write_templates".to_string(),
        cause: "disk full".to_string(),
    };
    let display = format!("{err}");
    assert!(display.contains("write_templates"));
    assert!(display.contains("disk full"));

    let err = Error::CategoryNotFound("cake".to_string());
    assert!(err.to_string().contains("cake"));
}

#[test]
fn test_save_then_load_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let store = memory_store(&dir);

    store
        .add("apple", vec![1.0, 0.0, 0.0], ArtifactRef::new("apple/1.jpg"))
        .expect("add");
    store
        .add("apple", vec![0.9, 0.1, 0.0], ArtifactRef::new("apple/2.jpg"))
        .expect("add");
    store
        .add("banana", vec![0.1, 0.2, 0.3], ArtifactRef::new("banana/1.jpg"))
        .expect("add");

    let query = [0.7, 0.2, 0.1];
    let before = classify(&query, &store.snapshot(), -1.0, 10).expect("classify");

    let reopened = memory_store(&dir);
    assert_eq!(reopened.list_all(), store.list_all());
    assert_eq!(reopened.dimensions(), Some(3));

    let after = classify(&query, &reopened.snapshot(), -1.0, 10).expect("classify");
    assert_eq!(before, after);
}

#[test]
fn test_persisted_document_layout() {
    let dir = TempDir::new().expect("tempdir");
    let store = memory_store(&dir);
    store
        .add("apple", vec![0.5, 0.5], ArtifactRef::new("apple/1.jpg"))
        .expect("add");

    let raw = std::fs::read(dir.path().join("templates.json")).expect("read");
    let doc: serde_json::Value = serde_json::from_slice(&raw).expect("json");

    assert_eq!(doc["version"], 1);
    assert_eq!(doc["dimensions"], 2);
    assert_eq!(doc["categories"]["apple"][0]["artifact"], "apple/1.jpg");
    assert_eq!(doc["categories"]["apple"][0]["embedding"][1], 0.5);
}

#[test]
fn test_corrupt_document_fails_open() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("templates.json"), b"{\"version\": 1, \"categories\": ")
        .expect("write");

    let result = TemplateStore::open(
        dir.path().join("templates.json"),
        Arc::new(InMemoryArtifactStore::new()),
        None,
    );
    assert!(matches!(result, Err(Error::CorruptPersistedState { .. })));
}

#[test]
fn test_rejected_add_leaves_document_untouched() {
    let dir = TempDir::new().expect("tempdir");
    let store = memory_store(&dir);
    store
        .add("apple", vec![1.0, 0.0, 0.0], ArtifactRef::new("apple/1.jpg"))
        .expect("add");
    let path = dir.path().join("templates.json");
    let before = std::fs::read(&path).expect("read");

    let result = store.add("banana", vec![1.0, 0.0], ArtifactRef::new("banana/1.jpg"));
    assert!(matches!(
        result,
        Err(Error::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert_eq!(std::fs::read(&path).expect("read"), before);
    assert!(store.snapshot().get("banana").is_none());
}

#[test]
fn test_snapshot_is_isolated_from_later_mutations() {
    let dir = TempDir::new().expect("tempdir");
    let store = memory_store(&dir);
    store
        .add("apple", vec![1.0, 0.0], ArtifactRef::new("apple/1.jpg"))
        .expect("add");

    let snapshot = store.snapshot();
    store
        .add("apple", vec![0.0, 1.0], ArtifactRef::new("apple/2.jpg"))
        .expect("add");
    store.delete_category("apple").expect("delete");

    assert_eq!(snapshot.get("apple").map(<[_]>::len), Some(1));
    assert!(store.snapshot().is_empty());
}

#[test]
fn test_concurrent_adds_all_land() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;

    let dir = TempDir::new().expect("tempdir");
    let store = memory_store(&dir);

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let store = &store;
            scope.spawn(move || {
                for i in 0..PER_THREAD {
                    let category = format!("dish-{}", t % 3);
                    let embedding = vec![1.0, t as f32, i as f32];
                    let artifact = ArtifactRef::new(format!("{category}/{t}-{i}.jpg"));
                    store.add(&category, embedding, artifact).expect("add");
                }
            });
        }
    });

    let snapshot = store.snapshot();
    assert_eq!(snapshot.entry_count(), THREADS * PER_THREAD);
    assert_eq!(snapshot.category_count(), 3);

    let reopened = memory_store(&dir);
    assert_eq!(reopened.list_all(), store.list_all());
}

#[test]
fn test_readers_never_see_partial_state() {
    let dir = TempDir::new().expect("tempdir");
    let store = memory_store(&dir);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..50 {
                store
                    .add("soup", vec![1.0, 0.0], ArtifactRef::new(format!("soup/{i}.jpg")))
                    .expect("add");
            }
        });
        scope.spawn(|| {
            for _ in 0..200 {
                let snapshot = store.snapshot();
                let total: usize = snapshot.categories().values().map(Vec::len).sum();
                assert_eq!(total, snapshot.entry_count());
                assert!(snapshot.categories().values().all(|entries| !entries.is_empty()));
            }
        });
    });
}

#[test]
fn test_service_end_to_end_with_filesystem_artifacts() {
    let dir = TempDir::new().expect("tempdir");
    let artifacts = Arc::new(FilesystemArtifactStore::new(dir.path().join("templates")));
    let store = TemplateStore::open(dir.path().join("templates.json"), artifacts.clone(), None)
        .expect("open");
    let service = RecognitionService::new(
        Arc::new(store),
        Arc::new(ColorHistogramExtractor::default()),
        0.7,
    )
    .expect("service");

    service.enroll("tomato soup", &png([200, 30, 20]), "png").expect("enroll");
    service.enroll("tomato soup", &png([210, 25, 25]), "png").expect("enroll");
    service.enroll("pea soup", &png([90, 180, 40]), "png").expect("enroll");

    let listing = service.list_categories();
    assert_eq!(listing["tomato soup"].len(), 2);
    let image_path = artifacts
        .resolve(&listing["pea soup"][0].artifact)
        .expect("resolve");
    assert!(image_path.is_file());
    assert_eq!(std::fs::read(&image_path).expect("read"), png([90, 180, 40]));

    let matches = service.classify(&png([200, 30, 20]), 0.7, 3).expect("classify");
    assert_eq!(matches.first().map(|m| m.category.as_str()), Some("tomato soup"));
    assert!(matches.iter().all(|m| m.score >= 0.7));

    assert_eq!(service.delete_category("pea soup").expect("delete"), 1);
    assert!(!image_path.exists());
    assert!(!dir.path().join("templates").join("pea soup").exists());

    let result = service.delete_category("pea soup");
    assert!(matches!(result, Err(Error::CategoryNotFound(_))));
}

#[test]
fn test_delete_entry_keeps_sibling_artifacts() {
    let dir = TempDir::new().expect("tempdir");
    let artifacts = Arc::new(InMemoryArtifactStore::new());
    let store =
        TemplateStore::open(dir.path().join("templates.json"), artifacts.clone(), None).expect("open");

    let first = artifacts.save("rice", b"a", "jpg").expect("save");
    let second = artifacts.save("rice", b"b", "jpg").expect("save");
    store.add("rice", vec![1.0, 0.0], first.clone()).expect("add");
    store.add("rice", vec![0.0, 1.0], second.clone()).expect("add");

    assert_eq!(store.delete_entry("rice", &first).expect("delete"), 1);
    assert!(!artifacts.contains(&first));
    assert!(artifacts.contains(&second));

    let missing = store.delete_entry("rice", &first);
    assert!(matches!(missing, Err(Error::EntryNotFound { .. })));
}

#[test]
fn test_enroll_and_delete_of_one_category_interleave_safely() {
    let dir = TempDir::new().expect("tempdir");
    let artifacts = Arc::new(FilesystemArtifactStore::new(dir.path().join("templates")));
    let store = TemplateStore::open(dir.path().join("templates.json"), artifacts.clone(), None)
        .expect("open");
    let service = RecognitionService::new(
        Arc::new(store),
        Arc::new(ColorHistogramExtractor::new(2).expect("bins")),
        0.7,
    )
    .expect("service");
    let image = png([200, 30, 20]);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..200 {
                service.enroll("soup", &image, "png").expect("enroll");
            }
        });
        scope.spawn(|| {
            for _ in 0..200 {
                match service.delete_category("soup") {
                    Ok(_) | Err(Error::CategoryNotFound(_)) => {},
                    Err(e) => panic!("delete failed: {e}"),
                }
            }
        });
    });

    // Every surviving entry still has its image on disk.
    for entry in service.list_categories().values().flatten() {
        let path = artifacts.resolve(&entry.artifact).expect("resolve");
        assert!(path.is_file(), "missing image {}", path.display());
    }
}

#[test]
fn test_direct_saves_survive_concurrent_category_deletes() {
    let dir = TempDir::new().expect("tempdir");
    let artifacts = Arc::new(FilesystemArtifactStore::new(dir.path().join("templates")));
    let store = TemplateStore::open(dir.path().join("templates.json"), artifacts.clone(), None)
        .expect("open");

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..300 {
                store
                    .add("soup", vec![1.0, 0.0], ArtifactRef::new(format!("soup/{i}.jpg")))
                    .expect("add");
                store.delete_category("soup").expect("delete");
            }
        });
        scope.spawn(|| {
            for _ in 0..300 {
                let saved = artifacts.save("soup", b"img", "jpg").expect("save");
                artifacts.remove(&saved).expect("remove");
            }
        });
    });
}
