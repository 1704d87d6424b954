use std::time::Duration;

use yolo_ingest::metadata::MetadataStore;
use yolo_ingest::model::{BoundingBox, DatasetLocation};
use yolo_ingest::source::SourceKind;
use yolo_ingest::{IngestError, IngestRequest, IngestSettings, RunStage};

mod common;

fn pinned(run_id: &str) -> IngestSettings {
    IngestSettings {
        run_id: Some(run_id.to_string()),
        ..IngestSettings::default()
    }
}

async fn seed_cats_zip(storage: &yolo_ingest::storage::ObjectStorage) {
    common::put(
        storage,
        "gs://bucket/cats.zip",
        &common::zip_bytes(&[
            ("images/a.jpg", b"jpeg"),
            ("labels/a.txt", b"0 0.5 0.5 0.25 0.25\n"),
        ]),
    )
    .await;
}

#[tokio::test]
async fn cats_zip_end_to_end() {
    let h = common::harness(pinned("run1"));
    seed_cats_zip(&h.storage).await;

    let request = IngestRequest::from_json(
        r#"{"dataset_name": "cats", "gcs_uri": "gs://bucket/cats.zip", "format": "yolo"}"#,
    )
    .expect("parse request");
    let report = h.ingestor.ingest(&request).await.expect("ingest");

    assert_eq!(report.dataset_name, "cats");
    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].kind, SourceKind::Archive);
    assert_eq!(report.images, 1);
    assert_eq!(report.labeled_images, 1);
    assert_eq!(report.uploaded_files, 2);
    assert_eq!(report.records_written, 1);
    assert_eq!(report.collisions, 0);
    assert_eq!(report.destination, "gs://bucket/datasets/cats/run1/");

    assert_eq!(
        common::keys_under(&h.storage, "gs://bucket/datasets/cats/run1/").await,
        vec![
            "datasets/cats/run1/images/a.jpg",
            "datasets/cats/run1/labels/a.txt",
        ]
    );

    let datasets = h.store.list_datasets().expect("list datasets");
    assert_eq!(datasets.len(), 1);
    assert_eq!(datasets[0].id, report.dataset_id);
    assert_eq!(
        datasets[0].location,
        Some(DatasetLocation::Prefix(
            "gs://bucket/datasets/cats/run1/".to_string()
        ))
    );

    let images = h
        .store
        .list_images(&report.dataset_id, 10, 0)
        .expect("list images");
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].image_path, "images/a.jpg");
    assert_eq!(
        images[0].labels,
        vec![BoundingBox::new(0, 0.5, 0.5, 0.25, 0.25)]
    );
}

#[tokio::test]
async fn reingestion_updates_instead_of_duplicating() {
    let h = common::harness(IngestSettings::default());
    seed_cats_zip(&h.storage).await;
    let request = IngestRequest::new("cats", vec!["gs://bucket/cats.zip".to_string()]);

    let first = h.ingestor.ingest(&request).await.expect("first run");
    let second = h.ingestor.ingest(&request).await.expect("second run");

    assert_eq!(first.dataset_id, second.dataset_id);
    assert_ne!(first.destination, second.destination);
    assert_eq!(h.store.list_datasets().expect("list").len(), 1);
    assert_eq!(h.store.count_images(&first.dataset_id).expect("count"), 1);

    let dataset = h.store.find_dataset("cats").expect("find").expect("present");
    assert_eq!(
        dataset.location.as_ref().map(|location| location.uri()),
        Some(second.destination.as_str())
    );
}

#[tokio::test]
async fn prefix_archive_overrides_loose_file() {
    let h = common::harness(pinned("p"));
    common::put(&h.storage, "gs://bucket/ds/images/a.jpg", b"loose").await;
    common::put(&h.storage, "gs://bucket/ds/README.md", b"ignored").await;
    common::put(
        &h.storage,
        "gs://bucket/ds/bundle.zip",
        &common::zip_bytes(&[
            ("images/a.jpg", b"archived"),
            ("images/b.jpg", b"b"),
            ("labels/a.txt", b"2 0.1 0.2 0.3 0.4\n"),
        ]),
    )
    .await;

    let request = IngestRequest::new("mixed", vec!["gs://bucket/ds/".to_string()]);
    let report = h.ingestor.ingest(&request).await.expect("ingest");

    assert_eq!(report.sources[0].kind, SourceKind::Prefix);
    assert_eq!(report.images, 2);
    assert_eq!(report.labeled_images, 1);
    assert_eq!(report.collisions, 1);
    assert_eq!(report.uploaded_files, 3);

    let keys = common::keys_under(&h.storage, "gs://bucket/datasets/mixed/p/").await;
    assert!(!keys.iter().any(|key| key.ends_with(".zip") || key.ends_with(".md")));
}

#[tokio::test]
async fn prefix_keys_with_reserved_characters_are_ingested_verbatim() {
    let h = common::harness(pinned("k"));
    common::put(&h.storage, "gs://bucket/ds/images/cat#1.jpg", b"cat").await;
    common::put(&h.storage, "gs://bucket/ds/labels/cat#1.txt", b"1 0.5 0.5 0.2 0.2\n").await;
    common::put(&h.storage, "gs://bucket/ds/images/dog.jpg", b"dog").await;

    let request = IngestRequest::new("ds", vec!["gs://bucket/ds/".to_string()]);
    let report = h.ingestor.ingest(&request).await.expect("ingest");

    assert_eq!(report.images, 2);
    assert_eq!(report.labeled_images, 1);
    assert_eq!(report.uploaded_files, 3);
    assert_eq!(
        common::keys_under(&h.storage, "gs://bucket/datasets/ds/k/").await,
        vec![
            "datasets/ds/k/images/cat#1.jpg",
            "datasets/ds/k/images/dog.jpg",
            "datasets/ds/k/labels/cat#1.txt",
        ]
    );

    let images = h.store.list_images(&report.dataset_id, 10, 0).expect("list");
    assert_eq!(images[0].image_path, "images/cat#1.jpg");
    assert_eq!(images[0].labels[0].class_id, 1);
    assert_eq!(images[1].image_path, "images/dog.jpg");
}

#[tokio::test]
async fn dataset_names_are_kept_exactly_as_given() {
    let h = common::harness(IngestSettings::default());
    seed_cats_zip(&h.storage).await;

    let plain = IngestRequest::new("cats", vec!["gs://bucket/cats.zip".to_string()]);
    let padded = IngestRequest::new(" cats", vec!["gs://bucket/cats.zip".to_string()]);
    let first = h.ingestor.ingest(&plain).await.expect("plain name");
    let second = h.ingestor.ingest(&padded).await.expect("padded name");

    assert_ne!(first.dataset_id, second.dataset_id);
    assert_eq!(second.dataset_name, " cats");
    let names: Vec<String> = h
        .store
        .list_datasets()
        .expect("list")
        .into_iter()
        .map(|dataset| dataset.name)
        .collect();
    assert_eq!(names, vec![" cats", "cats"]);
}

#[tokio::test]
async fn later_sources_win_on_merge() {
    let h = common::harness(pinned("m"));
    common::put(
        &h.storage,
        "gs://bucket/one.zip",
        &common::zip_bytes(&[
            ("images/a.jpg", b"one"),
            ("labels/a.txt", b"0 0.5 0.5 0.5 0.5\n"),
        ]),
    )
    .await;
    common::put(&h.storage, "gs://bucket/two/images/a.jpg", b"two").await;
    common::put(&h.storage, "gs://bucket/two/labels/a.txt", b"5 0.1 0.1 0.1 0.1\n").await;
    common::put(&h.storage, "gs://bucket/two/images/c.png", b"c").await;

    let request = IngestRequest::from_json(
        r#"{"dataset_name": "merged", "gcs_uris": ["gs://bucket/one.zip", "gs://bucket/two/"]}"#,
    )
    .expect("parse request");
    let report = h.ingestor.ingest(&request).await.expect("ingest");

    assert_eq!(report.sources.len(), 2);
    assert_eq!(report.collisions, 2);
    assert_eq!(report.images, 2);

    let images = h.store.list_images(&report.dataset_id, 10, 0).expect("list");
    assert_eq!(images[0].image_path, "images/a.jpg");
    assert_eq!(images[0].labels[0].class_id, 5);
    assert_eq!(images[1].image_path, "images/c.png");
    assert!(images[1].labels.is_empty());
}

#[tokio::test]
async fn single_object_is_staged_under_images() {
    let h = common::harness(IngestSettings {
        destination_bucket: Some("staged".to_string()),
        ..pinned("s")
    });
    common::put(&h.storage, "gs://raw/photos/photo.jpg", b"jpeg").await;

    let request = IngestRequest::new("Photo Set!", vec!["gs://raw/photos/photo.jpg".to_string()]);
    let report = h.ingestor.ingest(&request).await.expect("ingest");

    assert_eq!(report.sources[0].kind, SourceKind::Object);
    assert_eq!(report.destination, "gs://staged/datasets/Photo-Set/s/");
    assert_eq!(
        common::keys_under(&h.storage, "gs://staged/datasets/").await,
        vec!["datasets/Photo-Set/s/images/photo.jpg"]
    );
    assert_eq!(report.records_written, 1);
}

#[tokio::test]
async fn small_chunks_still_write_every_image() {
    let h = common::harness(IngestSettings {
        chunk_size: 2,
        ..pinned("c")
    });
    let entries: Vec<(String, Vec<u8>)> = (0..5)
        .map(|idx| (format!("images/{idx}.jpg"), b"img".to_vec()))
        .collect();
    let refs: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(name, content)| (name.as_str(), content.as_slice()))
        .collect();
    common::put(&h.storage, "gs://bucket/five.zip", &common::zip_bytes(&refs)).await;

    let request = IngestRequest::new("five", vec!["gs://bucket/five.zip".to_string()]);
    let report = h.ingestor.ingest(&request).await.expect("ingest");
    assert_eq!(report.records_written, 5);
    assert_eq!(h.store.count_images(&report.dataset_id).expect("count"), 5);
}

#[tokio::test]
async fn invalid_requests_fail_before_any_io() {
    let h = common::harness(IngestSettings::default());
    seed_cats_zip(&h.storage).await;

    let request = IngestRequest {
        format: "coco".to_string(),
        ..IngestRequest::new("cats", vec!["gs://bucket/cats.zip".to_string()])
    };
    let err = h.ingestor.ingest(&request).await.unwrap_err();
    assert!(matches!(err, IngestError::UnsupportedFormat(_)));
    assert!(err.is_input_error());

    let request = IngestRequest::new("cats", vec!["gs://bucket/cats.zip".into(), "nope".into()]);
    let err = h.ingestor.ingest(&request).await.unwrap_err();
    assert!(matches!(err, IngestError::InvalidUri { .. }));

    assert!(h.store.list_datasets().expect("list").is_empty());
    assert!(common::keys_under(&h.storage, "gs://bucket/datasets/").await.is_empty());
}

#[tokio::test]
async fn missing_source_fails_during_acquisition() {
    let h = common::harness(IngestSettings::default());
    let request = IngestRequest::new("ghost", vec!["gs://bucket/ghost.zip".to_string()]);

    let err = h.ingestor.ingest(&request).await.unwrap_err();
    match err {
        IngestError::RunFailed {
            stage,
            dataset,
            uris,
            source,
        } => {
            assert_eq!(stage, RunStage::Acquiring);
            assert_eq!(dataset, "ghost");
            assert_eq!(uris, vec!["gs://bucket/ghost.zip"]);
            assert!(matches!(*source, IngestError::SourceNotFound { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.store.find_dataset("ghost").expect("find").is_none());
}

#[tokio::test]
async fn expired_timeout_is_reported_as_run_failure() {
    let h = common::harness(IngestSettings::default());
    seed_cats_zip(&h.storage).await;
    let request = IngestRequest::new("cats", vec!["gs://bucket/cats.zip".to_string()]);

    let err = h
        .ingestor
        .run_with_timeout(&request, Duration::ZERO)
        .await
        .unwrap_err();
    match err {
        IngestError::RunFailed { source, .. } => {
            assert!(matches!(*source, IngestError::Timeout { seconds: 0 }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.store.find_dataset("cats").expect("find").is_none());
}
