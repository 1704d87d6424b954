#![allow(dead_code)]

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use yolo_ingest::metadata::SqliteStore;
use yolo_ingest::storage::{ObjectStorage, StorageUri};
use yolo_ingest::{IngestSettings, Ingestor};
use zip::write::SimpleFileOptions;

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(*name, options).expect("start zip entry");
        writer.write_all(content).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

pub fn write_file(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, content).expect("write file");
}

pub fn uri(raw: &str) -> StorageUri {
    StorageUri::parse(raw).expect("parse uri")
}

pub async fn put(storage: &ObjectStorage, raw: &str, content: &[u8]) {
    storage
        .put_bytes(&uri(raw), content.to_vec(), None)
        .await
        .expect("seed object");
}

pub async fn keys_under(storage: &ObjectStorage, prefix: &str) -> Vec<String> {
    let mut keys: Vec<String> = storage
        .list(&uri(prefix))
        .await
        .expect("list objects")
        .into_iter()
        .map(|entry| entry.uri.key().to_string())
        .collect();
    keys.sort();
    keys
}

/// In-memory storage and store wired into an ingestor.
pub struct Harness {
    pub storage: Arc<ObjectStorage>,
    pub store: Arc<SqliteStore>,
    pub ingestor: Ingestor,
}

pub fn harness(settings: IngestSettings) -> Harness {
    let storage = Arc::new(ObjectStorage::in_memory());
    let store = Arc::new(SqliteStore::in_memory().expect("open store"));
    let ingestor = Ingestor::new(Arc::clone(&storage), store.clone(), settings).expect("ingestor");
    Harness {
        storage,
        store,
        ingestor,
    }
}
