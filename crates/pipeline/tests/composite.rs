//! `GridCompositeProducer`: fetch, compose, upload.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use atelier_core::types::RecordId;
use atelier_imaging::{CompositingError, GridComposer, GridOptions, RasterImage};
use atelier_pipeline::composite::{composite_path, CompositeProducer, GridCompositeProducer};
use common::{items, FakeBlobStore, FakeImageSource};

fn producer(blobs: Arc<FakeBlobStore>) -> GridCompositeProducer {
    let composer = GridComposer::new(GridOptions {
        canvas_width: 300,
        canvas_height: 400,
        padding: 10,
        ..GridOptions::default()
    });
    GridCompositeProducer::new(Arc::new(FakeImageSource), blobs, "composites", composer)
}

#[tokio::test]
async fn uploads_grid_under_signature_path() {
    let blobs = FakeBlobStore::new();
    let owner = RecordId::nil();
    let selection = items(&["shirt", "jeans", "boots"]);

    let result = producer(blobs.clone())
        .produce(owner, &selection)
        .await
        .expect("composite produced");

    assert_eq!(result.selection_signature, "shirt,jeans,boots");
    assert_eq!(result.storage_key, composite_path(owner, "shirt,jeans,boots"));
    assert_eq!(
        result.public_url,
        format!("https://blobs.test/composites/{}", result.storage_key)
    );

    let uploads = blobs.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let (bucket, path, bytes) = &uploads[0];
    assert_eq!(bucket, "composites");
    assert_eq!(path, &result.storage_key);

    let decoded = RasterImage::load(bytes).expect("uploaded bytes are an image");
    assert_eq!((decoded.width(), decoded.height()), (300, 400));
}

#[tokio::test]
async fn unreachable_source_uploads_nothing() {
    let blobs = FakeBlobStore::new();
    let selection = items(&["shirt", "broken"]);

    let result = producer(blobs.clone())
        .produce(RecordId::nil(), &selection)
        .await;

    assert_matches!(result, Err(CompositingError::Fetch { url, .. }) if url.contains("broken"));
    assert!(blobs.uploads.lock().unwrap().is_empty());
}
