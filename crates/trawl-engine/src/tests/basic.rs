//! Upload/download fundamentals.

use trawl_cas::CasError;
use trawl_repair::RepairEngine;

use crate::tests::helpers::{file_bytes, harness, MIB};
use crate::EngineError;

#[tokio::test]
async fn test_upload_shape_three_servers() {
    // 10 485 760 bytes at 4 MiB chunks with factor 3 over 3 servers.
    let h = harness(3, 3, 4 * MIB);
    let data = file_bytes(10 * MIB);
    let input = h.write_input("input.bin", &data).await;

    let stats = h.engine.upload(&input, "big.bin").await.unwrap();
    assert_eq!(stats.chunks_processed, 3);
    assert_eq!(stats.bytes_processed, 10 * MIB);
    assert_eq!(stats.servers_used, 3);

    let manifest = RepairEngine::new(h.pool.clone())
        .fetch_manifest("big.bin")
        .await
        .unwrap();
    assert_eq!(manifest.chunk_count, 3);
    assert_eq!(manifest.total_size, 10 * MIB);

    let sizes: Vec<u64> = manifest.chunks.iter().map(|c| c.size).collect();
    assert_eq!(sizes, vec![4 * MIB, 4 * MIB, 2 * MIB]);
    assert_eq!(sizes.iter().sum::<u64>(), 10 * MIB);

    for chunk in &manifest.chunks {
        assert_eq!(chunk.locations.len(), 3);
        let mut servers: Vec<_> = chunk
            .locations
            .iter()
            .map(|l| l.server_id.as_str().to_string())
            .collect();
        servers.sort();
        servers.dedup();
        assert_eq!(servers.len(), 3, "replica servers must be distinct");
    }
}

#[tokio::test]
async fn test_round_trip() {
    let h = harness(3, 2, MIB);
    let data = file_bytes(2 * MIB + 4321);
    let input = h.write_input("in.dat", &data).await;

    h.engine.upload(&input, "doc").await.unwrap();

    let out = h.out_path("out.dat");
    let stats = h.engine.download("doc", &out).await.unwrap();
    assert_eq!(stats.bytes_processed, data.len() as u64);

    let round_tripped = tokio::fs::read(&out).await.unwrap();
    assert_eq!(round_tripped, data);
}

#[tokio::test]
async fn test_single_short_chunk_round_trip() {
    let h = harness(2, 2, MIB);
    let data = file_bytes(1234);
    let input = h.write_input("small", &data).await;

    h.engine.upload(&input, "small").await.unwrap();
    let out = h.out_path("small.out");
    h.engine.download("small", &out).await.unwrap();
    assert_eq!(tokio::fs::read(&out).await.unwrap(), data);
}

#[tokio::test]
async fn test_zero_byte_file_rejected() {
    let h = harness(3, 3, MIB);
    let input = h.write_input("empty", b"").await;

    let err = h.engine.upload(&input, "empty").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Cas(CasError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_missing_local_file() {
    let h = harness(3, 3, MIB);
    let err = h
        .engine
        .upload(&h.dir.path().join("absent"), "x")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cas(CasError::FileNotFound(_))));
}

#[tokio::test]
async fn test_upload_writes_manifest_to_every_server() {
    let h = harness(3, 3, MIB);
    let input = h.write_input("in", &file_bytes(MIB)).await;
    h.engine.upload(&input, "doc").await.unwrap();

    for store in &h.stores {
        assert!(store.raw("manifests/doc.manifest").is_some());
    }
}

#[tokio::test]
async fn test_local_manifest_cache() {
    let h = harness(2, 2, MIB);
    let cache_dir = h.dir.path().join("manifests");
    let engine = crate::TrawlEngine::new(
        h.pool.clone(),
        crate::EngineConfig {
            chunk_size: MIB,
            replication_factor: 2,
            always_verify_integrity: true,
        },
    )
    .with_local_manifests(
        trawl_manifest::ManifestStore::open(&cache_dir).await.unwrap(),
    );

    let input = h.write_input("in", &file_bytes(MIB + 1)).await;
    engine.upload(&input, "doc").await.unwrap();
    assert!(cache_dir.join("doc.manifest").exists());

    engine.delete("doc").await.unwrap();
    assert!(!cache_dir.join("doc.manifest").exists());
}

#[tokio::test]
async fn test_download_unknown_file() {
    let h = harness(2, 2, MIB);
    let err = h
        .engine
        .download("ghost", &h.out_path("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Repair(_)));
}
