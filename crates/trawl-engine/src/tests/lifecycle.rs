//! Delete, list, verify/repair, and health through the engine surface.

use trawl_repair::RepairEngine;
use trawl_types::ServerId;

use crate::tests::helpers::{file_bytes, harness, MIB};

#[tokio::test]
async fn test_delete_removes_replicas_and_manifests() {
    let h = harness(3, 3, MIB);
    let input = h.write_input("in", &file_bytes(2 * MIB + 50)).await;
    h.engine.upload(&input, "doc").await.unwrap();
    assert!(h.stores.iter().all(|s| s.file_count() > 0));

    h.engine.delete("doc").await.unwrap();
    for store in &h.stores {
        assert_eq!(store.file_count(), 0, "server still holds data after delete");
    }
}

#[tokio::test]
async fn test_delete_tolerates_dead_server() {
    let h = harness(3, 3, MIB);
    let input = h.write_input("in", &file_bytes(MIB)).await;
    h.engine.upload(&input, "doc").await.unwrap();

    h.stores[0].set_offline(true);
    h.engine.delete("doc").await.unwrap();

    assert_eq!(h.stores[1].file_count(), 0);
    assert_eq!(h.stores[2].file_count(), 0);
    // The dead server keeps its orphans until a later repair/delete.
    h.stores[0].set_offline(false);
    assert!(h.stores[0].file_count() > 0);
}

#[tokio::test]
async fn test_list_unions_across_servers() {
    let h = harness(3, 2, MIB);
    let a = h.write_input("a", &file_bytes(MIB)).await;
    let b = h.write_input("b", &file_bytes(MIB + 1)).await;
    h.engine.upload(&a, "alpha").await.unwrap();
    h.engine.upload(&b, "beta").await.unwrap();

    h.stores[2].set_offline(true);
    let manifests = h.engine.list().await.unwrap();
    let mut names: Vec<_> = manifests
        .iter()
        .map(|m| m.original_filename.clone())
        .collect();
    names.sort();
    assert_eq!(names, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_verify_then_repair_corrupted_replica() {
    let h = harness(3, 3, MIB);
    let input = h.write_input("in", &file_bytes(2 * MIB)).await;
    h.engine.upload(&input, "doc").await.unwrap();

    let manifest = RepairEngine::new(h.pool.clone())
        .fetch_manifest("doc")
        .await
        .unwrap();
    let target = manifest.chunks[1]
        .location_on(&ServerId::from("s1"))
        .unwrap()
        .remote_path
        .clone();
    h.stores[0].corrupt(&target, 3);

    // Plain verify observes the damage without touching it.
    let stats = h.engine.verify("doc", false).await.unwrap();
    assert_eq!(stats.chunks_verified, 2);
    assert_eq!(stats.chunks_degraded, 1);
    assert_eq!(stats.replicas_removed, 0);

    // Repair removes the bad replica and refills.
    let stats = h.engine.verify("doc", true).await.unwrap();
    assert_eq!(stats.replicas_removed, 1);
    assert_eq!(stats.replicas_added, 1);
    assert_eq!(stats.chunks_repaired, 1);

    let stats = h.engine.verify("doc", false).await.unwrap();
    assert_eq!(stats.chunks_healthy, 2);
}

#[tokio::test]
async fn test_verify_classifies_critical_when_one_server_remains() {
    let h = harness(3, 3, MIB);
    let input = h.write_input("in", &file_bytes(2 * MIB + 7)).await;
    h.engine.upload(&input, "doc").await.unwrap();

    // Two of three servers vanish; no data is lost.
    h.stores[0].set_offline(true);
    h.stores[1].set_offline(true);

    let stats = h.engine.verify("doc", false).await.unwrap();
    assert_eq!(stats.chunks_verified, 3);
    assert_eq!(stats.chunks_critical, 3);
    assert_eq!(stats.chunks_lost, 0);
}

#[tokio::test]
async fn test_health_check_counts() {
    let h = harness(3, 2, MIB);
    h.stores[1].set_offline(true);

    let (healthy, total) = h.engine.health_check().await;
    assert_eq!((healthy, total), (2, 3));
}

#[tokio::test]
async fn test_rebalance_through_engine() {
    let h = harness(3, 2, MIB);
    let input = h.write_input("in", &file_bytes(4 * MIB)).await;

    // Take s3 down during upload so everything lands on s1/s2.
    h.stores[2].set_offline(true);
    h.engine.upload(&input, "doc").await.unwrap();
    h.stores[2].set_offline(false);
    // Let the registry learn that s3 is back.
    h.pool.ping_all().await;

    let moves = h.engine.rebalance("doc").await.unwrap();
    assert!(moves > 0);

    let manifest = RepairEngine::new(h.pool.clone())
        .fetch_manifest("doc")
        .await
        .unwrap();
    assert!(manifest
        .chunks
        .iter()
        .any(|c| c.has_location(&ServerId::from("s3"))));
    for chunk in &manifest.chunks {
        assert!(chunk.locations.len() >= 2);
    }
}

#[tokio::test]
async fn test_system_health_through_engine() {
    let h = harness(3, 3, MIB);
    let input = h.write_input("in", &file_bytes(MIB)).await;
    h.engine.upload(&input, "doc").await.unwrap();

    let health = h.engine.system_health().await.unwrap();
    assert_eq!(health.total_files, 1);
    assert_eq!(health.healthy_files, 1);
}
