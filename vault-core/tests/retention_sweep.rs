mod common;

use chrono::{Duration, Utc};
use common::{SpyExecutor, harness};
use std::path::Path;
use vault_core::backup::{BackupManager, BackupSettings, CreateBackupRequest};
use vault_core::metadata::MetadataCollector;
use vault_core::retention::RetentionSweeper;

#[tokio::test]
async fn test_sweep_expires_exactly_the_expired_records() {
    let h = harness(SpyExecutor::default()).await;

    // 同一登记库上保留期为 1 天的管理器
    let short_lived = BackupManager::new(
        BackupSettings {
            retention_days: 1,
            ..h.manager.settings().clone()
        },
        h.registry.clone(),
        h.executor.clone(),
        MetadataCollector::new(h.collections.clone()),
    )
    .unwrap();

    // N = 3 条在清理时已过期，M = 2 条未过期（保留 7 天）
    let mut expired = Vec::new();
    for i in 0..3 {
        let record = short_lived
            .create_pending(CreateBackupRequest::full(format!("short{i}")), None)
            .await
            .unwrap();
        expired.push(short_lived.process_backup(record.id).await.unwrap());
    }
    let mut fresh = Vec::new();
    for i in 0..2 {
        let record = h
            .manager
            .create_pending(CreateBackupRequest::full(format!("long{i}")), None)
            .await
            .unwrap();
        fresh.push(h.manager.process_backup(record.id).await.unwrap());
    }

    let now = Utc::now() + Duration::days(2);
    // 其中一个文件已被手动删掉
    std::fs::remove_file(&expired[0].artifact.as_ref().unwrap().path).unwrap();

    let report = RetentionSweeper::new(h.registry.clone())
        .sweep(now)
        .await
        .unwrap();

    let mut swept = report.expired.clone();
    swept.sort();
    assert_eq!(swept, expired.iter().map(|r| r.id).collect::<Vec<_>>());
    assert!(report.skipped.is_empty());
    assert_eq!(report.removed.len(), 2);
    assert!(report.failed.is_empty());

    for record in &expired {
        let stored = h.registry.require(record.id).await.unwrap();
        assert!(!stored.is_active);
        assert!(!Path::new(&record.artifact.as_ref().unwrap().path).exists());
    }
    for record in &fresh {
        let stored = h.registry.require(record.id).await.unwrap();
        assert!(stored.is_active);
        assert!(Path::new(&record.artifact.as_ref().unwrap().path).exists());
    }

    // 再次清理没有可处理的记录
    let again = RetentionSweeper::new(h.registry.clone())
        .sweep(now)
        .await
        .unwrap();
    assert!(again.expired.is_empty());
}
