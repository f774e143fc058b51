use crate::Result;
use crate::backup::remove_artifact_file;
use crate::registry::{BackupRecord, BackupRegistry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// 一次保留期清理的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 标记为无效的记录
    pub expired: Vec<i64>,
    /// 实际删除了文件的记录
    pub removed: Vec<i64>,
    /// 处理失败的记录，下次清理时重试
    pub failed: Vec<i64>,
    /// 仍在处理中而跳过的记录
    pub skipped: Vec<i64>,
}

/// 保留期清理
#[derive(Debug, Clone)]
pub struct RetentionSweeper {
    registry: BackupRegistry,
}

impl RetentionSweeper {
    pub fn new(registry: BackupRegistry) -> Self {
        Self { registry }
    }

    /// 清理 `now` 时刻已过期的有效备份
    ///
    /// 单条记录失败只记录日志，不影响其余记录。
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let candidates = self.registry.find_expired_active(now).await?;
        let mut report = SweepReport::default();

        if candidates.is_empty() {
            debug!("没有过期的备份");
            return Ok(report);
        }
        info!("发现 {} 个过期备份，开始清理", candidates.len());

        for record in candidates {
            let id = record.id;
            if record.status.is_busy() {
                debug!(backup_id = id, status = %record.status, "备份仍在处理中，跳过");
                report.skipped.push(id);
                continue;
            }

            match self.expire(record).await {
                Ok(removed) => {
                    if removed {
                        report.removed.push(id);
                    }
                    report.expired.push(id);
                }
                Err(e) => {
                    warn!(backup_id = id, error = %e, "过期备份清理失败");
                    report.failed.push(id);
                }
            }
        }

        info!(
            expired = report.expired.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "过期备份清理完成"
        );
        Ok(report)
    }

    /// 先标记无效再删除文件；记录已被并发修改时不删除任何文件
    async fn expire(&self, mut record: BackupRecord) -> Result<bool> {
        let status = record.status;
        record.is_active = false;
        self.registry.save(&mut record, status).await?;

        match &record.artifact {
            Some(artifact) => remove_artifact_file(Path::new(&artifact.path)).await,
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BackupArtifact, BackupScope, BackupStatus, BackupType, from_millis, to_millis};
    use chrono::Duration;
    use tempfile::tempdir;

    fn record(now: DateTime<Utc>, status: BackupStatus, expires_in_days: i64) -> BackupRecord {
        BackupRecord {
            id: 0,
            name: "r".to_string(),
            description: None,
            backup_type: BackupType::Automatic,
            status,
            scope: BackupScope::Full,
            tenant_ref: None,
            sub_tenant_ref: None,
            collections: Vec::new(),
            artifact: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error: None,
            metadata: None,
            created_by: None,
            created_at: now - Duration::days(30),
            expires_at: now + Duration::days(expires_in_days),
            is_active: true,
            restored_at: None,
            restored_by: None,
            updated_at: now,
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_sweep_skips_busy_and_tolerates_missing_files() {
        let dir = tempdir().unwrap();
        let registry = BackupRegistry::connect_memory().await.unwrap();
        let now = from_millis(to_millis(Utc::now())).unwrap();

        let file = dir.path().join("backup_app_1.gz");
        std::fs::write(&file, b"x").unwrap();
        let mut with_file = record(now, BackupStatus::Completed, -1);
        with_file.artifact = Some(BackupArtifact {
            path: file.to_string_lossy().to_string(),
            name: "backup_app_1.gz".to_string(),
            size_bytes: 1,
            checksum: "00".to_string(),
        });
        let with_file = registry.insert(&with_file).await.unwrap();

        let mut missing = record(now, BackupStatus::Completed, -2);
        missing.artifact = Some(BackupArtifact {
            path: dir.path().join("already-gone.gz").to_string_lossy().to_string(),
            name: "already-gone.gz".to_string(),
            size_bytes: 1,
            checksum: "00".to_string(),
        });
        let missing = registry.insert(&missing).await.unwrap();

        let busy = registry
            .insert(&record(now, BackupStatus::InProgress, -1))
            .await
            .unwrap();
        let fresh = registry
            .insert(&record(now, BackupStatus::Completed, 5))
            .await
            .unwrap();

        let report = RetentionSweeper::new(registry.clone())
            .sweep(now)
            .await
            .unwrap();

        assert_eq!(report.removed, vec![with_file.id]);
        assert_eq!(report.skipped, vec![busy.id]);
        assert!(report.failed.is_empty());
        let mut expired = report.expired.clone();
        expired.sort();
        assert_eq!(expired, vec![with_file.id, missing.id]);

        assert!(!file.exists());
        assert!(registry.require(fresh.id).await.unwrap().is_active);
        assert!(registry.require(busy.id).await.unwrap().is_active);
        assert!(!registry.require(missing.id).await.unwrap().is_active);
    }
}
