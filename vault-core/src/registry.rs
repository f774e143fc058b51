//! 备份登记库
//!
//! 对 `db` 模块中的行结构做类型化包装，并在写入边界上约束状态机只能向前迁移。

use crate::db::{BackupRow, DuckDbManager};
use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// 备份类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    Manual,
    Automatic,
    Scheduled,
}

/// 备份状态
///
/// pending → in_progress → {completed, failed}；completed → restoring → {restored, failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Restoring,
    Restored,
}

/// 备份作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupScope {
    Full,
    Tenant,
    SubTenant,
    Collections,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Manual => "manual",
            BackupType::Automatic => "automatic",
            BackupType::Scheduled => "scheduled",
        }
    }
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::InProgress => "in_progress",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
            BackupStatus::Restoring => "restoring",
            BackupStatus::Restored => "restored",
        }
    }

    /// 状态机是否允许从当前状态迁移到 `next`
    ///
    /// pending → failed 只用于进程中断后的记录回收。
    pub fn can_transition_to(&self, next: BackupStatus) -> bool {
        use BackupStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Failed)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Completed, Restoring)
                | (Restoring, Restored)
                | (Restoring, Failed)
        )
    }

    /// 是否有任务正在处理该记录
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            BackupStatus::Pending | BackupStatus::InProgress | BackupStatus::Restoring
        )
    }

    /// 该状态下是否应持有备份文件
    pub fn holds_artifact(&self) -> bool {
        matches!(self, BackupStatus::Completed | BackupStatus::Restored)
    }
}

impl BackupScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupScope::Full => "full",
            BackupScope::Tenant => "tenant",
            BackupScope::SubTenant => "sub_tenant",
            BackupScope::Collections => "collections",
        }
    }
}

macro_rules! impl_str_enum {
    ($ty:ident, $label:literal, [$($variant:ident),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = VaultError;

            fn from_str(s: &str) -> Result<Self> {
                $(
                    if s == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err(VaultError::validation(format!("未知的{}: {}", $label, s)))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_str_enum!(BackupType, "备份类型", [Manual, Automatic, Scheduled]);
impl_str_enum!(
    BackupStatus,
    "备份状态",
    [Pending, InProgress, Completed, Failed, Restoring, Restored]
);
impl_str_enum!(BackupScope, "备份作用域", [Full, Tenant, SubTenant, Collections]);

/// 单个集合的记录数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCount {
    pub name: String,
    pub count: u64,
}

/// 备份元数据（仅供参考，不参与恢复）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub collections: Vec<CollectionCount>,
    pub total_records: u64,
}

/// 备份文件信息，路径与校验和总是同时存在
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub path: String,
    pub name: String,
    pub size_bytes: u64,
    /// SHA-256 十六进制摘要
    pub checksum: String,
}

/// 备份记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub backup_type: BackupType,
    pub status: BackupStatus,
    pub scope: BackupScope,
    pub tenant_ref: Option<String>,
    pub sub_tenant_ref: Option<String>,
    pub collections: Vec<String>,
    pub artifact: Option<BackupArtifact>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub metadata: Option<BackupMetadata>,
    /// 为空表示系统创建
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub restored_at: Option<DateTime<Utc>>,
    pub restored_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// 乐观锁版本号，每次保存递增
    #[serde(default)]
    pub version: i64,
}

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| VaultError::custom(format!("无效的时间戳: {millis}")))
}

fn from_millis_opt(millis: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    millis.map(from_millis).transpose()
}

impl BackupRecord {
    fn to_row(&self) -> Result<BackupRow> {
        let (artifact_path, artifact_name, size_bytes, checksum) = match &self.artifact {
            Some(artifact) => (
                Some(artifact.path.clone()),
                Some(artifact.name.clone()),
                Some(artifact.size_bytes as i64),
                Some(artifact.checksum.clone()),
            ),
            None => (None, None, None, None),
        };

        Ok(BackupRow {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            backup_type: self.backup_type.as_str().to_string(),
            status: self.status.as_str().to_string(),
            scope: self.scope.as_str().to_string(),
            tenant_ref: self.tenant_ref.clone(),
            sub_tenant_ref: self.sub_tenant_ref.clone(),
            collections: serde_json::to_string(&self.collections)?,
            artifact_path,
            artifact_name,
            size_bytes,
            checksum,
            started_at: self.started_at.map(to_millis),
            completed_at: self.completed_at.map(to_millis),
            duration_ms: self.duration_ms,
            error: self.error.clone(),
            metadata: self
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            created_by: self.created_by.clone(),
            created_at: to_millis(self.created_at),
            expires_at: to_millis(self.expires_at),
            is_active: self.is_active,
            restored_at: self.restored_at.map(to_millis),
            restored_by: self.restored_by.clone(),
            updated_at: to_millis(self.updated_at),
            version: self.version,
        })
    }
}

impl TryFrom<BackupRow> for BackupRecord {
    type Error = VaultError;

    fn try_from(row: BackupRow) -> Result<Self> {
        let artifact = match (row.artifact_path, row.checksum) {
            (Some(path), Some(checksum)) => Some(BackupArtifact {
                name: row.artifact_name.unwrap_or_else(|| {
                    Path::new(&path)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default()
                }),
                path,
                size_bytes: row.size_bytes.unwrap_or_default().max(0) as u64,
                checksum,
            }),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            name: row.name,
            description: row.description,
            backup_type: row.backup_type.parse()?,
            status: row.status.parse()?,
            scope: row.scope.parse()?,
            tenant_ref: row.tenant_ref,
            sub_tenant_ref: row.sub_tenant_ref,
            collections: serde_json::from_str(&row.collections)?,
            artifact,
            started_at: from_millis_opt(row.started_at)?,
            completed_at: from_millis_opt(row.completed_at)?,
            duration_ms: row.duration_ms,
            error: row.error,
            metadata: row
                .metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_by: row.created_by,
            created_at: from_millis(row.created_at)?,
            expires_at: from_millis(row.expires_at)?,
            is_active: row.is_active,
            restored_at: from_millis_opt(row.restored_at)?,
            restored_by: row.restored_by,
            updated_at: from_millis(row.updated_at)?,
            version: row.version,
        })
    }
}

/// 备份登记库 - 备份记录的持久化存储
#[derive(Debug, Clone)]
pub struct BackupRegistry {
    manager: DuckDbManager,
}

impl BackupRegistry {
    /// 连接到数据库文件
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let manager = DuckDbManager::new(db_path).await?;
        Ok(Self { manager })
    }

    /// 连接到内存数据库 (主要用于测试)
    pub async fn connect_memory() -> Result<Self> {
        let manager = DuckDbManager::new_memory().await?;
        Ok(Self { manager })
    }

    /// 插入新记录，返回带数据库ID的记录
    pub async fn insert(&self, record: &BackupRecord) -> Result<BackupRecord> {
        let id = self.manager.insert_backup(record.to_row()?).await?;
        let mut inserted = record.clone();
        inserted.id = id;
        inserted.version = 0;
        Ok(inserted)
    }

    /// 根据 ID 获取备份记录
    pub async fn get(&self, id: i64) -> Result<Option<BackupRecord>> {
        self.manager
            .get_backup_by_id(id)
            .await?
            .map(BackupRecord::try_from)
            .transpose()
    }

    /// 根据 ID 获取备份记录，不存在时返回 NotFound
    pub async fn require(&self, id: i64) -> Result<BackupRecord> {
        self.get(id)
            .await?
            .ok_or_else(|| VaultError::not_found(format!("备份记录不存在: {id}")))
    }

    /// 获取备份记录列表（按创建时间倒序）
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<BackupRecord>> {
        self.manager
            .list_backups(include_inactive)
            .await?
            .into_iter()
            .map(BackupRecord::try_from)
            .collect()
    }

    /// 保存记录
    ///
    /// 仅当库中状态仍为 `expected` 且版本号与 `record` 读取时一致时写入；
    /// 新状态必须与 `expected` 相同或是其合法后继。成功后 `record` 的版本号与更新时间同步为库中的值。
    pub async fn save(&self, record: &mut BackupRecord, expected: BackupStatus) -> Result<()> {
        if record.status != expected && !expected.can_transition_to(record.status) {
            return Err(VaultError::precondition(format!(
                "备份 {} 不允许从 {} 迁移到 {}",
                record.id, expected, record.status
            )));
        }

        let updated_at = from_millis(to_millis(Utc::now()))?;
        let mut row = record.to_row()?;
        row.updated_at = to_millis(updated_at);

        if self.manager.update_backup(row, expected.as_str()).await? {
            record.updated_at = updated_at;
            record.version += 1;
            Ok(())
        } else {
            Err(VaultError::precondition(format!(
                "备份 {} 已被并发修改（期望状态 {}），请重新读取后再试",
                record.id, expected
            )))
        }
    }

    /// 获取 `now` 时刻已过期且仍有效的记录
    pub async fn find_expired_active(&self, now: DateTime<Utc>) -> Result<Vec<BackupRecord>> {
        self.manager
            .find_expired_active(to_millis(now))
            .await?
            .into_iter()
            .map(BackupRecord::try_from)
            .collect()
    }

    /// 获取处于指定状态的记录
    pub async fn find_by_statuses(&self, statuses: &[BackupStatus]) -> Result<Vec<BackupRecord>> {
        let statuses = statuses.iter().map(|s| s.as_str().to_string()).collect();
        self.manager
            .find_by_statuses(statuses)
            .await?
            .into_iter()
            .map(BackupRecord::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_record(now: DateTime<Utc>) -> BackupRecord {
        BackupRecord {
            id: 0,
            name: "nightly".to_string(),
            description: None,
            backup_type: BackupType::Manual,
            status: BackupStatus::Pending,
            scope: BackupScope::Collections,
            tenant_ref: None,
            sub_tenant_ref: None,
            collections: vec!["users".to_string(), "orders".to_string()],
            artifact: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error: None,
            metadata: None,
            created_by: Some("alice".to_string()),
            created_at: now,
            expires_at: now + Duration::days(7),
            is_active: true,
            restored_at: None,
            restored_by: None,
            updated_at: now,
            version: 0,
        }
    }

    fn truncate_millis(time: DateTime<Utc>) -> DateTime<Utc> {
        from_millis(to_millis(time)).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_preserves_fields() {
        let registry = BackupRegistry::connect_memory().await.unwrap();
        let now = truncate_millis(Utc::now());

        let inserted = registry.insert(&pending_record(now)).await.unwrap();
        assert!(inserted.id > 0);

        let loaded = registry.require(inserted.id).await.unwrap();
        assert_eq!(loaded, inserted);
        assert_eq!(loaded.collections, vec!["users", "orders"]);
        assert_eq!(loaded.expires_at - loaded.created_at, Duration::days(7));
    }

    #[tokio::test]
    async fn test_require_unknown_id_is_not_found() {
        let registry = BackupRegistry::connect_memory().await.unwrap();
        let err = registry.require(42).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_save_rejects_backward_transition() {
        let registry = BackupRegistry::connect_memory().await.unwrap();
        let mut record = registry
            .insert(&pending_record(truncate_millis(Utc::now())))
            .await
            .unwrap();

        record.status = BackupStatus::InProgress;
        registry.save(&mut record, BackupStatus::Pending).await.unwrap();

        record.status = BackupStatus::Pending;
        let err = registry
            .save(&mut record, BackupStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_save_detects_concurrent_change() {
        let registry = BackupRegistry::connect_memory().await.unwrap();
        let mut record = registry
            .insert(&pending_record(truncate_millis(Utc::now())))
            .await
            .unwrap();

        let mut stale = record.clone();
        record.status = BackupStatus::InProgress;
        registry.save(&mut record, BackupStatus::Pending).await.unwrap();
        assert_eq!(record.version, 1);

        // 第二个写入者仍以为记录处于 pending
        let err = registry
            .save(&mut stale, BackupStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Precondition(_)));
        assert_eq!(stale.version, 0);
    }

    #[tokio::test]
    async fn test_save_rejects_stale_snapshot_with_same_status() {
        let registry = BackupRegistry::connect_memory().await.unwrap();
        let mut record = registry
            .insert(&pending_record(truncate_millis(Utc::now())))
            .await
            .unwrap();
        let mut stale = record.clone();

        // 一个写入者把记录标记为删除，状态不变
        record.is_active = false;
        registry.save(&mut record, BackupStatus::Pending).await.unwrap();

        // 另一个写入者基于旧快照写回，不能把 is_active 恢复为 true
        stale.description = Some("stale".to_string());
        let err = registry
            .save(&mut stale, BackupStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Precondition(_)));

        let stored = registry.require(record.id).await.unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.description, None);
        assert_eq!(stored.version, 1);
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_save_keeps_expiry_immutable() {
        let registry = BackupRegistry::connect_memory().await.unwrap();
        let now = truncate_millis(Utc::now());
        let mut record = registry.insert(&pending_record(now)).await.unwrap();
        let original_expiry = record.expires_at;

        record.expires_at = now - Duration::days(1);
        record.status = BackupStatus::InProgress;
        registry.save(&mut record, BackupStatus::Pending).await.unwrap();

        let stored = registry.require(record.id).await.unwrap();
        assert_eq!(stored.expires_at, original_expiry);
        assert_eq!(stored.status, BackupStatus::InProgress);
    }

    #[tokio::test]
    async fn test_find_expired_active() {
        let registry = BackupRegistry::connect_memory().await.unwrap();
        let now = truncate_millis(Utc::now());

        let mut expired = pending_record(now - Duration::days(10));
        expired.expires_at = now - Duration::days(3);
        let expired = registry.insert(&expired).await.unwrap();
        registry.insert(&pending_record(now)).await.unwrap();

        let found = registry.find_expired_active(now).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, expired.id);
    }

    #[test]
    fn test_status_graph() {
        use BackupStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Completed.can_transition_to(Restoring));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Restored.can_transition_to(Restoring));
        assert_eq!("sub_tenant".parse::<BackupScope>().unwrap(), BackupScope::SubTenant);
        assert!("weekly".parse::<BackupType>().is_err());
    }
}
