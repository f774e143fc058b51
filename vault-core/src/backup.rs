use crate::{
    Result, VaultError,
    config::AppConfig,
    constants::backup::{BACKUP_EXTENSION, BACKUP_PREFIX, MAX_RETENTION_DAYS},
    executor::{DumpExecutor, DumpTarget, RestoreOptions},
    metadata::MetadataCollector,
    registry::{
        BackupArtifact, BackupMetadata, BackupRecord, BackupRegistry, BackupScope, BackupStatus,
        BackupType, from_millis, to_millis,
    },
    scope::{ScopeFilter, validate_collection_name},
    verifier,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

static LAST_STAMP: AtomicI64 = AtomicI64::new(0);

/// 进程内严格递增的毫秒时间戳，用于生成不重复的文件名
pub(crate) fn unique_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let previous = LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(previous + 1)
}

/// 备份文件名：`backup_<db>_<毫秒>.gz`
pub fn artifact_file_name(db_name: &str) -> String {
    format!(
        "{BACKUP_PREFIX}{db_name}_{}.{BACKUP_EXTENSION}",
        unique_millis()
    )
}

/// 删除备份文件，文件已不存在时返回 false
pub(crate) async fn remove_artifact_file(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// 截断到毫秒，与登记库的存储精度一致
fn now_millis() -> Result<DateTime<Utc>> {
    from_millis(to_millis(Utc::now()))
}

/// 备份管理器的运行参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSettings {
    pub storage_dir: PathBuf,
    pub retention_days: u32,
    pub target: DumpTarget,
}

impl BackupSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            storage_dir: config.get_backup_dir(),
            retention_days: config.backup.retention_days,
            target: DumpTarget::new(config.database.uri.clone(), config.database.name.clone()),
        }
    }
}

/// 创建备份的请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBackupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub backup_type: BackupType,
    pub scope: BackupScope,
    #[serde(default)]
    pub tenant_ref: Option<String>,
    #[serde(default)]
    pub sub_tenant_ref: Option<String>,
    #[serde(default)]
    pub collections: Vec<String>,
}

impl CreateBackupRequest {
    fn with_scope(name: impl Into<String>, scope: BackupScope) -> Self {
        Self {
            name: name.into(),
            description: None,
            backup_type: BackupType::Manual,
            scope,
            tenant_ref: None,
            sub_tenant_ref: None,
            collections: Vec::new(),
        }
    }

    pub fn full(name: impl Into<String>) -> Self {
        Self::with_scope(name, BackupScope::Full)
    }

    pub fn tenant(name: impl Into<String>, tenant_ref: impl Into<String>) -> Self {
        let mut request = Self::with_scope(name, BackupScope::Tenant);
        request.tenant_ref = Some(tenant_ref.into());
        request
    }

    pub fn sub_tenant(
        name: impl Into<String>,
        tenant_ref: Option<String>,
        sub_tenant_ref: impl Into<String>,
    ) -> Self {
        let mut request = Self::with_scope(name, BackupScope::SubTenant);
        request.tenant_ref = tenant_ref;
        request.sub_tenant_ref = Some(sub_tenant_ref.into());
        request
    }

    pub fn collections(name: impl Into<String>, collections: Vec<String>) -> Self {
        let mut request = Self::with_scope(name, BackupScope::Collections);
        request.collections = collections;
        request
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_type(mut self, backup_type: BackupType) -> Self {
        self.backup_type = backup_type;
        self
    }

    /// 校验请求，任何记录写入之前调用
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(VaultError::validation("备份名称不能为空"));
        }

        let has_tenant = self.tenant_ref.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_sub_tenant = self
            .sub_tenant_ref
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        let has_collections = !self.collections.is_empty();

        let allowed = match self.scope {
            BackupScope::Full => !has_tenant && !has_sub_tenant && !has_collections,
            BackupScope::Tenant => has_tenant && !has_sub_tenant && !has_collections,
            BackupScope::SubTenant => has_sub_tenant && !has_collections,
            BackupScope::Collections => !has_tenant && !has_sub_tenant && has_collections,
        };
        if !allowed {
            return Err(VaultError::validation(format!(
                "{} 作用域的参数不匹配: tenant_ref={:?}, sub_tenant_ref={:?}, collections={:?}",
                self.scope, self.tenant_ref, self.sub_tenant_ref, self.collections
            )));
        }

        for name in &self.collections {
            validate_collection_name(name)?;
        }
        Ok(())
    }
}

/// 备份管理器
///
/// 负责备份的创建、处理、恢复与删除，是唯一修改备份记录状态的组件。
#[derive(Clone)]
pub struct BackupManager {
    settings: Arc<BackupSettings>,
    registry: BackupRegistry,
    executor: Arc<dyn DumpExecutor>,
    metadata: MetadataCollector,
    restore_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupManager")
            .field("storage_dir", &self.settings.storage_dir)
            .field("retention_days", &self.settings.retention_days)
            .field("target", &self.settings.target.redacted_uri())
            .finish()
    }
}

impl BackupManager {
    /// 创建新的备份管理器
    pub fn new(
        settings: BackupSettings,
        registry: BackupRegistry,
        executor: Arc<dyn DumpExecutor>,
        metadata: MetadataCollector,
    ) -> Result<Self> {
        if settings.retention_days == 0 || settings.retention_days > MAX_RETENTION_DAYS {
            return Err(VaultError::validation(format!(
                "保留天数必须在 1 到 {MAX_RETENTION_DAYS} 之间"
            )));
        }
        if !settings.storage_dir.exists() {
            std::fs::create_dir_all(&settings.storage_dir)?;
        }

        Ok(Self {
            settings: Arc::new(settings),
            registry,
            executor,
            metadata,
            restore_locks: Arc::new(DashMap::new()),
        })
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    pub fn registry(&self) -> &BackupRegistry {
        &self.registry
    }

    /// 创建备份
    ///
    /// 写入 pending 记录后立即返回，实际处理在后台任务中进行，
    /// 调用方需要轮询记录状态获取结果。
    pub async fn create(
        &self,
        request: CreateBackupRequest,
        requested_by: Option<&str>,
    ) -> Result<BackupRecord> {
        let record = self.create_pending(request, requested_by).await?;

        let manager = self.clone();
        let id = record.id;
        tokio::spawn(async move {
            if let Err(e) = manager.process_backup(id).await {
                error!(backup_id = id, error = %e, "后台备份任务异常结束");
            }
        });

        Ok(record)
    }

    /// 校验请求并写入 pending 记录，不触发处理
    pub async fn create_pending(
        &self,
        request: CreateBackupRequest,
        requested_by: Option<&str>,
    ) -> Result<BackupRecord> {
        request.validate()?;

        let now = now_millis()?;
        let expires_at = now
            .checked_add_signed(Duration::days(i64::from(self.settings.retention_days)))
            .ok_or_else(|| VaultError::validation("保留天数过大，过期时间超出可表示范围"))?;
        let record = BackupRecord {
            id: 0,
            name: request.name.trim().to_string(),
            description: request.description,
            backup_type: request.backup_type,
            status: BackupStatus::Pending,
            scope: request.scope,
            tenant_ref: request.tenant_ref,
            sub_tenant_ref: request.sub_tenant_ref,
            collections: request.collections,
            artifact: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error: None,
            metadata: None,
            created_by: requested_by.map(str::to_string),
            created_at: now,
            expires_at,
            is_active: true,
            restored_at: None,
            restored_by: None,
            updated_at: now,
            version: 0,
        };

        let record = self.registry.insert(&record).await?;
        info!(
            backup_id = record.id,
            scope = %record.scope,
            backup_type = %record.backup_type,
            "备份记录已创建"
        );
        Ok(record)
    }

    /// 处理 pending 状态的备份，返回终态记录
    ///
    /// 导出、校验和任一步失败都会写入 failed 状态，此时返回 Ok。
    /// 仅登记库本身不可用时返回错误。
    #[instrument(skip(self))]
    pub async fn process_backup(&self, id: i64) -> Result<BackupRecord> {
        let mut record = self.registry.require(id).await?;
        if record.status != BackupStatus::Pending {
            return Err(VaultError::precondition(format!(
                "备份 {id} 当前状态为 {}，只能处理 pending 状态的备份",
                record.status
            )));
        }

        let started_at = Utc::now();
        record.status = BackupStatus::InProgress;
        record.started_at = Some(started_at);
        self.registry.save(&mut record, BackupStatus::Pending).await?;

        let artifact_name = artifact_file_name(&self.settings.target.db_name);
        let artifact_path = self.settings.storage_dir.join(&artifact_name);
        info!("开始创建备份: {}", artifact_path.display());

        match self.run_dump(&record, &artifact_path, &artifact_name).await {
            Ok((artifact, metadata)) => {
                info!(
                    backup_id = id,
                    size_bytes = artifact.size_bytes,
                    records = metadata.total_records,
                    "备份创建成功"
                );
                record.status = BackupStatus::Completed;
                record.artifact = Some(artifact);
                record.metadata = Some(metadata);
                record.error = None;
            }
            Err(e) => {
                error!(backup_id = id, error = %e, "备份创建失败");
                if let Err(cleanup) = remove_artifact_file(&artifact_path).await {
                    warn!(backup_id = id, error = %cleanup, "清理不完整的备份文件失败");
                }
                record.status = BackupStatus::Failed;
                record.error = Some(e.to_string());
            }
        }

        let completed_at = Utc::now();
        record.completed_at = Some(completed_at);
        record.duration_ms = Some((completed_at - started_at).num_milliseconds().max(0));
        self.registry.save(&mut record, BackupStatus::InProgress).await?;

        self.registry.require(id).await
    }

    async fn run_dump(
        &self,
        record: &BackupRecord,
        artifact_path: &Path,
        artifact_name: &str,
    ) -> Result<(BackupArtifact, BackupMetadata)> {
        let filter = ScopeFilter::for_record(record)?;

        self.executor
            .dump(&self.settings.target, artifact_path, &filter)
            .await?;

        let size_bytes = tokio::fs::metadata(artifact_path).await?.len();
        let checksum = verifier::checksum(artifact_path).await?;
        let metadata = self.metadata.collect(&filter).await;

        Ok((
            BackupArtifact {
                path: artifact_path.to_string_lossy().to_string(),
                name: artifact_name.to_string(),
                size_bytes,
                checksum,
            },
            metadata,
        ))
    }

    /// 从备份恢复
    ///
    /// 同步执行，失败时记录置为 failed、删除备份文件，并把错误返回给调用方。
    /// 同一目标上的恢复串行执行，取得锁之后重新读取并校验记录。
    #[instrument(skip(self, options))]
    pub async fn restore(
        &self,
        id: i64,
        options: RestoreOptions,
        requested_by: Option<&str>,
    ) -> Result<BackupRecord> {
        // 排队前先检查一次，明显不可恢复的请求不必等待锁
        self.restorable(id).await?;

        let lock = self
            .restore_locks
            .entry(self.settings.target.lock_key())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        // 等待期间记录可能已被删除、清理或由其他恢复改变状态
        let (mut record, archive) = self.restorable(id).await?;

        record.status = BackupStatus::Restoring;
        self.registry
            .save(&mut record, BackupStatus::Completed)
            .await?;
        info!(
            backup_id = id,
            drop_existing = options.drop_existing,
            target = %self.settings.target.redacted_uri(),
            "开始恢复备份"
        );

        let outcome = self
            .executor
            .restore(&self.settings.target, &archive, &options)
            .await;

        match &outcome {
            Ok(()) => {
                record.status = BackupStatus::Restored;
                record.restored_at = Some(Utc::now());
                record.restored_by = requested_by.map(str::to_string);
                record.error = None;
                info!(backup_id = id, "备份恢复成功");
            }
            Err(e) => {
                error!(backup_id = id, error = %e, "备份恢复失败");
                if let Err(cleanup) = remove_artifact_file(&archive).await {
                    warn!(backup_id = id, error = %cleanup, "删除恢复失败的备份文件失败");
                }
                record.status = BackupStatus::Failed;
                record.artifact = None;
                record.error = Some(e.to_string());
            }
        }
        self.registry
            .save(&mut record, BackupStatus::Restoring)
            .await?;

        outcome?;
        Ok(record)
    }

    /// 读取记录并确认可以恢复：有效、处于 completed、备份文件存在
    async fn restorable(&self, id: i64) -> Result<(BackupRecord, PathBuf)> {
        let record = self.registry.require(id).await?;
        if !record.is_active {
            return Err(VaultError::not_found(format!("备份 {id} 已被删除")));
        }
        if record.status != BackupStatus::Completed {
            return Err(VaultError::precondition(format!(
                "备份 {id} 当前状态为 {}，只能从 completed 状态恢复",
                record.status
            )));
        }
        let archive = self.existing_artifact(&record).await?;
        Ok((record, archive))
    }

    /// 删除备份：标记记录无效并移除备份文件，重复调用无副作用
    ///
    /// 先以比较并设置写入 `is_active = false`，与恢复并发时只有一方能成功，
    /// 写入成功后才删除文件。
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<BackupRecord> {
        let mut record = self.registry.require(id).await?;
        if record.status.is_busy() {
            return Err(VaultError::precondition(format!(
                "备份 {id} 正在处理中（{}），无法删除",
                record.status
            )));
        }

        if record.is_active {
            let status = record.status;
            record.is_active = false;
            self.registry.save(&mut record, status).await?;
            info!(backup_id = id, "备份记录已标记为删除");
        }

        if let Some(artifact) = &record.artifact {
            if remove_artifact_file(Path::new(&artifact.path)).await? {
                info!(backup_id = id, path = %artifact.path, "备份文件已删除");
            }
        }

        Ok(record)
    }

    /// 备份列表（按创建时间倒序）
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<BackupRecord>> {
        self.registry.list(include_inactive).await
    }

    pub async fn get(&self, id: i64) -> Result<BackupRecord> {
        self.registry.require(id).await
    }

    /// 获取可下载的备份文件路径
    pub async fn download(&self, id: i64) -> Result<PathBuf> {
        let record = self.downloadable(id).await?;
        self.existing_artifact(&record).await
    }

    /// 重新计算备份文件校验和并与记录比对
    pub async fn verify(&self, id: i64) -> Result<bool> {
        let record = self.downloadable(id).await?;
        let path = self.existing_artifact(&record).await?;
        let expected = record
            .artifact
            .as_ref()
            .map(|a| a.checksum.as_str())
            .unwrap_or_default();
        verifier::verify(&path, expected).await
    }

    async fn downloadable(&self, id: i64) -> Result<BackupRecord> {
        let record = self.registry.require(id).await?;
        if !record.is_active {
            return Err(VaultError::not_found(format!("备份 {id} 已被删除")));
        }
        if !record.status.holds_artifact() {
            return Err(VaultError::precondition(format!(
                "备份 {id} 当前状态为 {}，没有可用的备份文件",
                record.status
            )));
        }
        Ok(record)
    }

    async fn existing_artifact(&self, record: &BackupRecord) -> Result<PathBuf> {
        let artifact = record
            .artifact
            .as_ref()
            .ok_or_else(|| VaultError::not_found(format!("备份 {} 没有备份文件", record.id)))?;

        let path = PathBuf::from(&artifact.path);
        if !tokio::fs::try_exists(&path).await? {
            return Err(VaultError::not_found(format!(
                "备份文件不存在: {}",
                path.display()
            )));
        }
        Ok(path)
    }

    /// 将上次进程退出时未完成的记录置为 failed
    ///
    /// 只应在没有其他任务运行时调用（守护进程启动时）。
    pub async fn recover_interrupted(&self) -> Result<Vec<i64>> {
        let stuck = self
            .registry
            .find_by_statuses(&[
                BackupStatus::Pending,
                BackupStatus::InProgress,
                BackupStatus::Restoring,
            ])
            .await?;

        let mut recovered = Vec::with_capacity(stuck.len());
        for mut record in stuck {
            let previous = record.status;
            let now = Utc::now();
            record.status = BackupStatus::Failed;
            record.error = Some(format!("进程在 {previous} 状态下中断，任务未完成"));
            if previous == BackupStatus::Restoring {
                // failed 记录不保留备份文件
                if let Some(artifact) = record.artifact.take() {
                    if let Err(e) = remove_artifact_file(Path::new(&artifact.path)).await {
                        warn!(backup_id = record.id, error = %e, "删除中断恢复的备份文件失败");
                    }
                }
            } else {
                record.completed_at = Some(now);
                record.duration_ms = record
                    .started_at
                    .map(|started| (now - started).num_milliseconds().max(0));
            }

            match self.registry.save(&mut record, previous).await {
                Ok(()) => {
                    warn!(backup_id = record.id, previous = %previous, "已回收中断的备份任务");
                    recovered.push(record.id);
                }
                Err(e) => {
                    error!(backup_id = record.id, error = %e, "回收中断的备份任务失败");
                }
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CollectionRegistry, MemoryCollection};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tempfile::{TempDir, tempdir};

    #[derive(Default)]
    struct FakeExecutor {
        fail_dump: bool,
        fail_restore: bool,
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl DumpExecutor for FakeExecutor {
        async fn dump(
            &self,
            _target: &DumpTarget,
            output: &Path,
            _filter: &ScopeFilter,
        ) -> Result<()> {
            self.calls.lock().unwrap().push("dump".to_string());
            tokio::fs::write(output, b"partial archive").await?;
            if self.fail_dump {
                return Err(VaultError::execution("mongodump 退出状态 1"));
            }
            Ok(())
        }

        async fn restore(
            &self,
            _target: &DumpTarget,
            _archive: &Path,
            _options: &RestoreOptions,
        ) -> Result<()> {
            self.calls.lock().unwrap().push("restore".to_string());
            if self.fail_restore {
                return Err(VaultError::execution("mongorestore 退出状态 1"));
            }
            Ok(())
        }
    }

    async fn manager_with(executor: FakeExecutor) -> (BackupManager, Arc<FakeExecutor>, TempDir) {
        let dir = tempdir().unwrap();
        let executor = Arc::new(executor);
        let collections = CollectionRegistry::new().register(Arc::new(
            MemoryCollection::with_documents("orders", vec![json!({"tenant_id": "t"})]),
        ));
        let manager = BackupManager::new(
            BackupSettings {
                storage_dir: dir.path().join("backups"),
                retention_days: 7,
                target: DumpTarget::new("mongodb://localhost:27017", "app"),
            },
            BackupRegistry::connect_memory().await.unwrap(),
            executor.clone(),
            MetadataCollector::new(collections),
        )
        .unwrap();
        (manager, executor, dir)
    }

    #[test]
    fn test_artifact_names_are_unique() {
        let names: std::collections::HashSet<_> =
            (0..200).map(|_| artifact_file_name("app")).collect();
        assert_eq!(names.len(), 200);
        assert!(names.iter().all(|n| n.starts_with("backup_app_") && n.ends_with(".gz")));
    }

    #[test]
    fn test_request_validation() {
        assert!(CreateBackupRequest::full("nightly").validate().is_ok());
        assert!(CreateBackupRequest::full("  ").validate().is_err());
        assert!(CreateBackupRequest::tenant("t", "").validate().is_err());
        assert!(CreateBackupRequest::collections("c", vec![]).validate().is_err());
        assert!(
            CreateBackupRequest::collections("c", vec!["bad name!".to_string()])
                .validate()
                .is_err()
        );

        let mut full_with_tenant = CreateBackupRequest::full("x");
        full_with_tenant.tenant_ref = Some("t".to_string());
        assert!(full_with_tenant.validate().is_err());
    }

    #[tokio::test]
    async fn test_process_backup_completes() {
        let (manager, _executor, _dir) = manager_with(FakeExecutor::default()).await;
        let record = manager
            .create_pending(CreateBackupRequest::tenant("t-backup", "t"), Some("alice"))
            .await
            .unwrap();

        let done = manager.process_backup(record.id).await.unwrap();
        assert_eq!(done.status, BackupStatus::Completed);
        let artifact = done.artifact.unwrap();
        assert_eq!(artifact.size_bytes, b"partial archive".len() as u64);
        assert_eq!(done.metadata.unwrap().total_records, 1);
        assert!(done.duration_ms.unwrap() >= 0);

        // 只能处理一次
        assert!(matches!(
            manager.process_backup(record.id).await,
            Err(VaultError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_dump_cleans_partial_file() {
        let executor = FakeExecutor {
            fail_dump: true,
            ..Default::default()
        };
        let (manager, _executor, _dir) = manager_with(executor).await;
        let record = manager
            .create_pending(CreateBackupRequest::full("broken"), None)
            .await
            .unwrap();

        let done = manager.process_backup(record.id).await.unwrap();
        assert_eq!(done.status, BackupStatus::Failed);
        assert!(done.error.unwrap().contains("退出状态"));
        assert!(done.completed_at.is_some());
        assert!(done.artifact.is_none());

        let leftovers = std::fs::read_dir(&manager.settings().storage_dir)
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_failed_restore_is_reported_and_recorded() {
        let executor = FakeExecutor {
            fail_restore: true,
            ..Default::default()
        };
        let (manager, _executor, _dir) = manager_with(executor).await;
        let record = manager
            .create_pending(CreateBackupRequest::full("r"), None)
            .await
            .unwrap();
        let done = manager.process_backup(record.id).await.unwrap();
        let archive = PathBuf::from(&done.artifact.unwrap().path);
        assert!(archive.exists());

        let err = manager
            .restore(record.id, RestoreOptions::default(), Some("ops"))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Execution(_)));

        let after = manager.get(record.id).await.unwrap();
        assert_eq!(after.status, BackupStatus::Failed);
        assert!(after.restored_at.is_none());
        assert!(after.error.is_some());
        // failed 状态不保留备份文件和校验和
        assert!(after.artifact.is_none());
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_oversized_retention_is_rejected() {
        let dir = tempdir().unwrap();
        let result = BackupManager::new(
            BackupSettings {
                storage_dir: dir.path().join("backups"),
                retention_days: u32::MAX,
                target: DumpTarget::new("mongodb://localhost:27017", "app"),
            },
            BackupRegistry::connect_memory().await.unwrap(),
            Arc::new(FakeExecutor::default()),
            MetadataCollector::default(),
        );
        assert!(matches!(result, Err(VaultError::Validation(_))));
    }

    #[tokio::test]
    async fn test_restore_missing_artifact_is_not_found() {
        let (manager, executor, _dir) = manager_with(FakeExecutor::default()).await;
        let record = manager
            .create_pending(CreateBackupRequest::full("gone"), None)
            .await
            .unwrap();
        let done = manager.process_backup(record.id).await.unwrap();
        std::fs::remove_file(&done.artifact.unwrap().path).unwrap();

        let err = manager
            .restore(record.id, RestoreOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
        assert_eq!(*executor.calls.lock().unwrap(), vec!["dump"]);
        assert_eq!(
            manager.get(record.id).await.unwrap().status,
            BackupStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (manager, _executor, _dir) = manager_with(FakeExecutor::default()).await;
        let record = manager
            .create_pending(CreateBackupRequest::full("d"), None)
            .await
            .unwrap();

        // pending 记录不能删除
        assert!(matches!(
            manager.delete(record.id).await,
            Err(VaultError::Precondition(_))
        ));

        let done = manager.process_backup(record.id).await.unwrap();
        let path = PathBuf::from(done.artifact.unwrap().path);
        assert!(path.exists());

        let deleted = manager.delete(record.id).await.unwrap();
        assert!(!deleted.is_active);
        assert!(!path.exists());

        let again = manager.delete(record.id).await.unwrap();
        assert!(!again.is_active);
        assert!(manager.list(false).await.unwrap().is_empty());
        assert_eq!(manager.list(true).await.unwrap().len(), 1);
        assert!(matches!(
            manager.download(record.id).await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_detects_tampering() {
        let (manager, _executor, _dir) = manager_with(FakeExecutor::default()).await;
        let record = manager
            .create_pending(CreateBackupRequest::full("v"), None)
            .await
            .unwrap();
        manager.process_backup(record.id).await.unwrap();

        assert!(manager.verify(record.id).await.unwrap());
        let path = manager.download(record.id).await.unwrap();
        std::fs::write(&path, b"tampered").unwrap();
        assert!(!manager.verify(record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_recover_interrupted_marks_failed() {
        let (manager, _executor, _dir) = manager_with(FakeExecutor::default()).await;
        let stuck = manager
            .create_pending(CreateBackupRequest::full("stuck"), None)
            .await
            .unwrap();
        let finished = manager
            .create_pending(CreateBackupRequest::full("ok"), None)
            .await
            .unwrap();
        manager.process_backup(finished.id).await.unwrap();

        let recovered = manager.recover_interrupted().await.unwrap();
        assert_eq!(recovered, vec![stuck.id]);

        let stuck = manager.get(stuck.id).await.unwrap();
        assert_eq!(stuck.status, BackupStatus::Failed);
        assert!(stuck.error.is_some());
        assert_eq!(
            manager.get(finished.id).await.unwrap().status,
            BackupStatus::Completed
        );
    }
}
