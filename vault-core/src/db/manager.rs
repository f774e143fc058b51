use crate::{Result, VaultError};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

use super::actor::DuckDbActor;
use super::messages::DbMessage;
use super::models::BackupRow;

/// DuckDB数据库管理器
#[derive(Debug, Clone)]
pub struct DuckDbManager {
    sender: mpsc::Sender<DbMessage>,
}

impl DuckDbManager {
    /// 创建新的DuckDB管理器
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库文件的父目录存在
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let actor = DuckDbActor::new(db_path)?;
        Self::start(actor).await
    }

    /// 创建内存数据库管理器
    pub async fn new_memory() -> Result<Self> {
        let actor = DuckDbActor::new_memory()?;
        Self::start(actor).await
    }

    /// 启动Actor并初始化表结构
    async fn start(actor: DuckDbActor) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(100);
        tokio::task::spawn_blocking(move || actor.run(receiver));

        let manager = Self { sender };
        manager
            .call(|respond_to| DbMessage::InitTables { respond_to })
            .await?;

        Ok(manager)
    }

    /// 发送消息并等待Actor响应
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> DbMessage,
    ) -> Result<T> {
        let (respond_to, receiver) = oneshot::channel();

        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| VaultError::custom("数据库Actor已关闭"))?;

        receiver
            .await
            .map_err(|_| VaultError::custom("数据库Actor未返回响应"))?
    }

    /// 插入备份记录
    pub async fn insert_backup(&self, row: BackupRow) -> Result<i64> {
        self.call(|respond_to| DbMessage::InsertBackup { row, respond_to })
            .await
    }

    /// 根据ID获取备份记录
    pub async fn get_backup_by_id(&self, id: i64) -> Result<Option<BackupRow>> {
        self.call(|respond_to| DbMessage::GetBackupById { id, respond_to })
            .await
    }

    /// 获取备份记录列表
    pub async fn list_backups(&self, include_inactive: bool) -> Result<Vec<BackupRow>> {
        self.call(|respond_to| DbMessage::ListBackups {
            include_inactive,
            respond_to,
        })
        .await
    }

    /// 按期望状态更新备份记录
    pub async fn update_backup(&self, row: BackupRow, expected_status: &str) -> Result<bool> {
        let expected_status = expected_status.to_string();
        self.call(|respond_to| DbMessage::UpdateBackup {
            row,
            expected_status,
            respond_to,
        })
        .await
    }

    /// 获取已过期且仍有效的备份记录
    pub async fn find_expired_active(&self, now_ms: i64) -> Result<Vec<BackupRow>> {
        self.call(|respond_to| DbMessage::FindExpiredActive { now_ms, respond_to })
            .await
    }

    /// 获取处于指定状态的备份记录
    pub async fn find_by_statuses(&self, statuses: Vec<String>) -> Result<Vec<BackupRow>> {
        self.call(|respond_to| DbMessage::FindByStatuses {
            statuses,
            respond_to,
        })
        .await
    }
}
