use crate::Result;
use duckdb::{Connection, params, params_from_iter};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::DbMessage;
use super::models::{BACKUP_COLUMNS, BackupRow};

/// DuckDB Actor - 确保单线程访问DuckDB
pub struct DuckDbActor {
    connection: Connection,
}

impl DuckDbActor {
    /// 创建新的DuckDB Actor
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        Ok(Self { connection })
    }

    /// 创建内存DuckDB Actor
    pub fn new_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    /// 运行Actor消息循环
    ///
    /// DuckDB 调用是阻塞的，消息循环运行在 `spawn_blocking` 线程上。
    pub fn run(mut self, mut receiver: mpsc::Receiver<DbMessage>) {
        info!("DuckDB Actor 已启动");

        while let Some(message) = receiver.blocking_recv() {
            self.handle_message(message);
        }

        info!("DuckDB Actor 已关闭");
    }

    /// 处理数据库消息
    fn handle_message(&mut self, message: DbMessage) {
        match message {
            DbMessage::InitTables { respond_to } => {
                let result = self.init_tables();
                let _ = respond_to.send(result);
            }
            DbMessage::InsertBackup { row, respond_to } => {
                let result = self.insert_backup(&row);
                let _ = respond_to.send(result);
            }
            DbMessage::GetBackupById { id, respond_to } => {
                let result = self.get_backup_by_id(id);
                let _ = respond_to.send(result);
            }
            DbMessage::ListBackups {
                include_inactive,
                respond_to,
            } => {
                let result = self.list_backups(include_inactive);
                let _ = respond_to.send(result);
            }
            DbMessage::UpdateBackup {
                row,
                expected_status,
                respond_to,
            } => {
                let result = self.update_backup(&row, &expected_status);
                let _ = respond_to.send(result);
            }
            DbMessage::FindExpiredActive { now_ms, respond_to } => {
                let result = self.find_expired_active(now_ms);
                let _ = respond_to.send(result);
            }
            DbMessage::FindByStatuses {
                statuses,
                respond_to,
            } => {
                let result = self.find_by_statuses(&statuses);
                let _ = respond_to.send(result);
            }
        }
    }

    /// 初始化数据库表
    fn init_tables(&mut self) -> Result<()> {
        debug!("正在初始化DuckDB表...");

        let sql_content = include_str!("../../migrations/init_duckdb.sql");

        // 按分号分割SQL语句并执行，跳过纯注释片段
        for statement in sql_content.split(';') {
            let is_only_comments = statement
                .lines()
                .map(str::trim)
                .all(|line| line.is_empty() || line.starts_with("--"));
            if !is_only_comments {
                self.connection.execute(statement.trim(), [])?;
            }
        }

        info!("DuckDB表初始化完成");
        Ok(())
    }

    /// 插入备份记录
    fn insert_backup(&mut self, row: &BackupRow) -> Result<i64> {
        let id: i64 = self.connection.query_row(
            "INSERT INTO backups (name, description, backup_type, status, scope, tenant_ref, \
             sub_tenant_ref, collections, artifact_path, artifact_name, size_bytes, checksum, \
             started_at, completed_at, duration_ms, error, metadata, created_by, created_at, \
             expires_at, is_active, restored_at, restored_by, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING id",
            params![
                row.name,
                row.description,
                row.backup_type,
                row.status,
                row.scope,
                row.tenant_ref,
                row.sub_tenant_ref,
                row.collections,
                row.artifact_path,
                row.artifact_name,
                row.size_bytes,
                row.checksum,
                row.started_at,
                row.completed_at,
                row.duration_ms,
                row.error,
                row.metadata,
                row.created_by,
                row.created_at,
                row.expires_at,
                row.is_active,
                row.restored_at,
                row.restored_by,
                row.updated_at,
            ],
            |r| r.get(0),
        )?;

        Ok(id)
    }

    /// 根据ID获取备份记录
    fn get_backup_by_id(&mut self, id: i64) -> Result<Option<BackupRow>> {
        let mut stmt = self
            .connection
            .prepare(&format!("SELECT {BACKUP_COLUMNS} FROM backups WHERE id = ?"))?;

        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(BackupRow::from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// 获取备份记录列表
    fn list_backups(&mut self, include_inactive: bool) -> Result<Vec<BackupRow>> {
        let sql = if include_inactive {
            format!("SELECT {BACKUP_COLUMNS} FROM backups ORDER BY created_at DESC, id DESC")
        } else {
            format!(
                "SELECT {BACKUP_COLUMNS} FROM backups WHERE is_active = TRUE \
                 ORDER BY created_at DESC, id DESC"
            )
        };

        let mut stmt = self.connection.prepare(&sql)?;
        let backup_iter = stmt.query_map([], |row| BackupRow::from_row(row))?;

        let mut backups = Vec::new();
        for backup in backup_iter {
            backups.push(backup?);
        }

        Ok(backups)
    }

    /// 更新整行，仅当状态与版本号都与读取时一致才生效
    ///
    /// `created_at`、`expires_at` 写入后不再修改。
    fn update_backup(&mut self, row: &BackupRow, expected_status: &str) -> Result<bool> {
        let updated = self.connection.execute(
            "UPDATE backups SET name = ?, description = ?, backup_type = ?, status = ?, \
             scope = ?, tenant_ref = ?, sub_tenant_ref = ?, collections = ?, artifact_path = ?, \
             artifact_name = ?, size_bytes = ?, checksum = ?, started_at = ?, completed_at = ?, \
             duration_ms = ?, error = ?, metadata = ?, created_by = ?, \
             is_active = ?, restored_at = ?, restored_by = ?, updated_at = ?, \
             version = version + 1 \
             WHERE id = ? AND status = ? AND version = ?",
            params![
                row.name,
                row.description,
                row.backup_type,
                row.status,
                row.scope,
                row.tenant_ref,
                row.sub_tenant_ref,
                row.collections,
                row.artifact_path,
                row.artifact_name,
                row.size_bytes,
                row.checksum,
                row.started_at,
                row.completed_at,
                row.duration_ms,
                row.error,
                row.metadata,
                row.created_by,
                row.is_active,
                row.restored_at,
                row.restored_by,
                row.updated_at,
                row.id,
                expected_status,
                row.version,
            ],
        )?;

        Ok(updated > 0)
    }

    /// 获取已过期且仍有效的备份记录
    fn find_expired_active(&mut self, now_ms: i64) -> Result<Vec<BackupRow>> {
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {BACKUP_COLUMNS} FROM backups \
             WHERE is_active = TRUE AND expires_at <= ? ORDER BY expires_at"
        ))?;

        let backup_iter = stmt.query_map(params![now_ms], |row| BackupRow::from_row(row))?;

        let mut backups = Vec::new();
        for backup in backup_iter {
            backups.push(backup?);
        }

        Ok(backups)
    }

    /// 获取处于指定状态的备份记录
    fn find_by_statuses(&mut self, statuses: &[String]) -> Result<Vec<BackupRow>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let mut stmt = self.connection.prepare(&format!(
            "SELECT {BACKUP_COLUMNS} FROM backups WHERE status IN ({placeholders}) ORDER BY id"
        ))?;

        let backup_iter =
            stmt.query_map(params_from_iter(statuses.iter()), |row| BackupRow::from_row(row))?;

        let mut backups = Vec::new();
        for backup in backup_iter {
            backups.push(backup?);
        }

        Ok(backups)
    }
}
