use crate::Result;
use tokio::sync::oneshot;

use super::models::BackupRow;

/// DuckDB数据库操作消息
#[derive(Debug)]
pub enum DbMessage {
    /// 初始化数据库表
    InitTables {
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 插入备份记录，返回生成的ID
    InsertBackup {
        row: BackupRow,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    /// 根据ID获取备份记录
    GetBackupById {
        id: i64,
        respond_to: oneshot::Sender<Result<Option<BackupRow>>>,
    },
    /// 获取备份记录列表
    ListBackups {
        include_inactive: bool,
        respond_to: oneshot::Sender<Result<Vec<BackupRow>>>,
    },
    /// 按期望状态更新整行（比较并设置），返回是否更新成功
    UpdateBackup {
        row: BackupRow,
        expected_status: String,
        respond_to: oneshot::Sender<Result<bool>>,
    },
    /// 获取已过期且仍有效的备份记录
    FindExpiredActive {
        now_ms: i64,
        respond_to: oneshot::Sender<Result<Vec<BackupRow>>>,
    },
    /// 获取处于指定状态的备份记录
    FindByStatuses {
        statuses: Vec<String>,
        respond_to: oneshot::Sender<Result<Vec<BackupRow>>>,
    },
}
