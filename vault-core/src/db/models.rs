/// 备份记录在 DuckDB 中的行表示
///
/// 枚举与时间字段保持为字符串/毫秒，类型化转换在 `registry` 模块完成。
#[derive(Debug, Clone, PartialEq)]
pub struct BackupRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub backup_type: String,
    pub status: String,
    pub scope: String,
    pub tenant_ref: Option<String>,
    pub sub_tenant_ref: Option<String>,
    /// JSON 数组
    pub collections: String,
    pub artifact_path: Option<String>,
    pub artifact_name: Option<String>,
    pub size_bytes: Option<i64>,
    pub checksum: Option<String>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    /// JSON 对象
    pub metadata: Option<String>,
    pub created_by: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
    pub is_active: bool,
    pub restored_at: Option<i64>,
    pub restored_by: Option<String>,
    pub updated_at: i64,
    pub version: i64,
}

/// 查询备份记录时使用的列顺序，与 `BackupRow` 字段一一对应
pub(crate) const BACKUP_COLUMNS: &str = "id, name, description, backup_type, status, scope, \
     tenant_ref, sub_tenant_ref, collections, artifact_path, artifact_name, size_bytes, \
     checksum, started_at, completed_at, duration_ms, error, metadata, created_by, \
     created_at, expires_at, is_active, restored_at, restored_by, updated_at, version";

impl BackupRow {
    pub(crate) fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            backup_type: row.get(3)?,
            status: row.get(4)?,
            scope: row.get(5)?,
            tenant_ref: row.get(6)?,
            sub_tenant_ref: row.get(7)?,
            collections: row.get(8)?,
            artifact_path: row.get(9)?,
            artifact_name: row.get(10)?,
            size_bytes: row.get(11)?,
            checksum: row.get(12)?,
            started_at: row.get(13)?,
            completed_at: row.get(14)?,
            duration_ms: row.get(15)?,
            error: row.get(16)?,
            metadata: row.get(17)?,
            created_by: row.get(18)?,
            created_at: row.get(19)?,
            expires_at: row.get(20)?,
            is_active: row.get(21)?,
            restored_at: row.get(22)?,
            restored_by: row.get(23)?,
            updated_at: row.get(24)?,
            version: row.get(25)?,
        })
    }
}
