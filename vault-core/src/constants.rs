/// 备份相关常量
pub mod backup {
    use std::path::{Path, PathBuf};

    /// 备份目录名
    pub const BACKUP_DIR_NAME: &str = "backups";

    /// 备份文件前缀
    pub const BACKUP_PREFIX: &str = "backup_";

    /// 备份文件扩展名（不含点）
    pub const BACKUP_EXTENSION: &str = "gz";

    /// 导出文件前缀
    pub const EXPORT_PREFIX: &str = "export_";

    /// 默认保留天数
    pub const DEFAULT_RETENTION_DAYS: u32 = 30;

    /// 保留天数上限（100 年）
    pub const MAX_RETENTION_DAYS: u32 = 36_500;

    /// 校验和计算的读取缓冲区大小
    pub const CHECKSUM_BUFFER_SIZE: usize = 64 * 1024;

    /// 获取默认备份存储目录（用于配置）
    pub fn get_default_storage_dir() -> PathBuf {
        Path::new(".").join(BACKUP_DIR_NAME)
    }
}

/// 租户作用域相关常量
pub mod scope {
    /// 文档中的租户字段名
    pub const TENANT_FIELD: &str = "tenant_id";

    /// 文档中的子租户字段名
    pub const SUB_TENANT_FIELD: &str = "sub_tenant_id";

    /// 文档主键字段名
    pub const ID_FIELD: &str = "_id";
}

/// 外部工具相关常量
pub mod tools {
    /// 默认导出工具
    pub const DEFAULT_DUMP_PROGRAM: &str = "mongodump";

    /// 默认恢复工具
    pub const DEFAULT_RESTORE_PROGRAM: &str = "mongorestore";

    /// 默认连接地址
    pub const DEFAULT_URI: &str = "mongodb://127.0.0.1:27017";

    /// 默认数据库名
    pub const DEFAULT_DB_NAME: &str = "app";

    /// 错误信息中保留的 stderr 最大字符数
    pub const STDERR_TAIL_CHARS: usize = 2000;

    /// 备份归档内导出目录的名称
    pub const DUMP_DIR_NAME: &str = "dump";
}

/// 定时任务相关常量
pub mod schedule {
    /// 每日自动备份时间（本地时间）
    pub const DEFAULT_BACKUP_TIME: &str = "02:00";

    /// 每日保留期清理时间（本地时间）
    pub const DEFAULT_RETENTION_TIME: &str = "03:00";
}

/// 应用配置相关常量
pub mod config {
    use std::path::{Path, PathBuf};

    /// 数据目录名
    pub const DATA_DIR_NAME: &str = "data";

    /// 配置文件名
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// 备份登记库文件名
    pub const REGISTRY_FILE_NAME: &str = "registry.db";

    /// 文档存储文件名
    pub const STORE_FILE_NAME: &str = "store.db";

    /// 按优先级查找的配置文件名
    pub const CONFIG_CANDIDATES: [&str; 3] = ["config.toml", "vault.toml", ".vault.toml"];

    /// 获取备份登记库路径（跨平台）
    pub fn get_registry_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(REGISTRY_FILE_NAME)
    }

    /// 获取文档存储路径（跨平台）
    pub fn get_store_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(STORE_FILE_NAME)
    }
}
