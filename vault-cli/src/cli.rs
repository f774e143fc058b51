use crate::project_info::{metadata, version_info};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use vault_core::registry::BackupScope;

/// 命令行中的备份作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    /// 全量
    Full,
    /// 单个租户
    Tenant,
    /// 单个子租户
    SubTenant,
    /// 指定集合
    Collections,
}

impl From<ScopeArg> for BackupScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Full => BackupScope::Full,
            ScopeArg::Tenant => BackupScope::Tenant,
            ScopeArg::SubTenant => BackupScope::SubTenant,
            ScopeArg::Collections => BackupScope::Collections,
        }
    }
}

/// Vault CLI - 多租户数据库备份与恢复工具
#[derive(Parser, Debug)]
#[command(name = metadata::PROJECT_NAME)]
#[command(about = metadata::PROJECT_DESCRIPTION)]
#[command(version = version_info::CLI_VERSION)]
#[command(long_about = metadata::display::DESCRIPTION_LONG)]
#[command(author = metadata::PROJECT_AUTHORS)]
pub struct Cli {
    /// 配置文件路径（不指定时依次查找 config.toml、vault.toml、.vault.toml）
    #[arg(short, long, env = "VAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 首次使用时初始化，创建配置文件和数据库
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 创建备份并等待完成
    Create {
        /// 备份名称
        #[arg(long)]
        name: String,
        /// 备份说明
        #[arg(long)]
        description: Option<String>,
        /// 备份作用域
        #[arg(long, value_enum, default_value = "full")]
        scope: ScopeArg,
        /// 租户 ID（tenant / sub-tenant 作用域）
        #[arg(long)]
        tenant: Option<String>,
        /// 子租户 ID（sub-tenant 作用域）
        #[arg(long)]
        sub_tenant: Option<String>,
        /// 集合列表（collections 作用域），逗号分隔
        #[arg(long, value_delimiter = ',')]
        collections: Vec<String>,
        /// 操作人
        #[arg(long, env = "VAULT_OPERATOR")]
        by: Option<String>,
    },
    /// 列出备份
    List {
        /// 包含已删除的备份
        #[arg(long)]
        all: bool,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 显示备份详情
    Show {
        /// 备份 ID
        backup_id: i64,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 从备份恢复
    Restore {
        /// 备份 ID
        backup_id: i64,
        /// 恢复前清空目标中的同名集合
        #[arg(long)]
        drop: bool,
        /// 操作人
        #[arg(long, env = "VAULT_OPERATOR")]
        by: Option<String>,
    },
    /// 删除备份（保留记录，删除文件）
    Delete {
        /// 备份 ID
        backup_id: i64,
    },
    /// 获取备份文件
    Download {
        /// 备份 ID
        backup_id: i64,
        /// 复制到指定路径，不指定时只输出文件路径
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// 重新校验备份文件
    Verify {
        /// 备份 ID
        backup_id: i64,
    },
    /// 导出集合
    Export {
        /// 集合列表，逗号分隔
        #[arg(long, value_delimiter = ',', required = true)]
        collections: Vec<String>,
        /// 导出格式
        #[arg(long, default_value = "json")]
        format: String,
        /// 过滤条件，格式为 集合:字段=值，可重复
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// 从导出文件导入集合
    Import {
        /// 导出文件路径
        file: PathBuf,
    },
    /// 立即执行一次过期备份清理
    Sweep,
    /// 以守护进程方式运行每日备份与清理
    Daemon,
}
