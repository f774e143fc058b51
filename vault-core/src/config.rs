use crate::constants::{backup, config, schedule, tools};
use crate::error::{Result, VaultError};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub backup: BackupConfig,
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub tools: ToolsConfig,
    pub schedule: ScheduleConfig,
}

/// 备份相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupConfig {
    pub storage_dir: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

/// 被备份的业务数据库配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// 导出/恢复工具使用的连接地址，可能包含凭据
    pub uri: String,
    /// 数据库名，同时用于备份文件命名
    pub name: String,
    /// 统计与导入导出使用的文档存储
    pub store_path: String,
    /// 已知集合列表
    #[serde(default)]
    pub collections: Vec<String>,
}

/// 备份登记库配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistryConfig {
    pub path: String,
}

/// 外部工具配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolsConfig {
    pub dump_program: String,
    pub restore_program: String,
    /// 子进程超时（秒），0 表示不限制
    #[serde(default)]
    pub timeout_secs: u64,
}

/// 定时任务配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub backup_time: String,
    pub retention_time: String,
}

fn default_retention_days() -> u32 {
    backup::DEFAULT_RETENTION_DAYS
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backup: BackupConfig {
                storage_dir: backup::get_default_storage_dir()
                    .to_string_lossy()
                    .to_string(),
                retention_days: backup::DEFAULT_RETENTION_DAYS,
            },
            database: DatabaseConfig {
                uri: tools::DEFAULT_URI.to_string(),
                name: tools::DEFAULT_DB_NAME.to_string(),
                store_path: config::get_store_path().to_string_lossy().to_string(),
                collections: Vec::new(),
            },
            registry: RegistryConfig {
                path: config::get_registry_path().to_string_lossy().to_string(),
            },
            tools: ToolsConfig {
                dump_program: tools::DEFAULT_DUMP_PROGRAM.to_string(),
                restore_program: tools::DEFAULT_RESTORE_PROGRAM.to_string(),
                timeout_secs: 0,
            },
            schedule: ScheduleConfig {
                enabled: true,
                backup_time: schedule::DEFAULT_BACKUP_TIME.to_string(),
                retention_time: schedule::DEFAULT_RETENTION_TIME.to_string(),
            },
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：config.toml -> vault.toml -> .vault.toml
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in &config::CONFIG_CANDIDATES {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        Err(VaultError::not_found(format!(
            "未找到配置文件（{}）",
            config::CONFIG_CANDIDATES.join(", ")
        )))
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&path, self.to_toml_with_comments())?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        let collections = self
            .database
            .collections
            .iter()
            .map(|name| format!("\"{name}\""))
            .collect::<Vec<_>>()
            .join(", ");

        TEMPLATE
            .replace("{storage_dir}", &self.backup.storage_dir)
            .replace("{retention_days}", &self.backup.retention_days.to_string())
            .replace("{database_uri}", &self.database.uri)
            .replace("{database_name}", &self.database.name)
            .replace("{store_path}", &self.database.store_path)
            .replace("{collections}", &collections)
            .replace("{registry_path}", &self.registry.path)
            .replace("{dump_program}", &self.tools.dump_program)
            .replace("{restore_program}", &self.tools.restore_program)
            .replace("{timeout_secs}", &self.tools.timeout_secs.to_string())
            .replace("{schedule_enabled}", &self.schedule.enabled.to_string())
            .replace("{backup_time}", &self.schedule.backup_time)
            .replace("{retention_time}", &self.schedule.retention_time)
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<()> {
        if self.backup.retention_days == 0
            || self.backup.retention_days > backup::MAX_RETENTION_DAYS
        {
            return Err(VaultError::validation(format!(
                "backup.retention_days 必须在 1 到 {} 之间",
                backup::MAX_RETENTION_DAYS
            )));
        }
        if self.database.name.trim().is_empty() {
            return Err(VaultError::validation("database.name 不能为空"));
        }
        parse_time_of_day(&self.schedule.backup_time)?;
        parse_time_of_day(&self.schedule.retention_time)?;
        Ok(())
    }

    /// 获取备份目录路径
    pub fn get_backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.backup.storage_dir)
    }

    /// 子进程超时设置
    pub fn tool_timeout(&self) -> Option<Duration> {
        match self.tools.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// 解析 `HH:MM` 格式的每日时间
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|e| VaultError::validation(format!("无效的时间格式 '{value}'（应为 HH:MM）: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_round_trips_through_template() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.database.collections = vec!["users".to_string(), "orders".to_string()];
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.backup.retention_days, backup::DEFAULT_RETENTION_DAYS);
        assert_eq!(loaded.database.collections, vec!["users", "orders"]);
        assert_eq!(loaded.schedule.backup_time, schedule::DEFAULT_BACKUP_TIME);
        assert!(loaded.tool_timeout().is_none());
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let mut config = AppConfig::default();
        config.backup.retention_days = 0;
        assert!(matches!(config.validate(), Err(VaultError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_retention() {
        let mut config = AppConfig::default();
        config.backup.retention_days = u32::MAX;
        assert!(matches!(config.validate(), Err(VaultError::Validation(_))));

        config.backup.retention_days = backup::MAX_RETENTION_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(
            parse_time_of_day("02:30").unwrap(),
            NaiveTime::from_hms_opt(2, 30, 0).unwrap()
        );
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("2am").is_err());
    }
}
