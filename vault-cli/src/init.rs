use std::path::Path;
use tracing::{info, warn};
use vault_core::{Result, config::AppConfig, registry::BackupRegistry, store::DocumentStore};

/// 运行独立的初始化流程
pub async fn run_init(config_path: &Path, force: bool) -> Result<()> {
    info!("🗄️  Vault 初始化");
    info!("================");

    if !force && config_path.exists() {
        warn!("⚠️  检测到已存在的配置文件: {}", config_path.display());
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: vault-cli init --force");
        return Ok(());
    }

    info!("📋 步骤 1: 创建配置文件和目录结构");
    let config = AppConfig::default();
    config.save_to_file(config_path)?;
    info!("   ✅ 创建配置文件: {}", config_path.display());

    std::fs::create_dir_all(&config.backup.storage_dir)?;
    info!("   ✅ 创建备份目录: {}", config.backup.storage_dir);

    info!("📋 步骤 2: 初始化数据库");
    BackupRegistry::connect(&config.registry.path).await?;
    info!("   ✅ 创建备份登记库: {}", config.registry.path);
    DocumentStore::open(&config.database.store_path).await?;
    info!("   ✅ 创建文档存储: {}", config.database.store_path);

    info!("🎉 初始化完成！");
    info!("💡 下一步:");
    info!("   1. 编辑 {} 填写数据库连接和集合列表", config_path.display());
    info!("   2. 运行 vault-cli create --name first-backup 创建第一个备份");
    Ok(())
}
