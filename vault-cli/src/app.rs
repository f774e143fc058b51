use std::path::Path;
use std::sync::Arc;
use vault_core::{
    Result,
    backup::{BackupManager, BackupSettings},
    config::AppConfig,
    executor::CommandExecutor,
    metadata::MetadataCollector,
    registry::BackupRegistry,
    retention::RetentionSweeper,
    store::{CollectionRegistry, DocumentStore},
    transfer::TransferEngine,
};

use crate::cli::Commands;
use crate::commands;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub registry: BackupRegistry,
    pub store: DocumentStore,
    pub collections: CollectionRegistry,
    pub backup_manager: BackupManager,
    pub transfer: TransferEngine,
}

impl CliApp {
    /// 按命令行参数或默认查找顺序加载配置并初始化
    pub async fn new_with_config_path(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => AppConfig::load_from_file(path)?,
            None => AppConfig::find_and_load_config()?,
        };
        Self::new(config).await
    }

    pub async fn new(config: AppConfig) -> Result<Self> {
        let registry = BackupRegistry::connect(&config.registry.path).await?;
        let store = DocumentStore::open(&config.database.store_path).await?;
        let collections = store.registry(&config.database.collections)?;
        debug!(collections = ?collections.names(), "已登记业务集合");

        let executor = CommandExecutor::from_config(&config);
        if let Err(e) = executor.check_available() {
            warn!("⚠️  {}", e);
        }

        let backup_manager = BackupManager::new(
            BackupSettings::from_config(&config),
            registry.clone(),
            Arc::new(executor),
            MetadataCollector::new(collections.clone()),
        )?;
        let transfer = TransferEngine::new(collections.clone(), config.get_backup_dir());

        Ok(Self {
            config,
            registry,
            store,
            collections,
            backup_manager,
            transfer,
        })
    }

    pub fn sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(self.registry.clone())
    }

    /// 运行应用命令
    pub async fn run_command(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Init { .. } => unreachable!(), // 已经在 main.rs 中处理
            Commands::Create {
                name,
                description,
                scope,
                tenant,
                sub_tenant,
                collections,
                by,
            } => {
                let request = commands::build_request(
                    name,
                    description,
                    scope,
                    tenant,
                    sub_tenant,
                    collections,
                );
                commands::run_create(self, request, by).await
            }
            Commands::List { all, json } => commands::run_list(self, all, json).await,
            Commands::Show { backup_id, json } => commands::run_show(self, backup_id, json).await,
            Commands::Restore {
                backup_id,
                drop,
                by,
            } => commands::run_restore(self, backup_id, drop, by).await,
            Commands::Delete { backup_id } => commands::run_delete(self, backup_id).await,
            Commands::Download { backup_id, output } => {
                commands::run_download(self, backup_id, output).await
            }
            Commands::Verify { backup_id } => commands::run_verify(self, backup_id).await,
            Commands::Export {
                collections,
                format,
                filters,
            } => commands::run_export(self, collections, &format, filters).await,
            Commands::Import { file } => commands::run_import(self, &file).await,
            Commands::Sweep => commands::run_sweep(self).await,
            Commands::Daemon => commands::run_daemon(self).await,
        }
    }
}
