use crate::app::CliApp;
use crate::cli::ScopeArg;
use crate::utils::{format_size, format_time};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use vault_core::{
    Result,
    backup::CreateBackupRequest,
    executor::RestoreOptions,
    registry::{BackupRecord, BackupStatus, BackupType},
};

/// 创建备份时的轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 由命令行参数组装创建请求，参数是否匹配作用域由核心库校验
pub fn build_request(
    name: String,
    description: Option<String>,
    scope: ScopeArg,
    tenant: Option<String>,
    sub_tenant: Option<String>,
    collections: Vec<String>,
) -> CreateBackupRequest {
    CreateBackupRequest {
        name,
        description,
        backup_type: BackupType::Manual,
        scope: scope.into(),
        tenant_ref: tenant,
        sub_tenant_ref: sub_tenant,
        collections: collections
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
    }
}

/// 创建备份
///
/// 备份在后台任务中处理，这里轮询到终态为止，进程退出会中断处理。
pub async fn run_create(
    app: &CliApp,
    request: CreateBackupRequest,
    requested_by: Option<String>,
) -> Result<()> {
    info!("💾 创建数据备份");
    info!("===============");

    let record = app
        .backup_manager
        .create(request, requested_by.as_deref())
        .await?;
    info!("   备份ID: {}", record.id);
    info!("   作用域: {}", describe_scope(&record));
    info!("   过期时间: {}", format_time(record.expires_at));

    let mut last_status = record.status;
    let record = loop {
        tokio::time::sleep(POLL_INTERVAL).await;
        let current = app.backup_manager.get(record.id).await?;
        if current.status != last_status {
            info!("   状态: {} → {}", last_status, current.status);
            last_status = current.status;
        }
        if matches!(current.status, BackupStatus::Completed | BackupStatus::Failed) {
            break current;
        }
    };

    if record.status == BackupStatus::Completed {
        info!("🎉 备份创建成功！");
        print_artifact(&record);
        Ok(())
    } else {
        let reason = record.error.clone().unwrap_or_default();
        error!("❌ 备份失败: {}", reason);
        Err(vault_core::VaultError::execution(reason))
    }
}

/// 列出备份
pub async fn run_list(app: &CliApp, include_inactive: bool, json: bool) -> Result<()> {
    let backups = app.backup_manager.list(include_inactive).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&backups)?);
        return Ok(());
    }

    if backups.is_empty() {
        info!("📦 暂无备份");
        return Ok(());
    }

    info!("📦 备份列表（共 {} 个）", backups.len());
    info!(
        "{:<6} {:<12} {:<10} {:<24} {:<10} {:<20} 名称",
        "ID", "状态", "类型", "作用域", "大小", "创建时间"
    );
    for record in &backups {
        let size = record
            .artifact
            .as_ref()
            .map(|a| format_size(a.size_bytes))
            .unwrap_or_else(|| "-".to_string());
        let status = if record.is_active {
            record.status.to_string()
        } else {
            format!("{}(已删除)", record.status)
        };
        info!(
            "{:<6} {:<12} {:<10} {:<24} {:<10} {:<20} {}",
            record.id,
            status,
            record.backup_type,
            describe_scope(record),
            size,
            format_time(record.created_at),
            record.name
        );
    }
    Ok(())
}

/// 显示备份详情
pub async fn run_show(app: &CliApp, backup_id: i64, json: bool) -> Result<()> {
    let record = app.backup_manager.get(backup_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    info!("📋 备份 {}: {}", record.id, record.name);
    if let Some(description) = &record.description {
        info!("   说明: {}", description);
    }
    info!("   状态: {}", record.status);
    info!("   类型: {}", record.backup_type);
    info!("   作用域: {}", describe_scope(&record));
    info!(
        "   创建: {} ({})",
        format_time(record.created_at),
        record.created_by.as_deref().unwrap_or("系统")
    );
    info!("   过期: {}", format_time(record.expires_at));
    if !record.is_active {
        info!("   ⚠️  已删除");
    }
    if let Some(duration) = record.duration_ms {
        info!("   耗时: {} ms", duration);
    }
    if let Some(error) = &record.error {
        warn!("   错误: {}", error);
    }
    print_artifact(&record);
    if let Some(metadata) = &record.metadata {
        info!("   记录数: {}", metadata.total_records);
        for collection in &metadata.collections {
            info!("      - {}: {}", collection.name, collection.count);
        }
    }
    if let Some(restored_at) = record.restored_at {
        info!(
            "   恢复: {} ({})",
            format_time(restored_at),
            record.restored_by.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// 从备份恢复
pub async fn run_restore(
    app: &CliApp,
    backup_id: i64,
    drop_existing: bool,
    requested_by: Option<String>,
) -> Result<()> {
    info!("🔄 从备份恢复");
    info!("=============");
    if drop_existing {
        warn!("⚠️  将在恢复前清空目标中的同名集合");
    }

    let record = app
        .backup_manager
        .restore(
            backup_id,
            RestoreOptions { drop_existing },
            requested_by.as_deref(),
        )
        .await?;

    info!("✅ 恢复完成: 备份 {} ({})", record.id, record.name);
    Ok(())
}

/// 删除备份
pub async fn run_delete(app: &CliApp, backup_id: i64) -> Result<()> {
    let record = app.backup_manager.delete(backup_id).await?;
    info!("🗑️  备份 {} 已删除", record.id);
    Ok(())
}

/// 获取备份文件
pub async fn run_download(app: &CliApp, backup_id: i64, output: Option<PathBuf>) -> Result<()> {
    let path = app.backup_manager.download(backup_id).await?;

    match output {
        Some(output) => {
            let bytes = tokio::fs::copy(&path, &output).await?;
            info!(
                "📥 已复制 {} → {} ({})",
                path.display(),
                output.display(),
                format_size(bytes)
            );
        }
        None => println!("{}", path.display()),
    }
    Ok(())
}

/// 校验备份文件
pub async fn run_verify(app: &CliApp, backup_id: i64) -> Result<()> {
    if app.backup_manager.verify(backup_id).await? {
        info!("✅ 备份 {} 校验通过", backup_id);
        Ok(())
    } else {
        Err(vault_core::VaultError::precondition(format!(
            "备份 {backup_id} 的文件与记录的校验和不一致"
        )))
    }
}

fn describe_scope(record: &BackupRecord) -> String {
    match (&record.tenant_ref, &record.sub_tenant_ref) {
        _ if !record.collections.is_empty() => {
            format!("{}[{}]", record.scope, record.collections.join(","))
        }
        (Some(tenant), Some(sub)) => format!("{}({tenant}/{sub})", record.scope),
        (Some(tenant), None) => format!("{}({tenant})", record.scope),
        (None, Some(sub)) => format!("{}({sub})", record.scope),
        (None, None) => record.scope.to_string(),
    }
}

fn print_artifact(record: &BackupRecord) {
    if let Some(artifact) = &record.artifact {
        info!("   备份文件: {}", artifact.path);
        info!("   文件大小: {}", format_size(artifact.size_bytes));
        info!("   SHA256: {}", artifact.checksum);
    }
}
