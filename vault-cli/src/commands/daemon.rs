use crate::app::CliApp;
use crate::project_info::get_version_string;
use chrono::Utc;
use tracing::{info, instrument, warn};
use vault_core::{Result, scheduler::Scheduler};

/// 立即执行一次过期备份清理
#[instrument(skip(app))]
pub async fn run_sweep(app: &CliApp) -> Result<()> {
    info!("🧹 清理过期备份");
    let report = app.sweeper().sweep(Utc::now()).await?;

    info!(
        "✅ 清理完成: 过期 {} 个，删除文件 {} 个，失败 {} 个，跳过 {} 个",
        report.expired.len(),
        report.removed.len(),
        report.failed.len(),
        report.skipped.len()
    );
    if !report.failed.is_empty() {
        warn!("⚠️  以下备份清理失败，将在下次清理时重试: {:?}", report.failed);
    }
    Ok(())
}

/// 守护进程：回收中断的任务，然后运行每日备份与清理直到收到 Ctrl-C
#[instrument(skip(app))]
pub async fn run_daemon(app: &CliApp) -> Result<()> {
    info!("🚀 {} 守护进程启动", get_version_string());

    let recovered = app.backup_manager.recover_interrupted().await?;
    if !recovered.is_empty() {
        warn!("⚠️  已将 {} 个中断的任务标记为失败: {:?}", recovered.len(), recovered);
    }

    if !app.config.schedule.enabled {
        warn!("⚠️  定时任务未启用（schedule.enabled = false），守护进程退出");
        return Ok(());
    }

    let scheduler = Scheduler::from_config(&app.config)?;
    let handle = scheduler.start(app.backup_manager.clone(), app.sweeper());
    info!(
        "⏰ 每日备份: {}，每日清理: {}",
        app.config.schedule.backup_time, app.config.schedule.retention_time
    );

    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，正在停止定时任务...");
    handle.stop().await;
    info!("👋 守护进程已退出");
    Ok(())
}
