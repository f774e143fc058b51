//! 每日定时任务：自动备份与过期清理
//!
//! 两个任务各自独立运行，仅通过登记库共享状态，由同一个取消令牌控制停止。

use crate::Result;
use crate::backup::{BackupManager, CreateBackupRequest};
use crate::config::{AppConfig, parse_time_of_day};
use crate::registry::{BackupRecord, BackupType};
use crate::retention::RetentionSweeper;
use chrono::{DateTime, Local, NaiveTime, TimeZone, Utc};
use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// 每天固定时刻（本地时间）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    /// 解析 `HH:MM`
    pub fn parse(value: &str) -> Result<Self> {
        Ok(Self::new(parse_time_of_day(value)?))
    }

    pub fn time(&self) -> NaiveTime {
        self.at
    }

    /// 严格晚于 `now` 的下一次运行时间
    ///
    /// 夏令时跳过的时刻顺延到下一天。
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let mut date = now.date_naive();
        loop {
            if let Some(candidate) = date
                .and_time(self.at)
                .and_local_timezone(tz.clone())
                .earliest()
            {
                if candidate > *now {
                    return candidate;
                }
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => return now.clone() + chrono::Duration::days(1),
            };
        }
    }
}

/// 执行一次定时备份：全量、系统发起，同步等待处理完成
#[instrument(skip(manager))]
pub async fn run_scheduled_backup(manager: &BackupManager) -> Result<BackupRecord> {
    let name = format!("daily_{}", Local::now().format("%Y%m%d"));
    let request = CreateBackupRequest::full(name)
        .with_description("每日定时备份")
        .with_type(BackupType::Automatic);

    let record = manager.create_pending(request, None).await?;
    manager.process_backup(record.id).await
}

/// 定时任务调度器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    backup_at: DailySchedule,
    retention_at: DailySchedule,
}

impl Scheduler {
    pub fn new(backup_at: DailySchedule, retention_at: DailySchedule) -> Self {
        Self {
            backup_at,
            retention_at,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            DailySchedule::parse(&config.schedule.backup_time)?,
            DailySchedule::parse(&config.schedule.retention_time)?,
        ))
    }

    /// 启动两个定时任务
    pub fn start(self, manager: BackupManager, sweeper: RetentionSweeper) -> SchedulerHandle {
        let cancel_token = CancellationToken::new();

        let backup_task = tokio::spawn(run_daily(
            "scheduled_backup",
            self.backup_at,
            cancel_token.clone(),
            move || {
                let manager = manager.clone();
                async move {
                    match run_scheduled_backup(&manager).await {
                        Ok(record) => {
                            info!(backup_id = record.id, status = %record.status, "定时备份结束")
                        }
                        Err(e) => error!(error = %e, "定时备份执行失败"),
                    }
                }
            },
        ));

        let retention_task = tokio::spawn(run_daily(
            "retention_sweep",
            self.retention_at,
            cancel_token.clone(),
            move || {
                let sweeper = sweeper.clone();
                async move {
                    if let Err(e) = sweeper.sweep(Utc::now()).await {
                        error!(error = %e, "过期备份清理失败");
                    }
                }
            },
        ));

        info!(
            backup_at = %self.backup_at.time(),
            retention_at = %self.retention_at.time(),
            "定时任务已启动"
        );

        SchedulerHandle {
            cancel_token,
            tasks: vec![backup_task, retention_task],
        }
    }
}

/// 运行中的定时任务
#[derive(Debug)]
pub struct SchedulerHandle {
    cancel_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 停止定时任务并等待退出，正在执行的任务会先运行完
    pub async fn stop(self) {
        self.cancel_token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "定时任务异常退出");
            }
        }
        info!("定时任务已停止");
    }
}

async fn run_daily<F, Fut>(
    job: &'static str,
    schedule: DailySchedule,
    cancel_token: CancellationToken,
    run: F,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let now = Local::now();
        let next = schedule.next_after(&now);
        let delay = next.signed_duration_since(now).to_std().unwrap_or_default();
        info!(job, next_run = %next, "下次运行时间");

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {
                info!(job, "开始执行定时任务");
                run().await;
            }
        }
    }
}
