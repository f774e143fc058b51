//! 外部导出/恢复工具的调用
//!
//! 成功与否只看子进程退出码，不解析输出内容。
//!
//! 导出工具每次只接受一个带查询条件的集合，因此按集合逐个导出到暂存目录，
//! 再把整个目录打包为一个 tar.gz 备份文件；恢复时解包后整体交给恢复工具。

use crate::config::AppConfig;
use crate::constants::tools::{DUMP_DIR_NAME, STDERR_TAIL_CHARS};
use crate::scope::ScopeFilter;
use crate::{Result, VaultError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

static URI_CREDENTIALS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*://)(?P<user>[^:/@\s]+):(?P<pass>[^@/\s]+)@")
        .expect("静态正则必须合法")
});

/// 隐藏文本中连接地址携带的密码
pub fn redact(text: &str) -> String {
    URI_CREDENTIALS
        .replace_all(text, "${scheme}${user}:****@")
        .into_owned()
}

/// 导出/恢复的连接目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpTarget {
    pub uri: String,
    pub db_name: String,
}

impl DumpTarget {
    pub fn new(uri: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            db_name: db_name.into(),
        }
    }

    /// 可安全写入日志的连接地址
    pub fn redacted_uri(&self) -> String {
        redact(&self.uri)
    }

    /// 恢复互斥锁的键
    pub fn lock_key(&self) -> String {
        format!("{}/{}", self.uri, self.db_name)
    }
}

/// 恢复选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// 恢复前清空目标中的同名集合
    pub drop_existing: bool,
}

/// 导出/恢复执行器
#[async_trait]
pub trait DumpExecutor: Send + Sync {
    /// 按作用域过滤导出为压缩归档
    async fn dump(&self, target: &DumpTarget, output: &Path, filter: &ScopeFilter) -> Result<()>;

    /// 从压缩归档恢复
    async fn restore(
        &self,
        target: &DumpTarget,
        archive: &Path,
        options: &RestoreOptions,
    ) -> Result<()>;
}

/// 基于子进程的执行器
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    dump_program: String,
    restore_program: String,
    /// 按租户导出时逐个导出的集合
    collections: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new(
        dump_program: impl Into<String>,
        restore_program: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            dump_program: dump_program.into(),
            restore_program: restore_program.into(),
            collections: Vec::new(),
            timeout,
        }
    }

    pub fn with_collections(mut self, collections: Vec<String>) -> Self {
        self.collections = collections;
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.tools.dump_program.clone(),
            config.tools.restore_program.clone(),
            config.tool_timeout(),
        )
        .with_collections(config.database.collections.clone())
    }

    /// 检查导出与恢复工具是否在 PATH 中
    pub fn check_available(&self) -> Result<()> {
        for program in [&self.dump_program, &self.restore_program] {
            if which::which(program).is_err() {
                return Err(VaultError::execution(format!(
                    "{program} 未安装或不在 PATH 中"
                )));
            }
        }
        Ok(())
    }

    /// 导出命令参数，每个元素是一次导出工具调用
    ///
    /// 全量导出整个库；指定集合时每个集合一次；按租户过滤时对每个已登记集合带查询条件导出一次。
    pub fn dump_commands(
        &self,
        target: &DumpTarget,
        out_dir: &Path,
        filter: &ScopeFilter,
    ) -> Result<Vec<Vec<String>>> {
        let base = || {
            vec![
                format!("--uri={}", target.uri),
                format!("--db={}", target.db_name),
                format!("--out={}", out_dir.display()),
            ]
        };

        match filter {
            ScopeFilter::All => Ok(vec![base()]),
            ScopeFilter::Collections(names) => Ok(names
                .iter()
                .map(|name| {
                    let mut args = base();
                    args.push(format!("--collection={name}"));
                    args
                })
                .collect()),
            ScopeFilter::Query(query) => {
                if self.collections.is_empty() {
                    return Err(VaultError::validation(
                        "database.collections 为空，无法按租户导出",
                    ));
                }
                let query = query.to_query_json();
                Ok(self
                    .collections
                    .iter()
                    .map(|name| {
                        let mut args = base();
                        args.push(format!("--collection={name}"));
                        args.push(format!("--query={query}"));
                        args
                    })
                    .collect())
            }
        }
    }

    /// 恢复命令参数
    pub fn restore_args(
        target: &DumpTarget,
        dump_dir: &Path,
        options: &RestoreOptions,
    ) -> Vec<String> {
        let mut args = vec![
            format!("--uri={}", target.uri),
            format!("--dir={}", dump_dir.display()),
        ];
        if options.drop_existing {
            args.push("--drop".to_string());
        }
        args
    }

    /// 运行外部命令，非零退出码视为失败
    async fn run(&self, program: &str, args: Vec<String>) -> Result<()> {
        let command_line = redact(&format!("{} {}", program, args.join(" ")));
        info!(command = %command_line, "执行外部命令");

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VaultError::execution(format!("无法启动 {program}: {e}")))?;

        let wait = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                VaultError::execution(format!("{program} 执行超时（{}秒）", limit.as_secs()))
            })?,
            None => wait.await,
        }
        .map_err(|e| VaultError::execution(format!("等待 {program} 退出失败: {e}")))?;

        if output.status.success() {
            debug!(command = %command_line, "外部命令执行成功");
            return Ok(());
        }

        let stderr = redact(&tail(&String::from_utf8_lossy(&output.stderr)));
        error!(command = %command_line, status = %output.status, "外部命令执行失败");
        Err(VaultError::execution(format!(
            "{program} 退出状态 {}: {}",
            output.status,
            stderr.trim()
        )))
    }

    async fn dump_into(
        &self,
        target: &DumpTarget,
        staging: &Path,
        output: &Path,
        filter: &ScopeFilter,
    ) -> Result<()> {
        let dump_dir = staging.join(DUMP_DIR_NAME);
        tokio::fs::create_dir_all(&dump_dir).await?;

        for args in self.dump_commands(target, &dump_dir, filter)? {
            self.run(&self.dump_program, args).await?;
        }
        pack_dump(&dump_dir, output).await
    }

    async fn restore_from(
        &self,
        target: &DumpTarget,
        staging: &Path,
        archive: &Path,
        options: &RestoreOptions,
    ) -> Result<()> {
        unpack_dump(archive, staging).await?;
        let args = Self::restore_args(target, &staging.join(DUMP_DIR_NAME), options);
        self.run(&self.restore_program, args).await
    }
}

/// 保留末尾的若干字符
fn tail(text: &str) -> String {
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text.to_string();
    }
    text.chars().skip(count - STDERR_TAIL_CHARS).collect()
}

/// 备份文件旁的暂存目录，如 `backup_app_1.gz` 对应 `backup_app_1.gz.<suffix>`
fn staging_dir(file: &Path, suffix: &str) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(format!(".{suffix}"));
    PathBuf::from(name)
}

async fn remove_staging(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %dir.display(), error = %e, "清理暂存目录失败"),
    }
}

/// 把导出目录打包为 tar.gz，归档内的根目录名为 `dump`
pub async fn pack_dump(dump_dir: &Path, output: &Path) -> Result<()> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs::File;
    use tar::Builder;

    let dump_dir = dump_dir.to_path_buf();
    let output = output.to_path_buf();

    // 在后台线程中执行压缩操作，避免阻塞异步运行时
    tokio::task::spawn_blocking(move || {
        let file = File::create(&output)?;
        let mut archive = Builder::new(GzEncoder::new(file, Compression::default()));
        archive.append_dir_all(DUMP_DIR_NAME, &dump_dir)?;
        archive.into_inner()?.finish()?;
        Ok::<(), VaultError>(())
    })
    .await??;

    Ok(())
}

/// 解包 `pack_dump` 生成的备份文件到 `target_dir`
pub async fn unpack_dump(archive: &Path, target_dir: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use std::fs::File;
    use tar::Archive;

    tokio::fs::create_dir_all(target_dir).await?;
    let archive = archive.to_path_buf();
    let target_dir = target_dir.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let file = File::open(&archive)?;
        Archive::new(GzDecoder::new(file)).unpack(&target_dir)?;
        Ok::<(), VaultError>(())
    })
    .await??;

    Ok(())
}

#[async_trait]
impl DumpExecutor for CommandExecutor {
    async fn dump(&self, target: &DumpTarget, output: &Path, filter: &ScopeFilter) -> Result<()> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = staging_dir(output, "staging");
        let result = self.dump_into(target, &staging, output, filter).await;
        remove_staging(&staging).await;
        result
    }

    async fn restore(
        &self,
        target: &DumpTarget,
        archive: &Path,
        options: &RestoreOptions,
    ) -> Result<()> {
        let staging = staging_dir(archive, "restore");
        let result = self.restore_from(target, &staging, archive, options).await;
        remove_staging(&staging).await;
        result
    }
}
