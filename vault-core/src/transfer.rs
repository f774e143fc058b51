//! 集合导出/导入
//!
//! 与备份登记库无关，只与备份共用存储目录。导出文件是一个 JSON 对象，
//! 键为集合名，值为该集合的文档数组。

use crate::backup::unique_millis;
use crate::constants::backup::EXPORT_PREFIX;
use crate::scope::DocumentFilter;
use crate::store::CollectionRegistry;
use crate::{Result, VaultError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// 导出格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    /// 可以解析，但暂不支持导出
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(VaultError::validation(format!("未知的导出格式: {other}"))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// 每个集合导入的文档数
pub type ImportReport = BTreeMap<String, u64>;

/// 导出/导入引擎
#[derive(Debug, Clone)]
pub struct TransferEngine {
    collections: CollectionRegistry,
    output_dir: PathBuf,
}

impl TransferEngine {
    pub fn new(collections: CollectionRegistry, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            collections,
            output_dir: output_dir.into(),
        }
    }

    /// 导出集合到 `export_<毫秒>.<格式>` 文件
    ///
    /// `filters` 按集合名提供可选的过滤条件。
    pub async fn export_collections(
        &self,
        names: &[String],
        format: ExportFormat,
        filters: &BTreeMap<String, DocumentFilter>,
    ) -> Result<PathBuf> {
        if format == ExportFormat::Csv {
            return Err(VaultError::validation("暂不支持 CSV 导出，请使用 json 格式"));
        }
        if names.is_empty() {
            return Err(VaultError::validation("至少需要指定一个集合"));
        }
        if let Some(stray) = filters.keys().find(|name| !names.contains(*name)) {
            return Err(VaultError::validation(format!(
                "过滤条件指定的集合 {stray} 不在导出列表中"
            )));
        }

        // 先解析全部集合名，未登记的集合不产生任何文件
        let accessors = names
            .iter()
            .map(|name| self.collections.get(name))
            .collect::<Result<Vec<_>>>()?;

        let empty = DocumentFilter::new();
        let mut document = Map::new();
        for accessor in accessors {
            let filter = filters.get(accessor.name()).unwrap_or(&empty);
            let found = accessor.find(filter).await?;
            debug!(collection = accessor.name(), count = found.len(), "集合导出完成");
            document.insert(accessor.name().to_string(), Value::Array(found));
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let file_name = format!("{EXPORT_PREFIX}{}.{}", unique_millis(), format.extension());
        let path = self.output_dir.join(file_name);

        let bytes = serde_json::to_vec_pretty(&Value::Object(document))?;
        let staging = path.with_extension("tmp");
        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &path).await?;

        info!("导出完成: {} ({} 字节)", path.display(), bytes.len());
        Ok(path)
    }

    /// 从导出文件导入
    ///
    /// 文件格式错误或含未登记的集合时不写入任何数据；写入过程中出错则已写入的集合保留。
    pub async fn import_collections(&self, path: &Path) -> Result<ImportReport> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::not_found(format!(
                    "导入文件不存在: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let document: Map<String, Value> = serde_json::from_slice(&bytes)?;

        let mut batches = Vec::with_capacity(document.len());
        for (name, value) in document {
            let accessor = self.collections.get(&name)?;
            let Value::Array(documents) = value else {
                return Err(VaultError::validation(format!("集合 {name} 的内容不是数组")));
            };
            batches.push((name, accessor, documents));
        }

        let mut report = ImportReport::new();
        for (name, accessor, documents) in batches {
            let inserted = accessor.insert_many(documents).await?;
            info!(collection = %name, inserted, "集合导入完成");
            report.insert(name, inserted);
        }
        Ok(report)
    }
}
