use crate::app::CliApp;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;
use vault_core::{Result, VaultError, scope::DocumentFilter, transfer::ExportFormat};

/// 解析 `集合:字段=值` 形式的过滤条件，同一集合的多个条件合并
pub fn parse_filters(raw: &[String]) -> Result<BTreeMap<String, DocumentFilter>> {
    let mut grouped: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for item in raw {
        let (collection, pair) = item.split_once(':').ok_or_else(|| {
            VaultError::validation(format!("过滤条件格式应为 集合:字段=值，实际为 '{item}'"))
        })?;
        grouped
            .entry(collection.trim().to_string())
            .or_default()
            .push(pair);
    }

    grouped
        .into_iter()
        .map(|(collection, pairs)| {
            DocumentFilter::parse_pairs(pairs).map(|filter| (collection, filter))
        })
        .collect()
}

/// 导出集合
pub async fn run_export(
    app: &CliApp,
    collections: Vec<String>,
    format: &str,
    filters: Vec<String>,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let filters = parse_filters(&filters)?;

    info!("📤 导出集合: {}", collections.join(", "));
    let path = app
        .transfer
        .export_collections(&collections, format, &filters)
        .await?;
    info!("✅ 导出完成: {}", path.display());
    Ok(())
}

/// 导入集合
pub async fn run_import(app: &CliApp, file: &Path) -> Result<()> {
    info!("📥 从 {} 导入", file.display());
    let report = app.transfer.import_collections(file).await?;

    for (collection, count) in &report {
        info!("   {}: {} 条", collection, count);
    }
    info!("✅ 导入完成，共 {} 条", report.values().sum::<u64>());
    Ok(())
}
