use crate::registry::{BackupMetadata, CollectionCount};
use crate::scope::ScopeFilter;
use crate::store::CollectionRegistry;
use tracing::{debug, warn};

/// 备份元数据收集器
///
/// 按与导出相同的作用域条件统计各集合记录数。统计结果仅供展示，
/// 单个集合出错时跳过该集合，不影响备份本身。
#[derive(Debug, Clone, Default)]
pub struct MetadataCollector {
    collections: CollectionRegistry,
}

impl MetadataCollector {
    pub fn new(collections: CollectionRegistry) -> Self {
        Self { collections }
    }

    pub async fn collect(&self, filter: &ScopeFilter) -> BackupMetadata {
        let known = self.collections.names();
        let document_filter = filter.document_filter();
        let mut metadata = BackupMetadata::default();

        for name in filter.select_collections(&known) {
            let accessor = match self.collections.get(&name) {
                Ok(accessor) => accessor,
                Err(e) => {
                    warn!(collection = %name, error = %e, "跳过未登记的集合");
                    continue;
                }
            };

            match accessor.count(&document_filter).await {
                Ok(count) => {
                    metadata.total_records += count;
                    metadata.collections.push(CollectionCount { name, count });
                }
                Err(e) => {
                    warn!(collection = %name, error = %e, "集合记录数统计失败");
                }
            }
        }

        debug!(
            collections = metadata.collections.len(),
            total = metadata.total_records,
            "元数据收集完成"
        );
        metadata
    }
}
