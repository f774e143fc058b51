// 业务集合访问模块
//
// 元数据统计与导入导出都通过集合名访问业务数据。集合名到访问器的映射在构造时
// 显式提供，未登记的集合名一律返回 NotFound。
//
// 主要组件：
// - CollectionAccessor: 单个集合的访问接口
// - CollectionRegistry: 集合名 → 访问器
// - MemoryCollection: 内存实现（测试与嵌入使用）
// - DocumentStore / DuckDbCollection: 基于 DuckDB 的文档存储

mod document_store;
mod memory;

pub use document_store::{DocumentStore, DuckDbCollection};
pub use memory::MemoryCollection;

use crate::constants::scope::ID_FIELD;
use crate::scope::DocumentFilter;
use crate::{Result, VaultError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// 单个集合的访问接口
#[async_trait]
pub trait CollectionAccessor: Send + Sync {
    /// 集合名
    fn name(&self) -> &str;

    /// 统计满足条件的文档数
    async fn count(&self, filter: &DocumentFilter) -> Result<u64>;

    /// 查询满足条件的文档
    async fn find(&self, filter: &DocumentFilter) -> Result<Vec<Value>>;

    /// 批量插入文档，返回插入数量
    async fn insert_many(&self, documents: Vec<Value>) -> Result<u64>;
}

/// 集合名到访问器的登记表
#[derive(Clone, Default)]
pub struct CollectionRegistry {
    accessors: BTreeMap<String, Arc<dyn CollectionAccessor>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记访问器，同名访问器会被替换
    pub fn register(mut self, accessor: Arc<dyn CollectionAccessor>) -> Self {
        self.insert(accessor);
        self
    }

    pub fn insert(&mut self, accessor: Arc<dyn CollectionAccessor>) {
        self.accessors.insert(accessor.name().to_string(), accessor);
    }

    /// 按集合名获取访问器
    pub fn get(&self, name: &str) -> Result<Arc<dyn CollectionAccessor>> {
        self.accessors
            .get(name)
            .cloned()
            .ok_or_else(|| VaultError::not_found(format!("未登记的集合: {name}")))
    }

    /// 已登记的集合名（有序）
    pub fn names(&self) -> Vec<String> {
        self.accessors.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

impl fmt::Debug for CollectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionRegistry")
            .field("collections", &self.names())
            .finish()
    }
}

/// 校验待插入文档并补齐主键，返回 (主键, 文档)
pub(crate) fn prepare_document(mut document: Value) -> Result<(String, Value)> {
    let object = document
        .as_object_mut()
        .ok_or_else(|| VaultError::validation("只能插入 JSON 对象文档"))?;

    let id = match object.get(ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Null) | None => {
            let id = Uuid::now_v7().to_string();
            object.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            id
        }
        Some(other) => other.to_string(),
    };

    Ok((id, document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_lookup() {
        let registry = CollectionRegistry::new()
            .register(Arc::new(MemoryCollection::new("users")))
            .register(Arc::new(MemoryCollection::new("orders")));

        assert_eq!(registry.names(), vec!["orders", "users"]);
        assert_eq!(registry.get("users").unwrap().name(), "users");
        assert!(matches!(
            registry.get("invoices"),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_prepare_document_assigns_id() {
        let (id, doc) = prepare_document(json!({"name": "x"})).unwrap();
        assert_eq!(doc["_id"], json!(id));

        let (id, _) = prepare_document(json!({"_id": "keep", "name": "y"})).unwrap();
        assert_eq!(id, "keep");

        assert!(prepare_document(json!([1, 2])).is_err());
    }
}
