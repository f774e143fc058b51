//! 备份作用域到过滤条件的转换

use crate::constants::scope::{SUB_TENANT_FIELD, TENANT_FIELD};
use crate::registry::{BackupRecord, BackupScope};
use crate::{Result, VaultError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

static COLLECTION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]{0,119}$").expect("静态正则必须合法"));

/// 校验集合名
pub fn validate_collection_name(name: &str) -> Result<()> {
    if COLLECTION_NAME.is_match(name) {
        Ok(())
    } else {
        Err(VaultError::validation(format!("无效的集合名: '{name}'")))
    }
}

/// 顶层字段的等值过滤条件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentFilter(BTreeMap<String, Value>);

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// 文档是否满足全部条件
    pub fn matches(&self, document: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }

    /// 转换为导出工具可识别的 JSON 查询
    pub fn to_query_json(&self) -> String {
        let map: Map<String, Value> = self.0.clone().into_iter().collect();
        Value::Object(map).to_string()
    }

    /// 从 `key=value` 形式解析，数值与布尔会按 JSON 解析，其余视为字符串
    pub fn parse_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (field, raw) = pair
                .split_once('=')
                .ok_or_else(|| VaultError::validation(format!("无效的过滤条件: '{pair}'")))?;
            let field = field.trim();
            if field.is_empty() {
                return Err(VaultError::validation(format!("过滤条件缺少字段名: '{pair}'")));
            }
            let value = serde_json::from_str::<Value>(raw.trim())
                .ok()
                .filter(|v| !v.is_object() && !v.is_array())
                .unwrap_or_else(|| Value::String(raw.trim().to_string()));
            filter = filter.with(field, value);
        }
        Ok(filter)
    }
}

/// 作用域转换后的过滤条件
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeFilter {
    /// 全量
    All,
    /// 按租户/子租户字段过滤
    Query(DocumentFilter),
    /// 显式集合列表
    Collections(Vec<String>),
}

impl ScopeFilter {
    /// 根据作用域字段构造过滤条件
    pub fn build(
        scope: BackupScope,
        tenant_ref: Option<&str>,
        sub_tenant_ref: Option<&str>,
        collections: &[String],
    ) -> Result<Self> {
        match scope {
            BackupScope::Full => Ok(ScopeFilter::All),
            BackupScope::Tenant => {
                let tenant = tenant_ref
                    .ok_or_else(|| VaultError::validation("tenant 作用域需要 tenant_ref"))?;
                Ok(ScopeFilter::Query(
                    DocumentFilter::new().with(TENANT_FIELD, tenant),
                ))
            }
            BackupScope::SubTenant => {
                let sub_tenant = sub_tenant_ref
                    .ok_or_else(|| VaultError::validation("sub_tenant 作用域需要 sub_tenant_ref"))?;
                let mut filter = DocumentFilter::new().with(SUB_TENANT_FIELD, sub_tenant);
                if let Some(tenant) = tenant_ref {
                    filter = filter.with(TENANT_FIELD, tenant);
                }
                Ok(ScopeFilter::Query(filter))
            }
            BackupScope::Collections => {
                if collections.is_empty() {
                    return Err(VaultError::validation("collections 作用域需要至少一个集合"));
                }
                Ok(ScopeFilter::Collections(collections.to_vec()))
            }
        }
    }

    /// 从备份记录构造过滤条件
    pub fn for_record(record: &BackupRecord) -> Result<Self> {
        Self::build(
            record.scope,
            record.tenant_ref.as_deref(),
            record.sub_tenant_ref.as_deref(),
            &record.collections,
        )
    }

    /// 文档级过滤条件（集合列表作用域下为空条件）
    pub fn document_filter(&self) -> DocumentFilter {
        match self {
            ScopeFilter::Query(filter) => filter.clone(),
            ScopeFilter::All | ScopeFilter::Collections(_) => DocumentFilter::new(),
        }
    }

    /// 在已知集合中选出作用域覆盖的集合
    pub fn select_collections(&self, known: &[String]) -> Vec<String> {
        match self {
            ScopeFilter::Collections(names) => names.clone(),
            ScopeFilter::All | ScopeFilter::Query(_) => known.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tenant_scope_builds_query() {
        let filter = ScopeFilter::build(BackupScope::Tenant, Some("t-1"), None, &[]).unwrap();
        assert_eq!(
            filter,
            ScopeFilter::Query(DocumentFilter::new().with(TENANT_FIELD, "t-1"))
        );
        assert_eq!(
            filter.document_filter().to_query_json(),
            r#"{"tenant_id":"t-1"}"#
        );
    }

    #[test]
    fn test_scope_requirements() {
        assert!(ScopeFilter::build(BackupScope::Tenant, None, None, &[]).is_err());
        assert!(ScopeFilter::build(BackupScope::SubTenant, Some("t"), None, &[]).is_err());
        assert!(ScopeFilter::build(BackupScope::Collections, None, None, &[]).is_err());
        assert_eq!(
            ScopeFilter::build(BackupScope::Full, None, None, &[]).unwrap(),
            ScopeFilter::All
        );
    }

    #[test]
    fn test_select_collections() {
        let known = vec!["a".to_string(), "b".to_string()];
        let subset = ScopeFilter::Collections(vec!["b".to_string()]);
        assert_eq!(subset.select_collections(&known), vec!["b"]);
        assert_eq!(ScopeFilter::All.select_collections(&known), known);
    }

    #[test]
    fn test_document_filter_matching() {
        let filter = DocumentFilter::parse_pairs(["tenant_id=t-1", "level=3"]).unwrap();
        assert!(filter.matches(&json!({"tenant_id": "t-1", "level": 3, "x": true})));
        assert!(!filter.matches(&json!({"tenant_id": "t-1", "level": "3"})));
        assert!(!filter.matches(&json!({"level": 3})));
        assert!(DocumentFilter::parse_pairs(["missing-equals"]).is_err());
    }

    #[test]
    fn test_collection_name_validation() {
        assert!(validate_collection_name("orders").is_ok());
        assert!(validate_collection_name("audit.log-2024").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("users; DROP TABLE x").is_err());
    }
}
