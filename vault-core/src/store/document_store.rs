use super::{CollectionAccessor, CollectionRegistry, prepare_document};
use crate::Result;
use crate::constants::scope::{SUB_TENANT_FIELD, TENANT_FIELD};
use crate::scope::{DocumentFilter, validate_collection_name};
use async_trait::async_trait;
use duckdb::{Connection, Result as DuckResult, params, params_from_iter};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const MAX_RETRIES: usize = 3;

/// 基于 DuckDB 的文档存储
///
/// 所有集合共用一张 `documents` 表，租户字段冗余成列。
/// - 单一连接 + Mutex，读写均串行
/// - DuckDB 调用在 `spawn_blocking` 线程上执行
/// - 冲突类错误按退避重试
#[derive(Clone)]
pub struct DocumentStore {
    connection: Arc<Mutex<Connection>>,
}

impl DocumentStore {
    /// 打开文件存储
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let connection = Connection::open(&path)?;
        debug!("文档存储已打开: {}", path.display());

        let store = Self {
            connection: Arc::new(Mutex::new(connection)),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// 内存存储（主要用于测试）
    pub async fn new_memory() -> Result<Self> {
        let store = Self {
            connection: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// 获取集合访问器
    pub fn collection(&self, name: &str) -> Result<DuckDbCollection> {
        validate_collection_name(name)?;
        Ok(DuckDbCollection {
            store: self.clone(),
            name: name.to_string(),
        })
    }

    /// 为给定集合名构造登记表
    pub fn registry<I, S>(&self, names: I) -> Result<CollectionRegistry>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = CollectionRegistry::new();
        for name in names {
            registry.insert(Arc::new(self.collection(name.as_ref())?));
        }
        Ok(registry)
    }

    /// 已有数据的集合名
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT collection FROM documents ORDER BY collection")?;
            let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
            names.collect()
        })
        .await
    }

    async fn initialize_schema(&self) -> Result<()> {
        let schema_sql = include_str!("../../migrations/init_documents.sql");

        self.execute(move |conn| {
            for statement in schema_sql.split(';') {
                let is_only_comments = statement
                    .lines()
                    .map(str::trim)
                    .all(|line| line.is_empty() || line.starts_with("--"));
                if !is_only_comments {
                    conn.execute(statement.trim(), [])?;
                }
            }
            Ok(())
        })
        .await?;

        debug!("文档存储表结构初始化完成");
        Ok(())
    }

    /// 在阻塞线程上执行数据库操作，冲突时退避重试
    async fn execute<F, R>(&self, operation: F) -> Result<R>
    where
        F: Fn(&Connection) -> DuckResult<R> + Send + Sync + 'static,
        R: Send + 'static,
    {
        let operation = Arc::new(operation);
        let mut retry_count = 0;

        loop {
            let connection = Arc::clone(&self.connection);
            let op = Arc::clone(&operation);
            let result = tokio::task::spawn_blocking(move || {
                let conn = connection.lock().unwrap_or_else(PoisonError::into_inner);
                op(&conn)
            })
            .await?;

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let error_msg = e.to_string();

                    if Self::is_retryable_error(&error_msg) && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        let delay = Duration::from_millis(100 * (1 << retry_count));
                        warn!(
                            "文档存储操作冲突，{}ms后重试 ({}/{}): {}",
                            delay.as_millis(),
                            retry_count,
                            MAX_RETRIES,
                            error_msg
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    error!("文档存储操作失败: {}", error_msg);
                    return Err(e.into());
                }
            }
        }
    }

    fn is_retryable_error(error_msg: &str) -> bool {
        error_msg.contains("write-write conflict")
            || error_msg.contains("database is locked")
            || error_msg.contains("database is busy")
    }

    async fn count(&self, collection: &str, filter: &DocumentFilter) -> Result<u64> {
        // 仅含租户字段的条件直接在列上统计，其余条件需要解析文档
        let Some(conditions) = column_conditions(filter) else {
            return Ok(self.find(collection, filter).await?.len() as u64);
        };

        let (sql, args) = select_sql("COUNT(*)", collection, &conditions);
        let count: i64 = self
            .execute(move |conn| {
                conn.query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn find(&self, collection: &str, filter: &DocumentFilter) -> Result<Vec<Value>> {
        let conditions = column_conditions(filter).unwrap_or_default();
        let (sql, args) = select_sql("body", collection, &conditions);

        let bodies: Vec<String> = self
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!("{sql} ORDER BY rowid"))?;
                let rows = stmt.query_map(params_from_iter(args.iter()), |row| row.get(0))?;
                rows.collect()
            })
            .await?;

        let mut documents = Vec::with_capacity(bodies.len());
        for body in bodies {
            let document: Value = serde_json::from_str(&body)?;
            if filter.matches(&document) {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    async fn insert_many(&self, collection: &str, documents: Vec<Value>) -> Result<u64> {
        let mut rows = Vec::with_capacity(documents.len());
        for document in documents {
            let (id, document) = prepare_document(document)?;
            rows.push(DocumentRow {
                collection: collection.to_string(),
                tenant_id: string_field(&document, TENANT_FIELD),
                sub_tenant_id: string_field(&document, SUB_TENANT_FIELD),
                body: serde_json::to_string(&document)?,
                id,
            });
        }

        if rows.is_empty() {
            return Ok(0);
        }

        let inserted = self
            .execute(move |conn| {
                conn.execute_batch("BEGIN TRANSACTION")?;
                match insert_rows(conn, &rows) {
                    Ok(count) => {
                        conn.execute_batch("COMMIT")?;
                        Ok(count)
                    }
                    Err(e) => {
                        let _ = conn.execute_batch("ROLLBACK");
                        Err(e)
                    }
                }
            })
            .await?;

        info!(collection, inserted, "文档写入完成");
        Ok(inserted as u64)
    }
}

struct DocumentRow {
    collection: String,
    id: String,
    tenant_id: Option<String>,
    sub_tenant_id: Option<String>,
    body: String,
}

fn insert_rows(conn: &Connection, rows: &[DocumentRow]) -> DuckResult<usize> {
    let mut stmt = conn.prepare(
        "INSERT INTO documents (collection, doc_id, tenant_id, sub_tenant_id, body) \
         VALUES (?, ?, ?, ?, ?)",
    )?;
    for row in rows {
        stmt.execute(params![
            row.collection,
            row.id,
            row.tenant_id,
            row.sub_tenant_id,
            row.body
        ])?;
    }
    Ok(rows.len())
}

fn string_field(document: &Value, field: &str) -> Option<String> {
    document.get(field).and_then(Value::as_str).map(str::to_string)
}

/// 可以直接下推到列上的条件；包含其他字段时返回 None
fn column_conditions(filter: &DocumentFilter) -> Option<Vec<(&'static str, String)>> {
    filter
        .fields()
        .map(|(field, value)| {
            let column = match field.as_str() {
                TENANT_FIELD => "tenant_id",
                SUB_TENANT_FIELD => "sub_tenant_id",
                _ => return None,
            };
            value.as_str().map(|v| (column, v.to_string()))
        })
        .collect()
}

fn select_sql(
    projection: &str,
    collection: &str,
    conditions: &[(&'static str, String)],
) -> (String, Vec<String>) {
    let mut sql = format!("SELECT {projection} FROM documents WHERE collection = ?");
    let mut args = vec![collection.to_string()];
    for (column, value) in conditions {
        sql.push_str(&format!(" AND {column} = ?"));
        args.push(value.clone());
    }
    (sql, args)
}

/// DuckDB 文档存储中的单个集合
#[derive(Clone)]
pub struct DuckDbCollection {
    store: DocumentStore,
    name: String,
}

#[async_trait]
impl CollectionAccessor for DuckDbCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn count(&self, filter: &DocumentFilter) -> Result<u64> {
        self.store.count(&self.name, filter).await
    }

    async fn find(&self, filter: &DocumentFilter) -> Result<Vec<Value>> {
        self.store.find(&self.name, filter).await
    }

    async fn insert_many(&self, documents: Vec<Value>) -> Result<u64> {
        self.store.insert_many(&self.name, documents).await
    }
}

impl std::fmt::Debug for DuckDbCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbCollection")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn seeded_orders(store: &DocumentStore) -> DuckDbCollection {
        let orders = store.collection("orders").unwrap();
        orders
            .insert_many(vec![
                json!({"_id": "o1", "tenant_id": "a", "sub_tenant_id": "a-1", "total": 10}),
                json!({"_id": "o2", "tenant_id": "a", "sub_tenant_id": "a-2", "total": 20}),
                json!({"_id": "o3", "tenant_id": "b", "total": 10}),
            ])
            .await
            .unwrap();
        orders
    }

    #[tokio::test]
    async fn test_count_by_tenant_columns() {
        let store = DocumentStore::new_memory().await.unwrap();
        let orders = seeded_orders(&store).await;

        assert_eq!(orders.count(&DocumentFilter::new()).await.unwrap(), 3);
        assert_eq!(
            orders
                .count(&DocumentFilter::new().with("tenant_id", "a"))
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            orders
                .count(
                    &DocumentFilter::new()
                        .with("tenant_id", "a")
                        .with("sub_tenant_id", "a-2")
                )
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_find_with_document_fields() {
        let store = DocumentStore::new_memory().await.unwrap();
        let orders = seeded_orders(&store).await;

        let found = orders
            .find(&DocumentFilter::new().with("total", 10))
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|d| d["_id"].clone()).collect();
        assert_eq!(ids, vec![json!("o1"), json!("o3")]);

        assert_eq!(
            orders
                .count(&DocumentFilter::new().with("total", 20))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = DocumentStore::new_memory().await.unwrap();
        seeded_orders(&store).await;
        let users = store.collection("users").unwrap();

        assert_eq!(users.count(&DocumentFilter::new()).await.unwrap(), 0);
        assert_eq!(store.collection_names().await.unwrap(), vec!["orders"]);
        assert!(store.collection("bad name!").is_err());
    }

    #[tokio::test]
    async fn test_invalid_document_rolls_back_nothing_written() {
        let store = DocumentStore::new_memory().await.unwrap();
        let users = store.collection("users").unwrap();

        assert!(
            users
                .insert_many(vec![json!({"name": "ok"}), json!(42)])
                .await
                .is_err()
        );
        assert_eq!(users.count(&DocumentFilter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("store.duckdb");

        {
            let store = DocumentStore::open(&path).await.unwrap();
            seeded_orders(&store).await;
        }

        let store = DocumentStore::open(&path).await.unwrap();
        let registry = store.registry(["orders", "users"]).unwrap();
        let orders = registry.get("orders").unwrap();
        assert_eq!(orders.count(&DocumentFilter::new()).await.unwrap(), 3);
        assert_eq!(registry.names(), vec!["orders", "users"]);
    }
}
