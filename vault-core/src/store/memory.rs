use super::{CollectionAccessor, prepare_document};
use crate::Result;
use crate::scope::DocumentFilter;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

/// 内存集合
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Value>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_documents(name, Vec::new())
    }

    pub fn with_documents(name: impl Into<String>, documents: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(documents),
        }
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl CollectionAccessor for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn count(&self, filter: &DocumentFilter) -> Result<u64> {
        let documents = self.documents.read().await;
        Ok(documents.iter().filter(|doc| filter.matches(doc)).count() as u64)
    }

    async fn find(&self, filter: &DocumentFilter) -> Result<Vec<Value>> {
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, documents: Vec<Value>) -> Result<u64> {
        // 先全部校验，避免插入一半
        let prepared = documents
            .into_iter()
            .map(|doc| prepare_document(doc).map(|(_, doc)| doc))
            .collect::<Result<Vec<_>>>()?;

        let inserted = prepared.len() as u64;
        self.documents.write().await.extend(prepared);
        Ok(inserted)
    }
}
