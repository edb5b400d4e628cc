//! Notion REST access: the client seam, schema extraction and property formatting.

pub mod client;
pub mod properties;
pub mod schema;

pub use client::NotionClient;
pub use properties::{build_page_properties, format_property, PageProperties};
pub use schema::{parse_database, DatabaseSchema};

use crate::errors::AppResult;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Notion rejects page creation and block appends with more than 100 children.
pub const MAX_BLOCKS_PER_REQUEST: usize = 100;

#[async_trait]
pub trait NotionApi: Send + Sync {
    async fn retrieve_database(&self, api_key: &str, database_id: &str) -> AppResult<DatabaseSchema>;

    /// Returns the id of the created page.
    async fn create_page(
        &self,
        api_key: &str,
        database_id: &str,
        properties: Map<String, Value>,
        children: Vec<Value>,
    ) -> AppResult<String>;

    async fn append_blocks(&self, api_key: &str, block_id: &str, children: Vec<Value>) -> AppResult<()>;
}

/// Creates the page with the first batch of blocks and appends the rest in
/// batches. Append failures are logged and do not fail the page.
pub async fn create_page_with_blocks(
    notion: &dyn NotionApi,
    api_key: &str,
    database_id: &str,
    properties: Map<String, Value>,
    mut blocks: Vec<Value>,
) -> AppResult<(String, usize)> {
    let total = blocks.len();
    let remaining = if blocks.len() > MAX_BLOCKS_PER_REQUEST {
        blocks.split_off(MAX_BLOCKS_PER_REQUEST)
    } else {
        Vec::new()
    };

    let page_id = notion.create_page(api_key, database_id, properties, blocks).await?;

    for (batch_index, batch) in remaining.chunks(MAX_BLOCKS_PER_REQUEST).enumerate() {
        if let Err(error) = notion.append_blocks(api_key, &page_id, batch.to_vec()).await {
            tracing::warn!(
                page_id = %page_id,
                batch = batch_index + 1,
                error = %error,
                "failed to append block batch"
            );
        }
    }

    Ok((page_id, total))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{DatabaseSchema, NotionApi};
    use crate::errors::{AppError, AppResult};
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::Mutex;

    /// In-memory Notion double recording every write.
    #[derive(Default)]
    pub struct FakeNotion {
        pub schema: Mutex<Option<DatabaseSchema>>,
        pub pages: Mutex<Vec<(Map<String, Value>, Vec<Value>)>>,
        pub appended: Mutex<Vec<usize>>,
        pub fail_appends: bool,
    }

    impl FakeNotion {
        pub fn with_schema(schema: DatabaseSchema) -> Self {
            Self {
                schema: Mutex::new(Some(schema)),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl NotionApi for FakeNotion {
        async fn retrieve_database(&self, api_key: &str, _database_id: &str) -> AppResult<DatabaseSchema> {
            if api_key == "bad-key" {
                return Err(AppError::Notion("API token is invalid.".to_string()));
            }
            self.schema
                .lock()
                .map_err(|_| AppError::Internal("fake lock poisoned".to_string()))?
                .clone()
                .ok_or_else(|| AppError::Notion("Could not find database".to_string()))
        }

        async fn create_page(
            &self,
            _api_key: &str,
            _database_id: &str,
            properties: Map<String, Value>,
            children: Vec<Value>,
        ) -> AppResult<String> {
            let mut pages = self
                .pages
                .lock()
                .map_err(|_| AppError::Internal("fake lock poisoned".to_string()))?;
            pages.push((properties, children));
            Ok(format!("page-{}", pages.len()))
        }

        async fn append_blocks(&self, _api_key: &str, _block_id: &str, children: Vec<Value>) -> AppResult<()> {
            if self.fail_appends {
                return Err(AppError::Notion("append rejected".to_string()));
            }
            self.appended
                .lock()
                .map_err(|_| AppError::Internal("fake lock poisoned".to_string()))?
                .push(children.len());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeNotion;
    use super::{create_page_with_blocks, DatabaseSchema};
    use serde_json::{json, Map};

    fn blocks(count: usize) -> Vec<serde_json::Value> {
        (0..count).map(|n| json!({ "n": n })).collect()
    }

    #[tokio::test]
    async fn large_pages_are_appended_in_batches() {
        let notion = FakeNotion::with_schema(DatabaseSchema::default());
        let (page_id, total) = create_page_with_blocks(&notion, "k", "db", Map::new(), blocks(250))
            .await
            .expect("create");
        assert_eq!(page_id, "page-1");
        assert_eq!(total, 250);
        assert_eq!(notion.pages.lock().expect("lock")[0].1.len(), 100);
        assert_eq!(*notion.appended.lock().expect("lock"), vec![100, 50]);
    }

    #[tokio::test]
    async fn append_failures_do_not_fail_the_page() {
        let notion = FakeNotion {
            fail_appends: true,
            ..FakeNotion::default()
        };
        let (page_id, total) = create_page_with_blocks(&notion, "k", "db", Map::new(), blocks(101))
            .await
            .expect("create");
        assert_eq!(page_id, "page-1");
        assert_eq!(total, 101);
    }
}
