//! Index loader: turns fetched items into store rows.

use std::sync::Arc;

use tracing::debug;

use crate::error::LoadError;
use crate::models::ItemMetadata;
use crate::store::{ItemRecord, ItemStore};

pub struct IndexLoader {
    store: Arc<dyn ItemStore>,
}

impl IndexLoader {
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    /// Insert or replace one item under `collection`.
    ///
    /// Items without full text are rejected before anything is written.
    pub async fn load(&self, collection: &str, item: &ItemMetadata) -> Result<(), LoadError> {
        let full_text = match &item.full_text {
            Some(text) => text.clone(),
            None => return Err(LoadError::MissingText(item.id.clone())),
        };

        let record = ItemRecord {
            id: item.id.clone(),
            collection: collection.to_string(),
            title: item.title.clone(),
            image_url: item.image_url.clone(),
            date: item.date,
            year: item.year,
            full_text,
        };

        self.store
            .upsert_item(&record)
            .await
            .map_err(|source| LoadError::Store {
                id: item.id.clone(),
                source,
            })?;

        debug!(id = %item.id, collection, "indexed");
        Ok(())
    }
}
