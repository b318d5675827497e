use crate::domain::models::BrainDumpItem;
use crate::infrastructure::storage::{keys, KeyValueStore};

/// Persistence for brain-dump entries under the `brainDump` storage key.
///
/// The whole list travels as one JSON document, matching how the UI
/// consumes it: it always renders the full list, never a page.
#[derive(Clone)]
pub struct BrainDumpRepository {
    store: KeyValueStore,
}

impl BrainDumpRepository {
    pub fn new(store: KeyValueStore) -> Self {
        Self { store }
    }

    /// Missing and malformed documents both read as an empty list.
    pub async fn list(&self) -> Vec<BrainDumpItem> {
        self.store
            .get_json(keys::BRAIN_DUMP)
            .await
            .unwrap_or_default()
    }

    /// Appends validated items, skipping invalid ones. Returns how many
    /// were stored.
    pub async fn append(&self, items: Vec<BrainDumpItem>) -> usize {
        let mut accepted = Vec::with_capacity(items.len());
        for item in items {
            match item.validate() {
                Ok(()) => accepted.push(item),
                Err(reason) => log::warn!("skipping invalid brain dump item: {reason}"),
            }
        }
        if accepted.is_empty() {
            return 0;
        }

        let mut current = self.list().await;
        let count = accepted.len();
        current.extend(accepted);
        if self.store.set_json(keys::BRAIN_DUMP, &current).await {
            count
        } else {
            0
        }
    }

    /// Replaces the stored list wholesale, e.g. after a sort pass
    /// reorders or reclassifies entries.
    pub async fn replace(&self, items: &[BrainDumpItem]) -> bool {
        self.store.set_json(keys::BRAIN_DUMP, &items).await
    }

    pub async fn clear(&self) -> bool {
        self.store.remove(keys::BRAIN_DUMP).await
    }
}
