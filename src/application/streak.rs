use crate::domain::models::{calculate_streak, StreakRecord};
use crate::infrastructure::storage::{keys, KeyValueStore};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

type TodayProvider = dyn Fn() -> NaiveDate + Send + Sync;

/// Tracks the daily usage streak against the persisted record.
pub struct StreakService {
    store: KeyValueStore,
    today: Arc<TodayProvider>,
}

impl StreakService {
    pub fn new(store: KeyValueStore) -> Self {
        Self::with_today_provider(store, || Utc::now().date_naive())
    }

    /// Test seam: the calendar day is injected so midnight boundaries
    /// can be exercised deterministically.
    pub fn with_today_provider(
        store: KeyValueStore,
        today: impl Fn() -> NaiveDate + Send + Sync + 'static,
    ) -> Self {
        Self {
            store,
            today: Arc::new(today),
        }
    }

    pub async fn current(&self) -> StreakRecord {
        self.store
            .get_json(keys::STREAK)
            .await
            .unwrap_or_default()
    }

    /// Records one use for today and returns the updated count. Calling
    /// it again on the same day is a no-op on the count.
    pub async fn record_use(&self) -> u32 {
        let today = (self.today)();
        let record = self.current().await;
        let count = calculate_streak(record.last_use_date, today, record.count);

        let updated = StreakRecord {
            last_use_date: Some(today),
            count,
        };
        if updated != record {
            self.store.set_json(keys::STREAK, &updated).await;
        }
        count
    }
}
