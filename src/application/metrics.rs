use crate::infrastructure::storage::{keys, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// The event log never grows past this many entries; the oldest fall
/// off the end.
pub const MAX_METRIC_EVENTS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

type NowProvider = dyn Fn() -> DateTime<Utc> + Send + Sync;

/// Bounded usage-event log under the `uxMetricsEvents` storage key,
/// newest-first. Tracking never fails the caller; storage trouble is
/// logged by the store and the event is simply dropped.
pub struct MetricsService {
    store: KeyValueStore,
    now: Arc<NowProvider>,
}

impl MetricsService {
    pub fn new(store: KeyValueStore) -> Self {
        Self::with_now_provider(store, Utc::now)
    }

    pub fn with_now_provider(
        store: KeyValueStore,
        now: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        Self {
            store,
            now: Arc::new(now),
        }
    }

    /// Missing and malformed logs both read as empty.
    pub async fn events(&self) -> Vec<MetricEvent> {
        self.store
            .get_json(keys::UX_METRICS)
            .await
            .unwrap_or_default()
    }

    pub async fn track(&self, name: impl Into<String>, metadata: Option<Map<String, Value>>) {
        let mut events = self.events().await;
        events.insert(
            0,
            MetricEvent {
                name: name.into(),
                timestamp: (self.now)(),
                metadata,
            },
        );
        events.truncate(MAX_METRIC_EVENTS);
        self.store.set_json(keys::UX_METRICS, &events).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryStorageBackend;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn store() -> KeyValueStore {
        KeyValueStore::new(Arc::new(InMemoryStorageBackend::default()))
    }

    fn service(store: KeyValueStore) -> MetricsService {
        MetricsService::with_now_provider(store, fixed_now)
    }

    #[tokio::test]
    async fn events_are_stored_newest_first() {
        let service = service(store());
        service.track("app_opened", None).await;
        service.track("overlay_started", None).await;

        let events = service.events().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "overlay_started");
        assert_eq!(events[1].name, "app_opened");
    }

    #[tokio::test]
    async fn metadata_round_trips_through_storage() {
        let service = service(store());
        let mut metadata = Map::new();
        metadata.insert("screen".to_string(), json!("brain_dump"));
        metadata.insert("item_count".to_string(), json!(7));
        metadata.insert("first_run".to_string(), json!(false));
        service.track("sort_requested", Some(metadata.clone())).await;

        let events = service.events().await;
        assert_eq!(events[0].metadata, Some(metadata));
        assert_eq!(events[0].timestamp, fixed_now());
    }

    #[tokio::test]
    async fn log_is_capped_and_drops_the_oldest_entries() {
        let store = store();
        let preloaded: Vec<MetricEvent> = (0..MAX_METRIC_EVENTS)
            .map(|index| MetricEvent {
                name: format!("event-{index}"),
                timestamp: fixed_now(),
                metadata: None,
            })
            .collect();
        store.set_json(keys::UX_METRICS, &preloaded).await;

        let service = service(store);
        service.track("newest", None).await;

        let events = service.events().await;
        assert_eq!(events.len(), MAX_METRIC_EVENTS);
        assert_eq!(events[0].name, "newest");
        // The oldest entry sat at the tail and fell off.
        assert_eq!(events.last().map(|event| event.name.as_str()), Some("event-198"));
    }

    #[tokio::test]
    async fn malformed_log_restarts_from_empty() {
        let store = store();
        store.set(keys::UX_METRICS, "[{broken").await;

        let service = service(store);
        service.track("app_opened", None).await;
        assert_eq!(service.events().await.len(), 1);
    }
}
