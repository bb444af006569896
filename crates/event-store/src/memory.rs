use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Version,
    store::{AppendOptions, EventStore, EventStream, validate_events_for_append},
};

/// In-memory event store implementation for testing and single-node runs.
///
/// This implementation stores all events in memory and provides
/// the same interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
    fail_appends: Arc<AtomicBool>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Clears all events.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }

    /// Makes every subsequent append fail with `Unavailable` until switched off.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(EventStoreError::Unavailable(
                "in-memory store is rejecting appends".to_string(),
            ));
        }

        validate_events_for_append(&events)?;

        let first_event = &events[0];
        let aggregate_id = first_event.aggregate_id;

        let mut store = self.events.write().await;

        let current_version = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial());

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current_version,
            });
        }

        // Unique (aggregate_id, version) constraint
        if first_event.version <= current_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: options.expected_version.unwrap_or(current_version),
                actual: current_version,
            });
        }

        let last_version = events
            .last()
            .map(|e| e.version)
            .unwrap_or(Version::initial());
        store.extend(events);

        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(events)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let store = self.events.read().await;
        let mut events = store.clone();
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then(a.event_id.cmp(&b.event_id))
        });

        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let store = self.events.read().await;
        let version = store
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.version)
            .max();
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_event(
        aggregate_id: AggregateId,
        version: Version,
        event_type: &str,
    ) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Player")
            .event_type(event_type)
            .version(version)
            .payload_raw(serde_json::json!({"test": true}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn append_single_event() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        let event = create_test_event(aggregate_id, Version::first(), "PlayerInitialized");

        let result = store.append(vec![event], AppendOptions::expect_new()).await;
        assert_eq!(result.unwrap(), Version::first());

        let events = store.get_events_for_aggregate(aggregate_id).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn append_multiple_events() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let events = vec![
            create_test_event(aggregate_id, Version::new(1), "PlayerInitialized"),
            create_test_event(aggregate_id, Version::new(2), "RecipeDiscovered"),
            create_test_event(aggregate_id, Version::new(3), "RecipeDiscovered"),
        ];

        let result = store.append(events, AppendOptions::expect_new()).await;
        assert_eq!(result.unwrap(), Version::new(3));

        let stored = store.get_events_for_aggregate(aggregate_id).await.unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.windows(2).all(|w| w[0].version < w[1].version));
    }

    #[tokio::test]
    async fn concurrency_conflict_on_wrong_version() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let event1 = create_test_event(aggregate_id, Version::first(), "PlayerInitialized");
        store
            .append(vec![event1], AppendOptions::expect_new())
            .await
            .unwrap();

        let event2 = create_test_event(aggregate_id, Version::new(2), "RecipeDiscovered");
        let result = store
            .append(
                vec![event2],
                AppendOptions::expect_version(Version::initial()),
            )
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_version_is_a_conflict_without_expectation() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "A")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let result = store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "B")],
                AppendOptions::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn expected_version_success() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let event1 = create_test_event(aggregate_id, Version::first(), "PlayerInitialized");
        store
            .append(vec![event1], AppendOptions::expect_new())
            .await
            .unwrap();

        let event2 = create_test_event(aggregate_id, Version::new(2), "RecipeDiscovered");
        let result = store
            .append(
                vec![event2],
                AppendOptions::expect_version(Version::first()),
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failing_appends_store_nothing() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        store.set_fail_appends(true);

        let result = store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "A")],
                AppendOptions::expect_new(),
            )
            .await;
        assert!(matches!(result, Err(EventStoreError::Unavailable(_))));
        assert_eq!(store.event_count().await, 0);

        store.set_fail_appends(false);
        store
            .append(
                vec![create_test_event(aggregate_id, Version::first(), "A")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn get_events_by_type() {
        let store = InMemoryEventStore::new();
        let id1 = AggregateId::new();
        let id2 = AggregateId::new();

        store
            .append(
                vec![create_test_event(id1, Version::first(), "PlayerInitialized")],
                AppendOptions::new(),
            )
            .await
            .unwrap();
        store
            .append(
                vec![create_test_event(id2, Version::first(), "PlayerInitialized")],
                AppendOptions::new(),
            )
            .await
            .unwrap();
        store
            .append(
                vec![create_test_event(id1, Version::new(2), "RecipeDiscovered")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let initialized = store.get_events_by_type("PlayerInitialized").await.unwrap();
        assert_eq!(initialized.len(), 2);

        let discovered = store.get_events_by_type("RecipeDiscovered").await.unwrap();
        assert_eq!(discovered.len(), 1);
    }

    #[tokio::test]
    async fn stream_all_events() {
        use futures_util::StreamExt;

        let store = InMemoryEventStore::new();
        let id1 = AggregateId::new();
        let id2 = AggregateId::new();

        store
            .append(
                vec![create_test_event(id1, Version::first(), "Event1")],
                AppendOptions::new(),
            )
            .await
            .unwrap();
        store
            .append(
                vec![create_test_event(id2, Version::first(), "Event2")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let stream = store.stream_all_events().await.unwrap();
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn get_aggregate_version() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let version = store.get_aggregate_version(aggregate_id).await.unwrap();
        assert!(version.is_none());

        let events = vec![
            create_test_event(aggregate_id, Version::new(1), "Event1"),
            create_test_event(aggregate_id, Version::new(2), "Event2"),
        ];
        store.append(events, AppendOptions::new()).await.unwrap();

        let version = store.get_aggregate_version(aggregate_id).await.unwrap();
        assert_eq!(version, Some(Version::new(2)));
    }
}
