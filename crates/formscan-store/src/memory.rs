//! In-process Record Store with realtime subscriptions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::record::{Fields, OrderBy, StoredRecord};
use crate::RecordStore;

const ID_LEN: usize = 20;

type Snapshot = Arc<Vec<StoredRecord>>;

/// Collections held in memory; each one publishes snapshots on a watch channel.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, watch::Sender<Snapshot>>>,
    seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<Snapshot>>> {
        // Snapshots are replaced whole, so a poisoned map is still consistent.
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `change` to a copy of the collection and publish the result.
    fn mutate<T>(
        &self,
        collection: &str,
        change: impl FnOnce(&mut Vec<StoredRecord>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut collections = self.collections();
        let tx = collections
            .entry(collection.to_string())
            .or_insert_with(|| watch::channel(Arc::new(Vec::new())).0);

        let mut records: Vec<StoredRecord> = (**tx.borrow()).clone();
        let out = change(&mut records)?;
        tx.send_replace(Arc::new(records));
        Ok(out)
    }

    /// Current number of records in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections()
            .get(collection)
            .map(|tx| tx.borrow().len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

fn new_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let record = StoredRecord {
            id: new_id(),
            fields,
            created_at: Utc::now(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        let id = record.id.clone();
        self.mutate(collection, |records| {
            records.push(record);
            Ok(())
        })?;
        info!(collection, id = %id, "record created");
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.mutate(collection, |records| {
            let record = records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| not_found(collection, id))?;
            record.fields.extend(fields);
            Ok(())
        })?;
        info!(collection, id, "record updated");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.mutate(collection, |records| {
            let before = records.len();
            records.retain(|r| r.id != id);
            if records.len() == before {
                return Err(not_found(collection, id));
            }
            Ok(())
        })?;
        info!(collection, id, "record deleted");
        Ok(())
    }

    fn subscribe(&self, collection: &str, order: OrderBy) -> BoxStream<'static, Vec<StoredRecord>> {
        let rx = {
            let mut collections = self.collections();
            collections
                .entry(collection.to_string())
                .or_insert_with(|| watch::channel(Arc::new(Vec::new())).0)
                .subscribe()
        };
        debug!(collection, field = %order.field, "subscribed");

        futures::stream::unfold((rx, true), move |(mut rx, first)| {
            let order = order.clone();
            async move {
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                let snapshot = rx.borrow_and_update().clone();
                Some((order.sorted(&snapshot), (rx, false)))
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formscan_core::FieldValue;

    fn fields(pairs: &[(&str, FieldValue)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn names(records: &[StoredRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.fields["name"].to_string())
            .collect()
    }

    #[tokio::test]
    async fn create_assigns_distinct_ids() {
        let store = MemoryStore::new();
        let a = store.create("inventory", fields(&[("name", "Pen".into())])).await.unwrap();
        let b = store.create("inventory", fields(&[("name", "Pad".into())])).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), ID_LEN);
        assert_eq!(store.len("inventory"), 2);
        assert!(store.is_empty("employees"));
    }

    #[tokio::test]
    async fn subscription_yields_current_then_changes() {
        let store = MemoryStore::new();
        store.create("inventory", fields(&[("name", "Pen".into())])).await.unwrap();

        let mut stream = store.subscribe("inventory", OrderBy::default());
        let first = stream.next().await.unwrap();
        assert_eq!(names(&first), vec!["Pen"]);

        store.create("inventory", fields(&[("name", "Pad".into())])).await.unwrap();
        let second = stream.next().await.unwrap();
        // Newest first.
        assert_eq!(names(&second), vec!["Pad", "Pen"]);
    }

    #[tokio::test]
    async fn ordering_by_field() {
        let store = MemoryStore::new();
        for (name, price) in [("Pen", 20.0), ("Stapler", 150.0), ("Clip", 2.5)] {
            store
                .create("inventory", fields(&[("name", name.into()), ("price", price.into())]))
                .await
                .unwrap();
        }
        let mut by_price = store.subscribe("inventory", OrderBy::asc("price"));
        assert_eq!(names(&by_price.next().await.unwrap()), vec!["Clip", "Pen", "Stapler"]);

        let mut by_name = store.subscribe("inventory", OrderBy::desc("name"));
        assert_eq!(names(&by_name.next().await.unwrap()), vec!["Stapler", "Pen", "Clip"]);
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = MemoryStore::new();
        let id = store
            .create("inventory", fields(&[("name", "Pen".into()), ("quantity", 5.0.into())]))
            .await
            .unwrap();
        store
            .update("inventory", &id, fields(&[("quantity", 9.0.into())]))
            .await
            .unwrap();

        let snapshot = store.subscribe("inventory", OrderBy::default()).next().await.unwrap();
        assert_eq!(snapshot[0].fields["quantity"], FieldValue::Number(9.0));
        assert_eq!(snapshot[0].fields["name"], FieldValue::Text("Pen".into()));
    }

    #[tokio::test]
    async fn delete_and_missing_ids() {
        let store = MemoryStore::new();
        let id = store.create("employees", Fields::new()).await.unwrap();
        store.delete("employees", &id).await.unwrap();
        assert!(store.is_empty("employees"));

        assert_eq!(
            store.delete("employees", &id).await,
            Err(StoreError::NotFound {
                collection: "employees".into(),
                id: id.clone()
            })
        );
        assert!(matches!(
            store.update("employees", &id, Fields::new()).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = MemoryStore::new();
        let mut employees = store.subscribe("employees", OrderBy::default());
        assert!(employees.next().await.unwrap().is_empty());

        store.create("inventory", Fields::new()).await.unwrap();
        assert_eq!(store.len("inventory"), 1);
        assert!(store.is_empty("employees"));
    }

    #[test]
    fn record_serializes_flat() {
        let record = StoredRecord {
            id: "abc".into(),
            fields: fields(&[("name", "Pen".into())]),
            created_at: Utc::now(),
            seq: 0,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "Pen");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("seq").is_none());
    }
}
