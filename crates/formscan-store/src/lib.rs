//! Record Store: the document database that confirmed records end up in.
//!
//! Only the narrow contract the intake flow needs is modelled here:
//! create/update/delete plus a realtime, ordered subscription per collection.

mod error;
mod memory;
mod record;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use record::{Direction, Fields, OrderBy, StoredRecord};

use async_trait::async_trait;
use futures::stream::BoxStream;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record and return its store-assigned id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Merge `fields` into an existing record.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Ordered snapshots of a collection: the current one immediately, then a
    /// fresh one after every change.
    fn subscribe(&self, collection: &str, order: OrderBy) -> BoxStream<'static, Vec<StoredRecord>>;
}
