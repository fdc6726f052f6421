use super::{BlogDraft, BlogId, BlogRecord, BlogStore, not_found};
use parking_lot::RwLock;
use portable_atomic::{AtomicU64, Ordering};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use streamcalc_core::Result;

/// In-process [`BlogStore`] backed by an ordered map.
///
/// Ids combine the store's creation time (high 32 bits) with a sequence
/// number, so id order is insertion order and listing is a plain map walk.
#[derive(Debug)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<BlogId, BlogRecord>>,
    epoch: u32,
    next_seq: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as u32);
        Self {
            records: RwLock::new(BTreeMap::new()),
            epoch,
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl BlogStore for MemoryStore {
    async fn insert(&self, draft: BlogDraft) -> Result<BlogRecord> {
        let mut records = self.records.write();
        // Allocated under the write lock so ids are handed out in map order.
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let record = BlogRecord::new(BlogId::from_parts(self.epoch, seq), draft);
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: BlogId) -> Result<BlogRecord> {
        self.records.read().get(&id).cloned().ok_or_else(|| not_found(id))
    }

    async fn update(&self, id: BlogId, draft: BlogDraft) -> Result<BlogRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(&id).ok_or_else(|| not_found(id))?;
        *record = BlogRecord::new(id, draft);
        Ok(record.clone())
    }

    async fn delete(&self, id: BlogId) -> Result<()> {
        self.records
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    async fn list_all(&self) -> Result<Vec<BlogRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamcalc_core::Error;

    fn draft(title: &str) -> BlogDraft {
        BlogDraft {
            author_id: "ada".to_string(),
            title: title.to_string(),
            content: format!("{title} body"),
        }
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let store = MemoryStore::new();
        let created = store.insert(draft("first")).await.unwrap();
        assert_eq!(store.find_by_id(created.id).await, Ok(created.clone()));

        let updated = store.update(created.id, draft("edited")).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "edited");
        assert_eq!(store.find_by_id(created.id).await.unwrap().title, "edited");

        store.delete(created.id).await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.find_by_id(created.id).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryStore::new();
        let id = BlogId::from_parts(1, 1);
        assert!(matches!(
            store.update(id, draft("x")).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(store.delete(id).await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn lists_in_insertion_order() {
        let store = MemoryStore::new();
        for title in ["a", "b", "c", "d"] {
            store.insert(draft(title)).await.unwrap();
        }
        let first = store.list_all().await.unwrap()[0].id;
        store.delete(first).await.unwrap();

        let titles: Vec<_> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.title)
            .collect();
        assert_eq!(titles, ["b", "c", "d"]);
        assert_eq!(store.len(), 3);
    }
}
