use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use parley_types::api::MessageRecord;
use parley_types::models::Message;

/// Total order for messages within a conversation: `created_at`, ties
/// broken by id.
type OrderKey = (DateTime<Utc>, Uuid);

/// Per-conversation ordered message cache.
///
/// The BTreeMap carries the display order; the id index gives O(1)
/// lookup for `replace`/`remove`. Temporary (client-generated) and
/// server-assigned ids share the same keyspace, so a repeated page load
/// that re-returns an entry we already hold optimistically cannot be
/// matched by content — only the explicit temp-id key works.
#[derive(Default)]
pub struct MessageStore {
    ordered: BTreeMap<OrderKey, Message>,
    index: HashMap<Uuid, OrderKey>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.index.contains_key(&id)
    }

    /// All cached messages, ascending by (created_at, id).
    pub fn messages(&self) -> Vec<Message> {
        self.ordered.values().cloned().collect()
    }

    /// Merge one fetched page into the cache. A record whose id is
    /// already present is skipped and the existing copy retained;
    /// previously held messages are never reordered. Returns how many
    /// records were actually inserted.
    pub fn merge_page(&mut self, records: Vec<MessageRecord>) -> usize {
        let mut inserted = 0;
        for record in records {
            if self.index.contains_key(&record.id) {
                continue;
            }
            self.insert(Message::from_record(record));
            inserted += 1;
        }
        inserted
    }

    /// Optimistic insert of a locally constructed message (the Pending
    /// echo). A duplicate id is ignored.
    pub fn append(&mut self, message: Message) {
        if self.index.contains_key(&message.id) {
            return;
        }
        self.insert(message);
    }

    /// Swap the optimistic echo for its confirmed counterpart. No-op if
    /// the temp id is unknown (e.g. already replaced). Returns whether a
    /// swap happened.
    pub fn replace(&mut self, temp_id: Uuid, confirmed: Message) -> bool {
        if self.take(temp_id).is_none() {
            return false;
        }
        self.append(confirmed);
        true
    }

    /// Roll back the optimistic echo after a failed send.
    pub fn remove(&mut self, temp_id: Uuid) -> Option<Message> {
        self.take(temp_id)
    }

    fn insert(&mut self, message: Message) {
        let key = (message.created_at, message.id);
        self.index.insert(message.id, key);
        self.ordered.insert(key, message);
    }

    fn take(&mut self, id: Uuid) -> Option<Message> {
        let key = self.index.remove(&id)?;
        self.ordered.remove(&key)
    }
}
