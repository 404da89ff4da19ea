//! Most-recently-used transfer recipients

use crate::errors::StorageError;
use crate::storage::{keys, ClientStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_RECENT_RECIPIENTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentRecipient {
    pub address: String,
    #[serde(rename = "name")]
    pub label: String,
    pub last_used: DateTime<Utc>,
}

/// Bounded list, most recently used first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecentRecipients {
    entries: Vec<RecentRecipient>,
}

impl RecentRecipients {
    pub fn entries(&self) -> &[RecentRecipient] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move `address` to the front, or insert it there with a generated
    /// label, then drop anything past the cap
    pub fn record(&mut self, address: &str, now: DateTime<Utc>) {
        match self.entries.iter().position(|r| r.address == address) {
            Some(index) => {
                let mut existing = self.entries.remove(index);
                existing.last_used = now;
                self.entries.insert(0, existing);
            }
            None => {
                let label = format!("Recipient {}", self.entries.len() + 1);
                self.entries.insert(
                    0,
                    RecentRecipient {
                        address: address.to_string(),
                        label,
                        last_used: now,
                    },
                );
            }
        }
        self.entries.truncate(MAX_RECENT_RECIPIENTS);
    }

    pub fn load(store: &ClientStore) -> Result<Self, StorageError> {
        Ok(store.get(keys::RECENT_RECIPIENTS)?.unwrap_or_default())
    }

    pub fn save(&self, store: &ClientStore) -> Result<(), StorageError> {
        store.set(keys::RECENT_RECIPIENTS, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    #[test]
    fn test_repeat_moves_to_front() {
        let t0 = Utc::now();
        let mut list = RecentRecipients::default();
        list.record("a", t0);
        list.record("b", t0);
        list.record("a", t0 + Duration::seconds(5));

        let addresses: Vec<_> = list.entries().iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, ["a", "b"]);
        assert_eq!(list.entries()[0].label, "Recipient 1");
        assert_eq!(list.entries()[0].last_used, t0 + Duration::seconds(5));
        assert_eq!(list.entries()[1].label, "Recipient 2");
    }

    #[test]
    fn test_sixth_recipient_evicts_oldest() {
        let now = Utc::now();
        let mut list = RecentRecipients::default();
        for address in ["a", "b", "c", "d", "e", "f"] {
            list.record(address, now);
        }
        assert_eq!(list.len(), MAX_RECENT_RECIPIENTS);
        assert_eq!(list.entries()[0].address, "f");
        assert!(list.entries().iter().all(|r| r.address != "a"));
    }

    #[test]
    fn test_persisted_shape() {
        let store = ClientStore::temporary().unwrap();
        let mut list = RecentRecipients::default();
        list.record("addr", Utc::now());
        list.save(&store).unwrap();

        let raw: serde_json::Value = store.get(keys::RECENT_RECIPIENTS).unwrap().unwrap();
        assert_eq!(raw[0]["name"], "Recipient 1");
        assert!(raw[0]["lastUsed"].is_string());
        assert_eq!(RecentRecipients::load(&store).unwrap(), list);
    }

    proptest! {
        #[test]
        fn prop_bounded_unique_mru(addresses in proptest::collection::vec(0u8..8, 0..40)) {
            let now = Utc::now();
            let mut list = RecentRecipients::default();
            for a in &addresses {
                list.record(&a.to_string(), now);
                prop_assert_eq!(&list.entries()[0].address, &a.to_string());
            }
            prop_assert!(list.len() <= MAX_RECENT_RECIPIENTS);

            let mut seen: Vec<_> = list.entries().iter().map(|r| r.address.clone()).collect();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), list.len());
        }
    }
}
