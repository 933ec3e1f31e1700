use std::collections::{HashMap, hash_map::Entry};

use tracing::warn;

use crate::models::{Database, ModelRecord};

/// In-memory collection of model records, in stable build order.
///
/// Built once per process from the bank and read-only while serving. The
/// projection build is the only writer, through [`SignatureStore::records_mut`].
#[derive(Clone, Debug, Default)]
pub struct SignatureStore {
    records: Vec<ModelRecord>,
    id_to_index: HashMap<String, usize>,
}

impl SignatureStore {
    /// Builds the store. Later records reusing an id are dropped with a warning.
    pub fn new(records: Vec<ModelRecord>) -> Self {
        let mut kept = Vec::with_capacity(records.len());
        let mut id_to_index = HashMap::with_capacity(records.len());

        for record in records {
            match id_to_index.entry(record.id.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(kept.len());
                    kept.push(record);
                }
                Entry::Occupied(entry) => {
                    warn!("Duplicate model id {}, keeping the first record", entry.key());
                }
            }
        }

        Self {
            records: kept,
            id_to_index,
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelRecord> {
        self.index_of(id).map(|i| &self.records[i])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.id_to_index.get(id).copied()
    }

    pub fn records(&self) -> &[ModelRecord] {
        &self.records
    }

    /// Mutable access for coordinate updates. Ids must not be changed.
    pub fn records_mut(&mut self) -> &mut [ModelRecord] {
        &mut self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn with_signature_count(&self) -> usize {
        self.records.iter().filter(|r| r.has_signature()).count()
    }

    /// Length of the first non-empty signature, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.records
            .iter()
            .find_map(|r| r.signature().filter(|s| !s.is_empty()).map(<[f64]>::len))
    }

    pub fn into_records(self) -> Vec<ModelRecord> {
        self.records
    }
}

impl From<Database> for SignatureStore {
    fn from(database: Database) -> Self {
        Self::new(database.models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(raw_id: &str, signature: Option<Vec<f64>>) -> ModelRecord {
        ModelRecord::from_raw_id(raw_id, signature)
    }

    #[test]
    fn test_lookup_and_order() {
        let store = SignatureStore::new(vec![
            record("a_one", Some(vec![1.0, 2.0])),
            record("b_two", None),
            record("c_three", Some(vec![0.0, 0.0])),
        ]);

        assert_eq!(store.len(), 3);
        assert_eq!(store.index_of("C/three"), Some(2));
        assert_eq!(store.get("B/two").map(|r| r.name.as_str()), Some("b_two"));
        assert!(store.get("missing").is_none());
        assert_eq!(store.with_signature_count(), 2);
        assert_eq!(store.dimension(), Some(2));
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let store = SignatureStore::new(vec![
            record("a_one", Some(vec![1.0])),
            record("a_one", Some(vec![9.0])),
        ]);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("A/one").and_then(|r| r.signature()), Some(&[1.0][..]));
    }

    #[test]
    fn test_empty_store() {
        let store = SignatureStore::default();
        assert!(store.is_empty());
        assert_eq!(store.dimension(), None);
    }
}
