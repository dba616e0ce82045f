//! Per-pass reference tables.
//!
//! Indices are assigned in first-seen order on both sides. Clearing a table
//! keeps its capacity for the next pass.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use tracing::trace;

use crate::AmfReadError;
use crate::value::Value;

/// Decode-side object table.
///
/// A composite reserves its slot before its children are read, so indices match
/// the encoder's. A slot stays empty until the composite is complete.
#[derive(Debug, Default)]
pub(crate) struct ObjectSlots {
    slots: Vec<Option<Value>>,
}

impl ObjectSlots {
    pub fn reserve(&mut self) -> usize {
        self.slots.push(None);
        self.slots.len() - 1
    }

    pub fn fill(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(value);
        }
    }

    /// Reserve and fill in one step, for values without children.
    pub fn push(&mut self, value: Value) -> usize {
        self.slots.push(Some(value));
        self.slots.len() - 1
    }

    pub fn get(&self, index: usize) -> Result<Value, AmfReadError> {
        match self.slots.get(index) {
            Some(Some(value)) => {
                trace!(index, kind = value.kind(), "object reference");
                Ok(value.clone())
            }
            Some(None) => Err(AmfReadError::CyclicReference(index)),
            None => Err(AmfReadError::InvalidReference {
                table: "object",
                index,
                len: self.slots.len(),
            }),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Decode-side table of strings or traits.
#[derive(Debug)]
pub(crate) struct ReadTable<T> {
    table: &'static str,
    entries: Vec<T>,
}

impl<T> ReadTable<T> {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: T) {
        self.entries.push(entry);
    }

    pub fn get(&self, index: usize) -> Result<&T, AmfReadError> {
        self.entries
            .get(index)
            .ok_or(AmfReadError::InvalidReference {
                table: self.table,
                index,
                len: self.entries.len(),
            })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Encode-side object table keyed by instance identity.
///
/// Every indexed value is retained until the table is cleared, so no address
/// in the index can be freed and reused by another value during the pass.
#[derive(Debug, Default)]
pub(crate) struct IdentityTable {
    retained: Vec<Value>,
    index: HashMap<usize, usize>,
}

impl IdentityTable {
    pub fn get(&self, value: &Value) -> Option<usize> {
        let found = self.index.get(&value.identity()?).copied();
        if let Some(index) = found {
            trace!(index, kind = value.kind(), "writing object reference");
        }
        found
    }

    /// Index a value. Values without identity are not indexed.
    pub fn insert(&mut self, value: &Value) -> Option<usize> {
        let key = value.identity()?;
        let index = self.retained.len();
        self.retained.push(value.clone());
        self.index.insert(key, index);
        Some(index)
    }

    pub fn clear(&mut self) {
        self.retained.clear();
        self.index.clear();
    }
}

/// Encode-side table keyed by value, for strings and traits.
#[derive(Debug)]
pub(crate) struct WriteTable<K> {
    index: HashMap<K, usize>,
}

impl<K> Default for WriteTable<K> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq> WriteTable<K> {
    pub fn get<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).copied()
    }

    pub fn insert(&mut self, key: K) {
        let index = self.index.len();
        self.index.entry(key).or_insert(index);
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_object_slots() {
        let mut slots = ObjectSlots::default();
        let first = slots.reserve();
        let second = slots.push(Value::date(1.0));

        assert_eq!((first, second), (0, 1));
        assert!(matches!(
            slots.get(0),
            Err(AmfReadError::CyclicReference(0))
        ));
        assert!(matches!(
            slots.get(2),
            Err(AmfReadError::InvalidReference {
                table: "object",
                index: 2,
                len: 2
            })
        ));

        let array = Value::array(vec![]);
        slots.fill(first, array.clone());
        assert!(slots.get(0).unwrap().ptr_eq(&array));

        slots.clear();
        assert!(matches!(
            slots.get(0),
            Err(AmfReadError::InvalidReference { len: 0, .. })
        ));
    }

    #[test]
    fn test_identity_table() {
        let mut table = IdentityTable::default();
        let a = Value::array(vec![]);
        let b = Value::array(vec![]);

        assert_eq!(table.insert(&a), Some(0));
        assert_eq!(table.get(&a.clone()), Some(0));
        assert_eq!(table.get(&b), None);
        assert_eq!(table.insert(&Value::from("s")), None);
        assert_eq!(table.insert(&b), Some(1));

        table.clear();
        assert_eq!(table.get(&a), None);
    }

    #[test]
    fn test_write_table_first_seen_order() {
        let mut table = WriteTable::<String>::default();
        table.insert("a".to_string());
        table.insert("b".to_string());
        table.insert("a".to_string());

        assert_eq!(table.get("a"), Some(0));
        assert_eq!(table.get("b"), Some(1));
        assert_eq!(table.get("c"), None);
    }

    #[test]
    fn test_read_table() {
        let mut table = ReadTable::new("string");
        table.push("x".to_string());
        assert_eq!(table.get(0).unwrap(), "x");
        assert_eq!(
            table.get(1).unwrap_err().to_string(),
            "invalid string reference: index 1, table holds 1"
        );
    }
}
