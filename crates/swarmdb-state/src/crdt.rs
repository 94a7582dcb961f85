//! CRDT state for the two node discriminators.
//!
//! - [`LwwObject`]: a map of last-writer-wins registers, one per field.
//! - [`LwwSet`]: a set of atoms where each element carries a presence
//!   flag and the stamp of the add/remove that last touched it.
//!
//! Both types converge regardless of delivery order: every update and
//! every merge keeps, per key, the maximum of a total order over
//! (stamp, value). Applying the same updates in any order, any number
//! of times, yields the same state.
//!
//! **Tie-breaks**:
//! - LWW: the higher stamp wins (time, then writer tag). On an exactly
//!   equal stamp the greater atom wins.
//! - Set: the higher stamp wins. On an exactly equal stamp *add wins*
//!   over remove.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use swarmdb_protocol::{Atom, DbError, Payload, Stamp};

/// A single LWW register: the winning value and the stamp that wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwField {
    pub value: Atom,
    pub stamp: Stamp,
}

impl LwwField {
    pub fn new(value: Atom, stamp: Stamp) -> Self {
        Self { value, stamp }
    }

    /// Whether `self` replaces `other` when both are written to one field.
    pub fn wins_over(&self, other: &LwwField) -> bool {
        (&self.stamp, &self.value) > (&other.stamp, &other.value)
    }
}

/// Object whose fields are independent LWW registers.
///
/// Deleted fields are kept as `Null` tombstones so that an older write
/// arriving later cannot resurrect them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LwwObject {
    fields: BTreeMap<String, LwwField>,
}

impl LwwObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every field of `payload` at `stamp`.
    ///
    /// Returns the number of fields whose register changed. An empty
    /// payload is rejected.
    pub fn apply(&mut self, payload: &Payload, stamp: &Stamp) -> Result<usize, DbError> {
        if payload.is_empty() {
            return Err(DbError::InvalidArgument(
                "payload must contain at least one field".into(),
            ));
        }
        let changed = payload
            .iter()
            .filter(|(field, value)| {
                self.write(field.as_str(), LwwField::new((*value).clone(), stamp.clone()))
            })
            .count();
        Ok(changed)
    }

    /// Offer a register value for one field. Returns `true` if it won.
    pub fn write(&mut self, field: &str, incoming: LwwField) -> bool {
        match self.fields.get_mut(field) {
            Some(current) => {
                if incoming.wins_over(current) {
                    *current = incoming;
                    true
                } else {
                    false
                }
            }
            None => {
                self.fields.insert(field.to_string(), incoming);
                true
            }
        }
    }

    /// Current value of a field. Tombstoned fields read as `Null`.
    pub fn get(&self, field: &str) -> Option<&Atom> {
        self.fields.get(field).map(|f| &f.value)
    }

    /// The full register (value and stamp) of a field.
    pub fn field(&self, field: &str) -> Option<&LwwField> {
        self.fields.get(field)
    }

    /// Fields holding a non-null value, in field-name order.
    pub fn live_fields(&self) -> impl Iterator<Item = (&String, &Atom)> {
        self.fields
            .iter()
            .filter(|(_, f)| !f.value.is_null())
            .map(|(name, f)| (name, &f.value))
    }

    /// All registers including tombstones.
    pub fn registers(&self) -> impl Iterator<Item = (&String, &LwwField)> {
        self.fields.iter()
    }

    /// Number of live (non-null) fields.
    pub fn len(&self) -> usize {
        self.live_fields().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge another replica's registers into this one.
    ///
    /// Returns the number of registers that changed.
    pub fn merge(&mut self, other: &LwwObject) -> usize {
        other
            .fields
            .iter()
            .filter(|(field, incoming)| self.write(field, (*incoming).clone()))
            .count()
    }

    /// Highest logical time recorded in any register.
    pub fn max_time(&self) -> Option<u64> {
        self.fields.values().map(|f| f.stamp.time).max()
    }
}

/// Presence state of one set element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetEntry {
    pub present: bool,
    pub stamp: Stamp,
}

impl SetEntry {
    /// Whether `self` replaces `other` for the same element.
    ///
    /// `present` sorts after absent, which is what makes add win over a
    /// remove carrying the same stamp.
    pub fn wins_over(&self, other: &SetEntry) -> bool {
        (&self.stamp, self.present) > (&other.stamp, other.present)
    }
}

/// Set of atoms with last-writer-wins add/remove per element.
///
/// Removing a value that was never seen still records a tombstone, so
/// an older add delivered afterwards stays removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SetRecord>", into = "Vec<SetRecord>")]
pub struct LwwSet {
    entries: BTreeMap<Atom, SetEntry>,
}

/// Serialized form of one set element. JSON object keys must be strings,
/// so the map is written as a list of records.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SetRecord {
    value: Atom,
    present: bool,
    stamp: Stamp,
}

impl From<Vec<SetRecord>> for LwwSet {
    fn from(records: Vec<SetRecord>) -> Self {
        let mut set = LwwSet::new();
        for record in records {
            set.offer(
                record.value,
                SetEntry {
                    present: record.present,
                    stamp: record.stamp,
                },
            );
        }
        set
    }
}

impl From<LwwSet> for Vec<SetRecord> {
    fn from(set: LwwSet) -> Self {
        set.entries
            .into_iter()
            .map(|(value, entry)| SetRecord {
                value,
                present: entry.present,
                stamp: entry.stamp,
            })
            .collect()
    }
}

impl LwwSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` at `stamp`. Returns `true` if the element's state changed.
    pub fn add(&mut self, value: Atom, stamp: Stamp) -> bool {
        self.offer(value, SetEntry { present: true, stamp })
    }

    /// Remove `value` at `stamp`. Returns `true` if the element's state changed.
    pub fn remove(&mut self, value: Atom, stamp: Stamp) -> bool {
        self.offer(
            value,
            SetEntry {
                present: false,
                stamp,
            },
        )
    }

    fn offer(&mut self, value: Atom, incoming: SetEntry) -> bool {
        match self.entries.get_mut(&value) {
            Some(current) => {
                if incoming.wins_over(current) {
                    *current = incoming;
                    true
                } else {
                    false
                }
            }
            None => {
                self.entries.insert(value, incoming);
                true
            }
        }
    }

    pub fn contains(&self, value: &Atom) -> bool {
        self.entries.get(value).is_some_and(|e| e.present)
    }

    /// Present elements in canonical atom order.
    pub fn elements(&self) -> Vec<Atom> {
        self.iter().cloned().collect()
    }

    /// Iterate present elements in canonical atom order.
    pub fn iter(&self) -> impl Iterator<Item = &Atom> {
        self.entries
            .iter()
            .filter(|(_, e)| e.present)
            .map(|(value, _)| value)
    }

    /// Element state including tombstones.
    pub fn entry(&self, value: &Atom) -> Option<&SetEntry> {
        self.entries.get(value)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge another replica into this one.
    ///
    /// Returns the number of element entries that changed.
    pub fn merge(&mut self, other: &LwwSet) -> usize {
        other
            .entries
            .iter()
            .filter(|(value, entry)| self.offer((*value).clone(), (*entry).clone()))
            .count()
    }

    /// Highest logical time recorded for any element.
    pub fn max_time(&self) -> Option<u64> {
        self.entries.values().map(|e| e.stamp.time).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(time: u64, writer: &str) -> Stamp {
        Stamp::new(time, writer)
    }

    #[test]
    fn test_lww_later_write_wins() {
        let mut obj = LwwObject::new();
        obj.apply(&Payload::new().with("x", 1), &stamp(1, "a")).unwrap();
        obj.apply(&Payload::new().with("x", 2), &stamp(2, "a")).unwrap();
        assert_eq!(obj.get("x"), Some(&Atom::Int(2)));
    }

    #[test]
    fn test_lww_stale_write_ignored() {
        let mut obj = LwwObject::new();
        obj.apply(&Payload::new().with("x", 2), &stamp(5, "a")).unwrap();
        let changed = obj.apply(&Payload::new().with("x", 1), &stamp(3, "a")).unwrap();
        assert_eq!(changed, 0);
        assert_eq!(obj.get("x"), Some(&Atom::Int(2)));
    }

    #[test]
    fn test_lww_writer_breaks_time_tie() {
        let mut obj = LwwObject::new();
        obj.apply(&Payload::new().with("x", "from-b"), &stamp(1, "b")).unwrap();
        obj.apply(&Payload::new().with("x", "from-a"), &stamp(1, "a")).unwrap();
        assert_eq!(obj.get("x"), Some(&Atom::from("from-b")));
    }

    #[test]
    fn test_lww_null_tombstones_field() {
        let mut obj = LwwObject::new();
        obj.apply(&Payload::new().with("x", 1), &stamp(1, "a")).unwrap();
        obj.apply(&Payload::new().with("x", Atom::Null), &stamp(2, "a")).unwrap();
        assert_eq!(obj.get("x"), Some(&Atom::Null));
        assert_eq!(obj.len(), 0);

        // An older write arriving late must not resurrect the field.
        obj.apply(&Payload::new().with("x", 9), &stamp(1, "z")).unwrap();
        assert_eq!(obj.get("x"), Some(&Atom::Null));
    }

    #[test]
    fn test_lww_empty_payload_rejected() {
        let mut obj = LwwObject::new();
        let err = obj.apply(&Payload::new(), &stamp(1, "a")).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
    }

    #[test]
    fn test_set_add_remove() {
        let mut set = LwwSet::new();
        set.add(Atom::from("v"), stamp(1, "a"));
        assert!(set.contains(&Atom::from("v")));
        set.remove(Atom::from("v"), stamp(2, "a"));
        assert!(!set.contains(&Atom::from("v")));
        assert!(set.is_empty());
    }

    #[test]
    fn test_set_add_wins_equal_stamp() {
        let mut set = LwwSet::new();
        set.add(Atom::Int(1), stamp(3, "a"));
        set.remove(Atom::Int(1), stamp(3, "a"));
        assert!(set.contains(&Atom::Int(1)));
    }

    #[test]
    fn test_set_remove_before_add_delivered() {
        let mut set = LwwSet::new();
        set.remove(Atom::Int(1), stamp(4, "a"));
        set.add(Atom::Int(1), stamp(2, "a"));
        assert!(!set.contains(&Atom::Int(1)));
    }

    #[test]
    fn test_set_elements_sorted() {
        let mut set = LwwSet::new();
        for (t, v) in ["c", "a", "b"].iter().enumerate() {
            set.add(Atom::from(*v), stamp(t as u64 + 1, "w"));
        }
        assert_eq!(
            set.elements(),
            vec![Atom::from("a"), Atom::from("b"), Atom::from("c")]
        );
    }

    #[test]
    fn test_set_json_roundtrip() {
        let mut set = LwwSet::new();
        set.add(Atom::Int(1), stamp(1, "a"));
        set.remove(Atom::from("gone"), stamp(2, "a"));
        let json = serde_json::to_string(&set).unwrap();
        let back: LwwSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
