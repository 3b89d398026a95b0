// In-memory student store with store-assigned, increasing IDs.
// Lives as long as its owner; nothing is persisted.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type StudentId = u64;
pub type Grades = BTreeMap<String, String>;

/// IDs start right after this base; the first record gets `ID_BASE + 1`.
pub const ID_BASE: StudentId = 1000;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub name: String,
    pub email: String,
    pub age: i64,
    pub courses: Vec<String>,
    #[serde(default)]
    pub grades: Grades,
}

#[derive(Debug, Default)]
pub struct StudentStore {
    students: BTreeMap<StudentId, StudentRecord>,
}

impl StudentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next ID is the current maximum plus one, or `ID_BASE + 1` when empty.
    pub fn next_id(&self) -> StudentId {
        let max = self
            .students
            .last_key_value()
            .map(|(id, _)| *id)
            .unwrap_or(ID_BASE);
        max + 1
    }

    pub fn insert(&mut self, record: StudentRecord) -> StudentId {
        let student_id = self.next_id();
        self.students.insert(student_id, record);
        student_id
    }

    pub fn get(&self, student_id: StudentId) -> Option<&StudentRecord> {
        self.students.get(&student_id)
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{ID_BASE, StudentRecord, StudentStore};

    fn record(name: &str) -> StudentRecord {
        StudentRecord {
            name: name.to_string(),
            email: format!("{}@example.edu", name.to_lowercase()),
            age: 20,
            courses: vec!["Math101".to_string()],
            grades: Default::default(),
        }
    }

    #[test]
    fn empty_store_starts_after_base() {
        let store = StudentStore::new();
        assert!(store.is_empty());
        assert_eq!(store.next_id(), ID_BASE + 1);
    }

    #[test]
    fn sequential_inserts_get_increasing_ids() {
        let mut store = StudentStore::new();
        assert_eq!(store.insert(record("Ada")), 1001);
        assert_eq!(store.insert(record("Grace")), 1002);
        assert_eq!(store.insert(record("Ada")), 1003);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(1001).expect("first").name, "Ada");
        assert_eq!(store.get(1002).expect("second").name, "Grace");
    }

    #[test]
    fn unknown_id_is_absent() {
        let mut store = StudentStore::new();
        store.insert(record("Ada"));
        assert!(store.get(1000).is_none());
        assert!(store.get(1002).is_none());
    }

    #[test]
    fn stores_are_independent() {
        let mut first = StudentStore::new();
        first.insert(record("Ada"));
        let second = StudentStore::new();
        assert!(second.is_empty());
        assert_eq!(second.next_id(), 1001);
    }
}
