//! Shared entry store of a task tree

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type SubscriptionId = u64;

type Listener = Arc<dyn Fn(&str, &JsonValue) + Send + Sync>;

#[derive(Default)]
struct DatabaseInner {
    values: BTreeMap<String, JsonValue>,
    listeners: BTreeMap<SubscriptionId, Listener>,
    next_id: SubscriptionId,
}

/// Flat map of entry names to values shared by every task of a tree.
///
/// Listeners run synchronously while the write holds the database lock, so
/// they observe changes in exactly the order the writes happened. A listener
/// must not access the database it is subscribed to.
#[derive(Clone, Default)]
pub struct TaskDatabase {
    inner: Arc<Mutex<DatabaseInner>>,
}

impl TaskDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DatabaseInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self, entry: impl Into<String>, value: impl Into<JsonValue>) {
        let entry = entry.into();
        let value = value.into();
        let mut inner = self.lock();
        for listener in inner.listeners.values() {
            listener(&entry, &value);
        }
        inner.values.insert(entry, value);
    }

    pub fn read(&self, entry: &str) -> Option<JsonValue> {
        self.lock().values.get(entry).cloned()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.lock().values.contains_key(entry)
    }

    pub fn snapshot(&self) -> BTreeMap<String, JsonValue> {
        self.lock().values.clone()
    }

    /// Call `listener` with every later write
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&str, &JsonValue) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, Arc::new(listener));
        id
    }

    /// Returns whether the subscription was still active
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().listeners.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_and_read() {
        let db = TaskDatabase::new();
        db.write("value", 1.5);
        assert_eq!(db.read("value"), Some(json!(1.5)));
        assert!(db.contains("value"));
        assert!(db.read("missing").is_none());
    }

    #[test]
    fn test_listeners_see_mutation_order() {
        let db = TaskDatabase::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        db.subscribe(move |entry, value| {
            sink.lock().unwrap().push((entry.to_string(), value.clone()));
        });

        db.write("a", 1);
        db.write("b", 2);
        db.write("a", 3);

        let seen = seen.lock().unwrap();
        let entries: Vec<&str> = seen.iter().map(|(e, _)| e.as_str()).collect();
        assert_eq!(entries, vec!["a", "b", "a"]);
        assert_eq!(seen[2].1, json!(3));
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let db = TaskDatabase::new();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let id = db.subscribe(move |_, _| *counter.lock().unwrap() += 1);

        db.write("x", 1);
        assert!(db.unsubscribe(id));
        assert!(!db.unsubscribe(id));
        db.write("x", 2);

        assert_eq!(*count.lock().unwrap(), 1);
    }
}
