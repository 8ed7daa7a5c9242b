//! Typed handles for the two bucket shapes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};
use crate::tracker::{Bucket, Change, Field, View};

fn object(value: &Value) -> &Map<String, Value> {
    value.as_object().expect("mapping bucket root is always an object")
}

fn object_mut(value: &mut Value) -> &mut Map<String, Value> {
    value
        .as_object_mut()
        .expect("mapping bucket root is always an object")
}

fn array(value: &Value) -> &Vec<Value> {
    value.as_array().expect("sequence bucket root is always an array")
}

fn array_mut(value: &mut Value) -> &mut Vec<Value> {
    value
        .as_array_mut()
        .expect("sequence bucket root is always an array")
}

/// Handle to a mapping bucket: string keys to JSON values.
#[derive(Clone, Debug)]
pub struct Mapping {
    bucket: Bucket,
}

impl Mapping {
    pub(crate) fn new(bucket: Bucket) -> Self {
        Self { bucket }
    }

    /// The untyped handle for the same bucket.
    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn name(&self) -> &str {
        self.bucket.name()
    }

    /// Clone of the value at `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.bucket.read(|v| object(v).get(key).cloned())
    }

    /// Deserialize the value at `key`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        self.get(key)
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .transpose()
    }

    /// Read `key` as a [`Field`]: primitives by value, containers as views.
    pub fn field(&self, key: &str) -> Option<Field> {
        let value = self.get(key)?;
        Some(self.bucket.cell().field_at(vec![key.to_string()], &value))
    }

    /// Tracked view of the value at `key`.
    pub fn view(&self, key: &str) -> View {
        self.bucket.cell().view_at(vec![key.to_string()])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.bucket.read(|v| object(v).contains_key(key))
    }

    /// All keys, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.bucket.read(|v| object(v).keys().cloned().collect())
    }

    /// Clones of all values matching `pred`, with their keys.
    pub fn filter(&self, mut pred: impl FnMut(&str, &Value) -> bool) -> Vec<(String, Value)> {
        self.bucket.read(|v| {
            object(v)
                .iter()
                .filter(|(k, v)| pred(k, v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.bucket.read(|v| object(v).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or overwrite `key`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        self.bucket
            .cell()
            .write(|v| (object_mut(v).insert(key, value), Change::Edit))
    }

    /// Serialize `value` and insert it under `key`.
    pub fn insert_as<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> StoreResult<Option<Value>> {
        let value = serde_json::to_value(value)?;
        Ok(self.insert(key, value))
    }

    /// Remove `key`, returning its value. Removing a missing key is not a
    /// mutation.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.bucket.cell().write(|v| {
            let old = object_mut(v).remove(key);
            let change = Change::edit_if(old.is_some());
            (old, change)
        })
    }
}

/// Handle to a sequence bucket: an ordered list of JSON values.
#[derive(Clone, Debug)]
pub struct Sequence {
    bucket: Bucket,
}

impl Sequence {
    pub(crate) fn new(bucket: Bucket) -> Self {
        Self { bucket }
    }

    /// The untyped handle for the same bucket.
    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn name(&self) -> &str {
        self.bucket.name()
    }

    /// Clone of the element at `index`.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.bucket.read(|v| array(v).get(index).cloned())
    }

    /// Deserialize the element at `index`.
    pub fn get_as<T: DeserializeOwned>(&self, index: usize) -> StoreResult<Option<T>> {
        self.get(index)
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .transpose()
    }

    /// Read the element at `index` as a [`Field`].
    pub fn field(&self, index: usize) -> Option<Field> {
        let value = self.get(index)?;
        Some(self.bucket.cell().field_at(vec![index.to_string()], &value))
    }

    /// Tracked view of the element at `index`.
    pub fn view(&self, index: usize) -> View {
        self.bucket.cell().view_at(vec![index.to_string()])
    }

    pub fn len(&self) -> usize {
        self.bucket.read(|v| array(v).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone of every element.
    pub fn to_vec(&self) -> Vec<Value> {
        self.bucket.read(|v| array(v).clone())
    }

    /// First element matching `pred`, with its index.
    pub fn find(&self, mut pred: impl FnMut(&Value) -> bool) -> Option<(usize, Value)> {
        self.bucket.read(|v| {
            array(v)
                .iter()
                .enumerate()
                .find(|(_, item)| pred(item))
                .map(|(i, item)| (i, item.clone()))
        })
    }

    /// Append `value`, returning its index.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.bucket.cell().write(|v| {
            let items = array_mut(v);
            items.push(value);
            (items.len() - 1, Change::Edit)
        })
    }

    /// Serialize and append `value`, returning its index.
    pub fn push_as<T: Serialize>(&self, value: &T) -> StoreResult<usize> {
        let value = serde_json::to_value(value)?;
        Ok(self.push(value))
    }

    /// Replace the element at `index`, returning the old one.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> StoreResult<Value> {
        let value = value.into();
        let name = self.name().to_string();
        self.bucket.cell().write(|v| {
            let items = array_mut(v);
            match items.get_mut(index) {
                Some(slot) => (Ok(std::mem::replace(slot, value)), Change::Edit),
                None => (
                    Err(StoreError::IndexOutOfRange {
                        bucket: name,
                        pointer: format!("/{index}"),
                        index,
                        len: items.len(),
                    }),
                    Change::None,
                ),
            }
        })
    }

    /// Remove the element at `index`, shifting later elements down. Views of
    /// elements taken before the removal go stale.
    pub fn remove(&self, index: usize) -> Option<Value> {
        self.bucket.cell().write(|v| {
            let items = array_mut(v);
            if index < items.len() {
                (Some(items.remove(index)), Change::Shift)
            } else {
                (None, Change::None)
            }
        })
    }

    /// Keep only elements matching `pred`. Returns how many were removed;
    /// removing nothing is not a mutation. Removing anything makes views of
    /// elements stale.
    pub fn retain(&self, mut pred: impl FnMut(&Value) -> bool) -> usize {
        self.bucket.cell().write(|v| {
            let items = array_mut(v);
            let before = items.len();
            items.retain(|item| pred(item));
            let removed = before - items.len();
            (removed, Change::shift_if(removed > 0))
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use crate::store::Store;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Appointment {
        id: String,
        doctor: String,
        slot: String,
    }

    async fn store() -> Store {
        Store::builder()
            .mapping("users", json!({}))
            .sequence("appointments", json!([]))
            .open()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn mapping_crud() {
        let store = store().await;
        let users = store.mapping("users");

        assert!(users.is_empty());
        assert_eq!(users.insert("u1", json!({"name": "Ada"})), None);
        assert_eq!(users.insert("u2", "plain"), None);
        assert_eq!(users.get("u1"), Some(json!({"name": "Ada"})));
        assert!(users.contains_key("u2"));
        assert_eq!(users.keys(), vec!["u1", "u2"]);

        let old = users.insert("u2", 7);
        assert_eq!(old, Some(json!("plain")));
        assert_eq!(users.remove("u2"), Some(json!(7)));
        assert_eq!(users.remove("u2"), None);
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn mapping_typed_round_trip() {
        let store = store().await;
        let users = store.mapping("users");
        let appt = Appointment {
            id: "a1".into(),
            doctor: "d1".into(),
            slot: "09:00".into(),
        };
        users.insert_as("a1", &appt).unwrap();
        assert_eq!(users.get_as::<Appointment>("a1").unwrap(), Some(appt));
        assert_eq!(users.get_as::<Appointment>("zz").unwrap(), None);

        users.insert("bad", 3);
        assert!(matches!(
            users.get_as::<Appointment>("bad"),
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn mapping_filter_and_fields() {
        let store = store().await;
        let users = store.mapping("users");
        users.insert("u1", json!({"role": "doctor"}));
        users.insert("u2", json!({"role": "patient"}));
        users.insert("count", 2);

        let doctors = users.filter(|_, v| v["role"] == "doctor");
        assert_eq!(doctors, vec![("u1".to_string(), json!({"role": "doctor"}))]);

        assert!(users.field("u1").unwrap().as_view().is_some());
        assert_eq!(users.field("count").unwrap().as_value(), Some(&json!(2)));
        assert!(users.field("none").is_none());
    }

    #[tokio::test]
    async fn sequence_operations() {
        let store = store().await;
        let appts = store.sequence("appointments");

        assert_eq!(appts.push(json!({"id": "a1"})), 0);
        assert_eq!(appts.push(json!({"id": "a2"})), 1);
        assert_eq!(appts.push(json!({"id": "a3"})), 2);
        assert_eq!(appts.len(), 3);

        let (i, found) = appts.find(|v| v["id"] == "a2").unwrap();
        assert_eq!((i, found), (1, json!({"id": "a2"})));

        assert_eq!(appts.set(0, json!({"id": "a0"})).unwrap(), json!({"id": "a1"}));
        assert!(matches!(
            appts.set(9, json!(null)),
            Err(StoreError::IndexOutOfRange { index: 9, len: 3, .. })
        ));

        assert_eq!(appts.remove(1), Some(json!({"id": "a2"})));
        assert_eq!(appts.remove(10), None);
        assert_eq!(appts.retain(|v| v["id"] != "a3"), 1);
        assert_eq!(appts.to_vec(), vec![json!({"id": "a0"})]);
    }

    #[tokio::test]
    async fn sequence_element_views_are_shared() {
        let store = store().await;
        let appts = store.sequence("appointments");
        appts.push_as(&Appointment {
            id: "a1".into(),
            doctor: "d1".into(),
            slot: "09:00".into(),
        })
        .unwrap();

        appts.view(0).set("slot", "10:30").unwrap();
        let got: Appointment = appts.get_as(0).unwrap().unwrap();
        assert_eq!(got.slot, "10:30");
        let field = appts.field(0).unwrap();
        assert!(field.as_view().unwrap().ptr_eq(&appts.view(0)));
    }

    #[tokio::test]
    async fn removing_an_element_makes_held_views_stale() {
        let store = store().await;
        let appts = store.sequence("appointments");
        appts.push(json!({"id": "a0", "slot": "09:00"}));
        appts.push(json!({"id": "a1", "slot": "10:00"}));
        appts.push(json!({"id": "a2", "slot": "11:00"}));

        let a1 = appts.view(1);
        assert_eq!(appts.remove(0), Some(json!({"id": "a0", "slot": "09:00"})));

        // Index 1 now holds a2; the old view must not write to it.
        assert!(a1.is_stale());
        assert_eq!(a1.get("id"), None);
        assert!(matches!(
            a1.set("slot", "12:00"),
            Err(StoreError::StaleView { ref pointer, .. }) if pointer == "/1"
        ));
        assert_eq!(
            appts.to_vec(),
            vec![
                json!({"id": "a1", "slot": "10:00"}),
                json!({"id": "a2", "slot": "11:00"}),
            ]
        );

        // A fresh view addresses the element now at index 1.
        let fresh = appts.view(1);
        assert!(!fresh.ptr_eq(&a1));
        fresh.set("slot", "12:00").unwrap();
        assert_eq!(appts.get(1), Some(json!({"id": "a2", "slot": "12:00"})));
    }

    #[tokio::test]
    async fn retain_makes_held_views_stale() {
        let store = store().await;
        let appts = store.sequence("appointments");
        appts.push(json!({"id": "a0"}));
        appts.push(json!({"id": "a1"}));
        let first = appts.view(0);
        let nested = first.view("notes");

        assert_eq!(appts.retain(|v| v["id"] == "a0"), 0);
        assert!(!first.is_stale());

        assert_eq!(appts.retain(|v| v["id"] != "a0"), 1);
        assert!(first.is_stale());
        assert!(nested.is_stale());
        assert!(matches!(first.remove("id"), Err(StoreError::StaleView { .. })));
        assert_eq!(appts.to_vec(), vec![json!({"id": "a1"})]);
    }

    #[tokio::test]
    async fn appending_and_replacing_keep_views_current() {
        let store = store().await;
        let appts = store.sequence("appointments");
        appts.push(json!({"id": "a0"}));
        let first = appts.view(0);

        appts.push(json!({"id": "a1"}));
        appts.set(1, json!({"id": "b1"})).unwrap();
        assert!(!first.is_stale());
        assert!(first.ptr_eq(&appts.view(0)));
        first.set("slot", "09:00").unwrap();
        assert_eq!(appts.get(0), Some(json!({"id": "a0", "slot": "09:00"})));
    }

    #[tokio::test]
    async fn mapping_views_survive_sequence_shifts() {
        let store = Store::builder()
            .mapping("patients", json!({"p1": {"allergies": ["latex", "nuts"]}}))
            .sequence("appointments", json!([{"id": "a0"}, {"id": "a1"}]))
            .open()
            .await
            .unwrap();
        let patient = store.mapping("patients").view("p1");
        let appts = store.sequence("appointments");

        appts.remove(0);
        store.mapping("patients").insert("p2", json!({}));
        assert!(!patient.is_stale());
        patient.set("name", "Ann").unwrap();
        assert_eq!(store.mapping("patients").get("p1").unwrap()["name"], "Ann");
    }
}
