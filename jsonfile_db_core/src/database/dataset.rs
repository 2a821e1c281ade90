use log::*;
use serde::Deserialize;
use serde_json::Value;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::entity::{Entity, EntityName, record_id, to_record};
use crate::error::{DbResult, Error};

/// Backing storage of one collection, shared between the context's table and
/// every dataset view over it.
pub type SharedRecords = Rc<RefCell<Vec<Value>>>;

/// Typed CRUD view over one collection.
///
/// Clones and other views obtained for the same name share the backing
/// records, so a mutation through one is visible through all of them and to
/// the next save. Lookups are linear scans over the records.
pub struct Dataset<E> {
    name: EntityName,
    records: SharedRecords,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Dataset<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            records: Rc::clone(&self.records),
            _entity: PhantomData,
        }
    }
}

impl<E> std::fmt::Debug for Dataset<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("records", &self.records.borrow().len())
            .finish()
    }
}

impl<E: Entity> Dataset<E> {
    pub fn new(name: impl Into<EntityName>, records: SharedRecords) -> Self {
        Self {
            name: name.into(),
            records,
            _entity: PhantomData,
        }
    }

    /// Build a standalone dataset from the text of a JSON array.
    pub fn from_json(name: impl Into<EntityName>, json: &str) -> DbResult<Self> {
        let records: Vec<Value> = serde_json::from_str(json)?;
        Ok(Self::new(name, Rc::new(RefCell::new(records))))
    }

    pub fn name(&self) -> &EntityName {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// The backing records as indented JSON, exactly as a save would write them.
    pub fn to_json(&self) -> DbResult<String> {
        Ok(serde_json::to_string_pretty(&*self.records.borrow())?)
    }

    pub fn get_all(&self) -> DbResult<Vec<E>> {
        let records = self.records.borrow();
        let entities = records
            .iter()
            .map(|value| E::deserialize(value))
            .collect::<Result<Vec<E>, _>>()?;
        Ok(entities)
    }

    pub fn find(&self, id: i64) -> DbResult<Option<E>> {
        let found = self
            .records
            .borrow()
            .iter()
            .find(|value| record_id(value) == Some(id))
            .cloned();
        trace!("Find {id} in {}: {found:?}", self.name);

        match found {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Append an entity, assigning `max(Id) + 1` (or 1) when it has no id yet.
    /// Returns the entity as stored.
    pub fn add(&self, mut entity: E) -> DbResult<E> {
        let requested = entity.id();

        // One pass: duplicate check and highest id together.
        let (duplicate, max_id) = self.records.borrow().iter().filter_map(record_id).fold(
            (false, None::<i64>),
            |(duplicate, max_id), id| {
                (
                    duplicate || requested == Some(id),
                    Some(max_id.map_or(id, |max_id| max_id.max(id))),
                )
            },
        );

        if duplicate {
            let id = requested.unwrap_or_default();
            warn!("Rejected duplicate Id {id} in {}", self.name);
            return Err(Error::DuplicateIdentity {
                collection: self.name.clone(),
                id,
            });
        }

        if requested.is_none() {
            let next_id = match max_id {
                Some(max_id) => max_id.checked_add(1).ok_or_else(|| {
                    Error::InvalidArgument(format!("Id space exhausted in {}", self.name))
                })?,
                None => 1,
            };
            entity.set_id(next_id);
        }

        let record = to_record(&entity)?;
        trace!("Adding to {}: {record}", self.name);
        self.records.borrow_mut().push(record);
        Ok(entity)
    }

    /// Replace the whole stored record that has the entity's id. Returns
    /// `false` when no record matches.
    pub fn update(&self, entity: &E) -> DbResult<bool> {
        let Some(id) = entity.id() else {
            return Ok(false);
        };
        let record = to_record(entity)?;

        let mut records = self.records.borrow_mut();
        match records.iter_mut().find(|value| record_id(value) == Some(id)) {
            Some(stored) => {
                trace!("Updating {id} in {}", self.name);
                *stored = record;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove the record with `id`. Returns `false` when no record matches.
    pub fn remove(&self, id: i64) -> bool {
        let mut records = self.records.borrow_mut();
        match records.iter().position(|value| record_id(value) == Some(id)) {
            Some(index) => {
                trace!("Removing {id} from {}", self.name);
                records.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestEntity {
        #[serde(rename = "Id", default)]
        id: Option<i64>,
        #[serde(rename = "Name")]
        name: String,
    }

    impl Entity for TestEntity {
        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    const NO_DATA: &str = "[]";
    const ONE_DATA: &str = r#"[{ "Id": 1, "Name": "One" } ]"#;
    const TWO_DATA: &str = r#"[{ "Id": 1, "Name": "One" }, { "Id": 2, "Name": "Two" } ]"#;

    fn compact(json: &str) -> String {
        json.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn dataset(json: &str) -> Dataset<TestEntity> {
        Dataset::from_json("TestEntity", json).unwrap()
    }

    fn entity(id: Option<i64>, name: &str) -> TestEntity {
        TestEntity {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn from_json_keeps_records() {
        for json in [NO_DATA, ONE_DATA, TWO_DATA] {
            assert_eq!(compact(&dataset(json).to_json().unwrap()), compact(json));
        }
    }

    #[test]
    fn from_json_rejects_non_arrays() {
        assert!(Dataset::<TestEntity>::from_json("TestEntity", "{}").is_err());
        assert!(Dataset::<TestEntity>::from_json("TestEntity", "[{ BlaBla } ]").is_err());
    }

    #[test]
    fn get_all_returns_records_in_order() {
        assert!(dataset(NO_DATA).get_all().unwrap().is_empty());

        let one = dataset(ONE_DATA).get_all().unwrap();
        assert_eq!(one, vec![entity(Some(1), "One")]);

        let two = dataset(TWO_DATA).get_all().unwrap();
        assert_eq!(two.len(), 2);
        assert_eq!(two.first().unwrap().id, Some(1));
        assert_eq!(two.last().unwrap().id, Some(2));
    }

    #[test]
    fn find_returns_none_when_missing() {
        assert_eq!(dataset(NO_DATA).find(1).unwrap(), None);
        assert_eq!(dataset(ONE_DATA).find(2).unwrap(), None);
    }

    #[test]
    fn find_returns_matching_entity() {
        let found = dataset(TWO_DATA).find(2).unwrap();
        assert_eq!(found, Some(entity(Some(2), "Two")));
    }

    #[test]
    fn add_keeps_explicit_id() {
        let dataset = dataset(NO_DATA);
        let added = dataset.add(entity(Some(1), "One")).unwrap();
        assert_eq!(added.id, Some(1));
        assert_eq!(compact(&dataset.to_json().unwrap()), compact(ONE_DATA));
    }

    #[test]
    fn add_generates_first_id() {
        let dataset = dataset(NO_DATA);
        let added = dataset.add(entity(None, "One")).unwrap();
        assert_eq!(added.id, Some(1));
        assert_eq!(compact(&dataset.to_json().unwrap()), compact(ONE_DATA));
    }

    #[test]
    fn add_appends_second_entity() {
        let dataset = dataset(ONE_DATA);
        dataset.add(entity(Some(2), "Two")).unwrap();
        assert_eq!(compact(&dataset.to_json().unwrap()), compact(TWO_DATA));
    }

    #[test]
    fn add_generates_next_id_after_max() {
        let sparse = dataset(r#"[{"Id": 7, "Name": "Seven"}, {"Id": 3, "Name": "Three"}]"#);
        let added = sparse.add(entity(None, "Eight")).unwrap();
        assert_eq!(added.id, Some(8));

        let one = dataset(ONE_DATA);
        one.add(entity(None, "Two")).unwrap();
        assert_eq!(compact(&one.to_json().unwrap()), compact(TWO_DATA));
    }

    #[test]
    fn add_honors_explicit_zero_id() {
        let dataset = dataset(ONE_DATA);
        let added = dataset.add(entity(Some(0), "Zero")).unwrap();
        assert_eq!(added.id, Some(0));
        assert_eq!(dataset.find(0).unwrap(), Some(entity(Some(0), "Zero")));

        let next = dataset.add(entity(None, "Next")).unwrap();
        assert_eq!(next.id, Some(2));
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let dataset = dataset(ONE_DATA);
        let before = dataset.to_json().unwrap();

        let err = dataset.add(entity(Some(1), "Other")).unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentity { id: 1, .. }));
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.to_json().unwrap(), before);
    }

    #[test]
    fn add_then_find_round_trips() {
        let dataset = dataset(TWO_DATA);
        let added = dataset.add(entity(Some(40), "Forty")).unwrap();
        assert_eq!(dataset.find(40).unwrap(), Some(added));
    }

    #[test]
    fn stored_records_put_id_first() {
        #[derive(Serialize, Deserialize)]
        struct Late {
            #[serde(rename = "Name")]
            name: String,
            #[serde(rename = "Id", default)]
            id: Option<i64>,
        }
        impl Entity for Late {
            fn id(&self) -> Option<i64> {
                self.id
            }
            fn set_id(&mut self, id: i64) {
                self.id = Some(id);
            }
        }

        let dataset = Dataset::<Late>::from_json("Late", NO_DATA).unwrap();
        dataset
            .add(Late {
                name: "One".to_string(),
                id: None,
            })
            .unwrap();
        assert_eq!(compact(&dataset.to_json().unwrap()), compact(ONE_DATA));
    }

    #[test]
    fn remove_missing_is_noop() {
        let empty = dataset(NO_DATA);
        assert!(!empty.remove(1));
        assert_eq!(compact(&empty.to_json().unwrap()), compact(NO_DATA));

        let one = dataset(ONE_DATA);
        let before = one.to_json().unwrap();
        assert!(!one.remove(2));
        assert_eq!(one.to_json().unwrap(), before);
    }

    #[test]
    fn remove_deletes_matching_record() {
        let one = dataset(ONE_DATA);
        assert!(one.remove(1));
        assert_eq!(compact(&one.to_json().unwrap()), compact(NO_DATA));

        let two = dataset(TWO_DATA);
        assert!(two.remove(2));
        assert_eq!(compact(&two.to_json().unwrap()), compact(ONE_DATA));
    }

    #[test]
    fn update_missing_is_noop() {
        let empty = dataset(NO_DATA);
        assert!(!empty.update(&entity(Some(1), "One")).unwrap());
        assert_eq!(compact(&empty.to_json().unwrap()), compact(NO_DATA));

        let one = dataset(ONE_DATA);
        assert!(!one.update(&entity(Some(2), "Two")).unwrap());
        assert!(!one.update(&entity(None, "Nobody")).unwrap());
        assert_eq!(compact(&one.to_json().unwrap()), compact(ONE_DATA));
    }

    #[test]
    fn update_replaces_whole_record() {
        let dataset = dataset(r#"[{"Id": 1, "Name": "One", "Extra": true}]"#);
        assert!(dataset.update(&entity(Some(1), "Uno")).unwrap());
        assert_eq!(
            compact(&dataset.to_json().unwrap()),
            compact(r#"[{"Id": 1, "Name": "Uno"}]"#)
        );
    }

    #[test]
    fn clones_share_records() {
        let dataset = dataset(NO_DATA);
        let view = dataset.clone();
        dataset.add(entity(None, "One")).unwrap();
        assert_eq!(view.len(), 1);
        assert!(view.remove(1));
        assert!(dataset.is_empty());
    }
}
