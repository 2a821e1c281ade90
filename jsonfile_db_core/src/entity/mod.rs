use std::borrow::Borrow;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::{DbResult, Error};

/// JSON property holding the identity of every stored record.
pub const ID_KEY: &str = "Id";

#[derive(Debug, Eq, PartialEq, Hash, Clone, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityName(pub String);

impl From<&str> for EntityName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for EntityName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record with an integer identity.
///
/// `id` returns `None` while the entity has not been stored yet; `Dataset::add`
/// then assigns the next free id. `Some(0)` is an explicit id like any other.
///
/// The identity is always written under the `Id` property, ahead of the fields
/// produced by the entity's own `Serialize` impl, so the field that backs `id`
/// must serialize as `Id` (`#[serde(rename = "Id", default)]`). The derive
/// refuses id fields that map to any other property.
pub trait Entity: Serialize + DeserializeOwned {
    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);
}

/// An entity with a default collection name, usually derived with
/// `#[derive(Entity)]`.
pub trait Collection: Entity {
    const NAME: &'static str;

    fn entity_name() -> EntityName {
        EntityName::from(Self::NAME)
    }
}

/// Untyped view of a stored record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Entity for Record {
    fn id(&self) -> Option<i64> {
        self.0.get(ID_KEY).and_then(Value::as_i64)
    }

    fn set_id(&mut self, id: i64) {
        self.0.insert(ID_KEY.to_string(), Value::from(id));
    }
}

/// Reads the identity of a stored value. Values that are not objects or carry
/// no integer `Id` have none.
pub fn record_id(value: &Value) -> Option<i64> {
    value.get(ID_KEY).and_then(Value::as_i64)
}

/// Serializes an entity into its stored form: a JSON object whose first
/// property is `Id`.
pub fn to_record<E: Entity>(entity: &E) -> DbResult<Value> {
    let fields = match serde_json::to_value(entity)? {
        Value::Object(fields) => fields,
        _ => {
            return Err(Error::InvalidArgument(
                "Entity must serialize to a JSON object".to_string(),
            ));
        }
    };

    let mut record = Map::with_capacity(fields.len() + 1);
    record.insert(
        ID_KEY.to_string(),
        entity.id().map_or(Value::Null, Value::from),
    );
    for (key, value) in fields {
        if key != ID_KEY {
            record.insert(key, value);
        }
    }

    Ok(Value::Object(record))
}
