//! Compacted NGSI-LD entity

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `id` member of an entity
pub const ID: &str = "id";
/// `type` member of an entity
pub const TYPE: &str = "type";
/// `scope` member of an entity
pub const SCOPE: &str = "scope";
/// `createdAt` system attribute
pub const CREATED_AT: &str = "createdAt";
/// `modifiedAt` system attribute
pub const MODIFIED_AT: &str = "modifiedAt";
/// JSON-LD `@context` member
pub const JSONLD_CONTEXT: &str = "@context";
/// `datasetId` member of an attribute instance
pub const DATASET_ID: &str = "datasetId";

/// Members that are not attributes and never take part in attribute merging
pub const CORE_MEMBERS: [&str; 6] = [ID, TYPE, SCOPE, CREATED_AT, MODIFIED_AT, JSONLD_CONTEXT];

/// An NGSI-LD entity in compacted form (short attribute names).
///
/// Always a JSON object carrying a string `id`; construction and
/// deserialization reject anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct CompactedEntity(Map<String, Value>);

impl CompactedEntity {
    /// Create an entity with the given id and type
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let mut members = Map::new();
        members.insert(ID.to_string(), Value::String(id.into()));
        members.insert(TYPE.to_string(), Value::String(entity_type.into()));
        Self(members)
    }

    /// Build an entity from an arbitrary JSON value.
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(members) => Self::try_from(members),
            other => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        }
    }

    /// Entity id
    pub fn id(&self) -> &str {
        self.0.get(ID).and_then(Value::as_str).unwrap_or_default()
    }

    /// Entity types, whether compacted as a single string or an array
    pub fn types(&self) -> Vec<&str> {
        match self.0.get(TYPE) {
            Some(Value::String(t)) => vec![t.as_str()],
            Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Look up any member, core or attribute
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Whether the entity carries a member with this name
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterate over attributes (every member that is not a core member)
    pub fn attributes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0
            .iter()
            .filter(|(name, _)| !CORE_MEMBERS.contains(&name.as_str()))
    }

    /// Attribute names, in the order of the underlying map
    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes().map(|(name, _)| name.as_str()).collect()
    }

    /// Set a member. The `id` member is fixed at construction and is left untouched.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if name != ID {
            self.0.insert(name, value);
        }
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Keep core members and only the listed attributes. An empty list keeps everything.
    pub fn project(&self, attrs: &[String]) -> Self {
        if attrs.is_empty() {
            return self.clone();
        }
        let members = self
            .0
            .iter()
            .filter(|(name, _)| {
                CORE_MEMBERS.contains(&name.as_str()) || attrs.iter().any(|a| a == *name)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self(members)
    }

    /// Borrow the underlying JSON object
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying JSON object
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl TryFrom<Map<String, Value>> for CompactedEntity {
    type Error = String;

    fn try_from(members: Map<String, Value>) -> Result<Self, Self::Error> {
        match members.get(ID) {
            Some(Value::String(id)) if !id.is_empty() => Ok(Self(members)),
            Some(other) => Err(format!("entity id must be a non-empty string, got {}", json_kind(other))),
            None => Err("entity has no id".to_string()),
        }
    }
}

impl From<CompactedEntity> for Map<String, Value> {
    fn from(entity: CompactedEntity) -> Self {
        entity.0
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
