//! Context Source Registration models

use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A remote context source's advertised capability
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSourceRegistration {
    /// Registration identifier (URI)
    pub id: String,
    /// Optional human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_name: Option<String>,
    /// Base URI of the context source
    pub endpoint: String,
    /// Entities and attributes this source can answer for
    pub information: Vec<RegistrationInfo>,
    /// Registration mode
    #[serde(default)]
    pub mode: RegistrationMode,
    /// Supported operations (defaults to `federationOps`)
    #[serde(default = "default_operations")]
    pub operations: Vec<Operation>,
    /// Health of the most recent calls to this source
    #[serde(default)]
    pub status: RegistrationStatus,
}

fn default_operations() -> Vec<Operation> {
    vec![Operation::FederationOps]
}

impl ContextSourceRegistration {
    /// Create a registration answering queries and retrievals for one entity type
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, entity_type: &str) -> Self {
        Self {
            id: id.into(),
            registration_name: None,
            endpoint: endpoint.into(),
            information: vec![RegistrationInfo::for_type(entity_type)],
            mode: RegistrationMode::default(),
            operations: default_operations(),
            status: RegistrationStatus::default(),
        }
    }

    /// Replace the supported operations
    pub fn with_operations(mut self, operations: Vec<Operation>) -> Self {
        self.operations = operations;
        self
    }

    /// Replace the registration mode
    pub fn with_mode(mut self, mode: RegistrationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the information entries
    pub fn with_information(mut self, information: Vec<RegistrationInfo>) -> Self {
        self.information = information;
        self
    }

    /// Whether this registration supports `operation` directly or through a group
    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.iter().any(|op| op.covers(operation))
    }

    /// Whether this registration supports at least one of `operations`
    pub fn supports_any(&self, operations: &[Operation]) -> bool {
        operations.iter().any(|op| self.supports(*op))
    }

    /// Name used when reporting on this source (registration name or id)
    pub fn display_name(&self) -> &str {
        self.registration_name.as_deref().unwrap_or(&self.id)
    }
}

/// One entry of a registration's `information` member
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInfo {
    /// Entities covered; absent means any entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<EntityInfo>>,
    /// Property names covered; absent (with `relationship_names`) means all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_names: Option<Vec<String>>,
    /// Relationship names covered; absent (with `property_names`) means all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_names: Option<Vec<String>>,
}

impl RegistrationInfo {
    /// Information covering every entity of one type and all attributes
    pub fn for_type(entity_type: &str) -> Self {
        Self {
            entities: Some(vec![EntityInfo::of_type(entity_type)]),
            property_names: None,
            relationship_names: None,
        }
    }

    /// Declared attribute names, or `None` when every attribute is covered
    pub fn declared_attributes(&self) -> Option<Vec<&str>> {
        if self.property_names.is_none() && self.relationship_names.is_none() {
            return None;
        }
        Some(
            self.property_names
                .iter()
                .chain(self.relationship_names.iter())
                .flatten()
                .map(String::as_str)
                .collect(),
        )
    }
}

/// Entity selector inside a [`RegistrationInfo`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInfo {
    /// Exact entity id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Regular expression over entity ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_pattern: Option<IdPattern>,
    /// Entity type
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl EntityInfo {
    /// Selector matching every entity of one type
    pub fn of_type(entity_type: &str) -> Self {
        Self {
            id: None,
            id_pattern: None,
            entity_type: entity_type.to_string(),
        }
    }
}

/// A registered `idPattern`, compiled once when the registration is built.
///
/// A pattern that does not compile matches no id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct IdPattern {
    source: String,
    compiled: Option<Regex>,
}

impl IdPattern {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn is_match(&self, id: &str) -> bool {
        self.compiled.as_ref().is_some_and(|re| re.is_match(id))
    }
}

impl From<String> for IdPattern {
    fn from(source: String) -> Self {
        let compiled = match Regex::new(&source) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern = %source, error = %e, "Invalid registered idPattern, it matches no entity");
                None
            }
        };
        Self { source, compiled }
    }
}

impl From<&str> for IdPattern {
    fn from(source: &str) -> Self {
        Self::from(source.to_string())
    }
}

impl From<IdPattern> for String {
    fn from(pattern: IdPattern) -> Self {
        pattern.source
    }
}

impl PartialEq for IdPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for IdPattern {}

impl Deref for IdPattern {
    type Target = str;

    fn deref(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for IdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// How a context source relates to the local broker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationMode {
    /// Source holds data in addition to the local broker
    #[default]
    Inclusive,
    /// Source is the sole holder of the registered data
    Exclusive,
    /// Requests are redirected to the source
    Redirect,
    /// Source supplies fallback data only; lowest precedence
    Auxiliary,
}

/// NGSI-LD operations and operation groups a source may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    CreateEntity,
    UpdateEntity,
    AppendAttrs,
    UpdateAttrs,
    DeleteAttrs,
    DeleteEntity,
    CreateBatch,
    UpsertBatch,
    UpdateBatch,
    DeleteBatch,
    RetrieveEntity,
    QueryEntity,
    RetrieveEntityTypes,
    RetrieveEntityTypeDetails,
    RetrieveEntityTypeInfo,
    RetrieveAttrTypes,
    RetrieveAttrTypeDetails,
    RetrieveAttrTypeInfo,
    RetrieveTemporal,
    QueryTemporal,
    CreateSubscription,
    UpdateSubscription,
    RetrieveSubscription,
    QuerySubscription,
    DeleteSubscription,
    /// Group: every read operation a federating broker may forward
    FederationOps,
    /// Group: entity and attribute updates
    UpdateOps,
    /// Group: single-entity retrieval and entity query
    RetrieveOps,
    /// Group: everything a redirecting broker forwards
    RedirectionOps,
}

impl Operation {
    /// Operations contained in a group; empty for plain operations
    pub fn members(self) -> &'static [Operation] {
        use Operation::*;
        match self {
            FederationOps => &[
                RetrieveEntity,
                QueryEntity,
                RetrieveEntityTypes,
                RetrieveEntityTypeDetails,
                RetrieveEntityTypeInfo,
                RetrieveAttrTypes,
                RetrieveAttrTypeDetails,
                RetrieveAttrTypeInfo,
                RetrieveTemporal,
                QueryTemporal,
                CreateSubscription,
                UpdateSubscription,
                RetrieveSubscription,
                QuerySubscription,
                DeleteSubscription,
            ],
            UpdateOps => &[UpdateEntity, UpdateAttrs, AppendAttrs],
            RetrieveOps => &[RetrieveEntity, QueryEntity],
            RedirectionOps => &[
                CreateEntity,
                UpdateEntity,
                AppendAttrs,
                UpdateAttrs,
                DeleteAttrs,
                DeleteEntity,
                CreateBatch,
                UpsertBatch,
                UpdateBatch,
                DeleteBatch,
                RetrieveEntity,
                QueryEntity,
                RetrieveEntityTypes,
                RetrieveEntityTypeDetails,
                RetrieveEntityTypeInfo,
                RetrieveAttrTypes,
                RetrieveAttrTypeDetails,
                RetrieveAttrTypeInfo,
            ],
            _ => &[],
        }
    }

    /// Whether this operation is, or is a group containing, `other`
    pub fn covers(self, other: Operation) -> bool {
        self == other || self.members().contains(&other)
    }
}

/// Health snapshot of a registration, maintained by the health tracker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatus {
    /// When a call to the source last succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    /// When a call to the source last failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl RegistrationStatus {
    /// Healthy unless the most recent recorded call failed
    pub fn is_healthy(&self) -> bool {
        match (self.last_success_at, self.last_failure_at) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(success), Some(failure)) => success >= failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn deserialize_ngsi_ld_registration() {
        let csr: ContextSourceRegistration = serde_json::from_value(json!({
            "id": "urn:ngsi-ld:ContextSourceRegistration:a",
            "endpoint": "http://a:8080",
            "information": [{
                "entities": [{"type": "Beehive", "idPattern": "urn:ngsi-ld:Beehive:.*"}],
                "propertyNames": ["temperature"]
            }],
            "mode": "auxiliary",
            "operations": ["queryEntity", "retrieveOps"]
        }))
        .unwrap();

        assert_eq!(csr.mode, RegistrationMode::Auxiliary);
        assert_eq!(csr.operations, vec![Operation::QueryEntity, Operation::RetrieveOps]);
        assert_eq!(
            csr.information[0].entities.as_ref().unwrap()[0].id_pattern.as_deref(),
            Some("urn:ngsi-ld:Beehive:.*")
        );
        assert_eq!(csr.information[0].declared_attributes(), Some(vec!["temperature"]));
    }

    #[test]
    fn registered_id_pattern_is_compiled_on_load() {
        let info: EntityInfo = serde_json::from_value(json!({
            "type": "Beehive",
            "idPattern": "^urn:ngsi-ld:Beehive:"
        }))
        .unwrap();
        let pattern = info.id_pattern.as_ref().unwrap();
        assert!(pattern.is_valid());
        assert!(pattern.is_match("urn:ngsi-ld:Beehive:01"));
        assert!(!pattern.is_match("urn:ngsi-ld:Apiary:01"));
        assert_eq!(serde_json::to_value(&info).unwrap()["idPattern"], json!("^urn:ngsi-ld:Beehive:"));
    }

    #[test]
    fn invalid_registered_id_pattern_matches_nothing() {
        let pattern = IdPattern::from("urn:(");
        assert!(!pattern.is_valid());
        assert!(!pattern.is_match("urn:("));
        assert_eq!(pattern.as_str(), "urn:(");
    }

    #[test]
    fn operations_default_to_federation_ops() {
        let csr: ContextSourceRegistration = serde_json::from_value(json!({
            "id": "urn:csr:1",
            "endpoint": "http://a",
            "information": []
        }))
        .unwrap();
        assert!(csr.supports(Operation::QueryEntity));
        assert!(csr.supports(Operation::RetrieveEntity));
        assert!(!csr.supports(Operation::CreateEntity));
    }

    #[test]
    fn groups_cover_their_members() {
        assert!(Operation::RetrieveOps.covers(Operation::QueryEntity));
        assert!(Operation::RedirectionOps.covers(Operation::DeleteEntity));
        assert!(!Operation::UpdateOps.covers(Operation::QueryEntity));
        assert!(Operation::QueryEntity.covers(Operation::QueryEntity));
        assert!(!Operation::QueryEntity.covers(Operation::RetrieveEntity));
    }

    #[test]
    fn status_health_follows_most_recent_outcome() {
        let now = Utc::now();
        let mut status = RegistrationStatus::default();
        assert!(status.is_healthy());

        status.last_failure_at = Some(now);
        assert!(!status.is_healthy());

        status.last_success_at = Some(now + Duration::seconds(1));
        assert!(status.is_healthy());

        status.last_failure_at = Some(now + Duration::seconds(2));
        assert!(!status.is_healthy());
    }

    #[test]
    fn absent_attribute_lists_cover_everything() {
        let info = RegistrationInfo::for_type("Beehive");
        assert_eq!(info.declared_attributes(), None);

        let info = RegistrationInfo {
            relationship_names: Some(vec!["belongsTo".into()]),
            ..RegistrationInfo::for_type("Beehive")
        };
        assert_eq!(info.declared_attributes(), Some(vec!["belongsTo"]));
    }
}
