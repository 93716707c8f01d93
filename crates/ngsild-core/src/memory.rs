//! In-memory collaborators
//!
//! Used by the command-line tool and by tests. Both types can be switched
//! into an unavailable state to simulate infrastructure faults.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;

use crate::collaborators::{LocalStore, RegistrationCatalogue};
use crate::error::{FederationError, FederationResult};
use crate::models::{CSRFilters, CompactedEntity, ContextSourceRegistration, EntitiesQuery, RequestContext, TypeSelection};

/// Registration catalogue held in memory, in registration order
#[derive(Default)]
pub struct InMemoryCatalogue {
    registrations: RwLock<Vec<ContextSourceRegistration>>,
    unavailable: AtomicBool,
}

impl InMemoryCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalogue seeded with registrations
    pub fn with_registrations(registrations: Vec<ContextSourceRegistration>) -> Self {
        Self {
            registrations: RwLock::new(registrations),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Add a registration, replacing any registration with the same id in place
    pub fn register(&self, registration: ContextSourceRegistration) {
        let mut registrations = self.registrations.write();
        match registrations.iter_mut().find(|r| r.id == registration.id) {
            Some(existing) => *existing = registration,
            None => registrations.push(registration),
        }
    }

    /// Remove a registration by id
    pub fn unregister(&self, id: &str) -> Option<ContextSourceRegistration> {
        let mut registrations = self.registrations.write();
        let index = registrations.iter().position(|r| r.id == id)?;
        Some(registrations.remove(index))
    }

    /// All registrations in registration order
    pub fn list(&self) -> Vec<ContextSourceRegistration> {
        self.registrations.read().clone()
    }

    /// Simulate the catalogue backend going down (or coming back)
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

#[async_trait]
impl RegistrationCatalogue for InMemoryCatalogue {
    async fn find_matching(
        &self,
        _context: &RequestContext,
        filters: &CSRFilters,
    ) -> FederationResult<Vec<ContextSourceRegistration>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(FederationError::Catalogue(
                "registration catalogue unavailable".to_string(),
            ));
        }
        Ok(self
            .registrations
            .read()
            .iter()
            .filter(|r| filters.matches(r))
            .cloned()
            .collect())
    }
}

/// Entity store held in memory, in insertion order
#[derive(Default)]
pub struct InMemoryLocalStore {
    entities: RwLock<Vec<CompactedEntity>>,
    unavailable: AtomicBool,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with entities
    pub fn with_entities(entities: Vec<CompactedEntity>) -> Self {
        let store = Self::new();
        for entity in entities {
            store.upsert(entity);
        }
        store
    }

    /// Insert an entity, replacing any entity with the same id in place
    pub fn upsert(&self, entity: CompactedEntity) {
        let mut entities = self.entities.write();
        match entities.iter_mut().find(|e| e.id() == entity.id()) {
            Some(existing) => *existing = entity,
            None => entities.push(entity),
        }
    }

    /// Number of stored entities
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Whether the store holds no entities
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Simulate the store going down (or coming back)
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> FederationResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(FederationError::LocalStore("local store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Compiled form of the query dimensions the in-memory store evaluates
struct LocalFilter {
    id_pattern: Option<Regex>,
    types: Option<TypeSelection>,
}

impl LocalFilter {
    fn compile(query: &EntitiesQuery) -> FederationResult<Self> {
        if query.q.is_some() {
            return Err(FederationError::InvalidRequest(
                "The in-memory store does not evaluate q expressions".to_string(),
            ));
        }
        let id_pattern = query
            .id_pattern
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    FederationError::InvalidRequest(format!("Invalid idPattern '{}': {}", p, e))
                })
            })
            .transpose()?;
        let types = query
            .type_selection
            .as_deref()
            .map(TypeSelection::parse)
            .transpose()?;
        Ok(Self { id_pattern, types })
    }

    fn accepts(&self, query: &EntitiesQuery, entity: &CompactedEntity) -> bool {
        if !query.ids.is_empty() && !query.ids.iter().any(|id| id == entity.id()) {
            return false;
        }
        if let Some(ref pattern) = self.id_pattern {
            if !pattern.is_match(entity.id()) {
                return false;
            }
        }
        if let Some(ref types) = self.types {
            if !types.evaluate(&entity.types()) {
                return false;
            }
        }
        query.attrs.is_empty() || query.attrs.iter().any(|a| entity.contains(a))
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn query_entities(
        &self,
        _context: &RequestContext,
        query: &EntitiesQuery,
    ) -> FederationResult<(Vec<CompactedEntity>, usize)> {
        self.check_available()?;
        let filter = LocalFilter::compile(query)?;

        let entities = self.entities.read();
        let matching: Vec<&CompactedEntity> = entities
            .iter()
            .filter(|e| filter.accepts(query, e))
            .collect();
        let count = matching.len();

        let page = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|e| e.project(&query.attrs))
            .collect();

        Ok((page, count))
    }

    async fn query_entity(
        &self,
        _context: &RequestContext,
        entity_id: &str,
        query: &EntitiesQuery,
    ) -> FederationResult<Option<CompactedEntity>> {
        self.check_available()?;
        Ok(self
            .entities
            .read()
            .iter()
            .find(|e| e.id() == entity_id)
            .map(|e| e.project(&query.attrs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hive(id: &str) -> CompactedEntity {
        CompactedEntity::new(id, "Beehive")
            .with("temperature", json!({"type": "Property", "value": 30}))
            .with("name", json!({"type": "Property", "value": id}))
    }

    #[tokio::test]
    async fn query_filters_pages_and_counts() {
        let store = InMemoryLocalStore::with_entities(vec![
            hive("urn:1"),
            CompactedEntity::new("urn:2", "Apiary"),
            hive("urn:3"),
            hive("urn:4"),
        ]);

        let query = EntitiesQuery::by_type("Beehive").with_limit(2);
        let (page, count) = store
            .query_entities(&RequestContext::new(), &query)
            .await
            .unwrap();

        assert_eq!(count, 3);
        let ids: Vec<&str> = page.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["urn:1", "urn:3"]);
    }

    #[tokio::test]
    async fn query_projects_requested_attributes() {
        let store = InMemoryLocalStore::with_entities(vec![hive("urn:1")]);
        let query = EntitiesQuery::by_type("Beehive").with_attrs(["temperature"]);
        let (page, _) = store
            .query_entities(&RequestContext::new(), &query)
            .await
            .unwrap();
        assert!(page[0].contains("temperature"));
        assert!(!page[0].contains("name"));
    }

    #[tokio::test]
    async fn query_entity_absent_is_none() {
        let store = InMemoryLocalStore::new();
        let found = store
            .query_entity(&RequestContext::new(), "urn:missing", &EntitiesQuery::default())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn unavailable_store_is_a_local_store_error() {
        let store = InMemoryLocalStore::new();
        store.set_available(false);
        let err = store
            .query_entities(&RequestContext::new(), &EntitiesQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::LocalStore(_)));
    }

    #[tokio::test]
    async fn catalogue_keeps_registration_order_and_replaces_in_place() {
        let catalogue = InMemoryCatalogue::new();
        catalogue.register(ContextSourceRegistration::new("urn:csr:b", "http://b", "Beehive"));
        catalogue.register(ContextSourceRegistration::new("urn:csr:a", "http://a", "Beehive"));
        catalogue.register(ContextSourceRegistration::new("urn:csr:b", "http://b2", "Beehive"));

        let filters = CSRFilters::for_query(&EntitiesQuery::by_type("Beehive")).unwrap();
        let found = catalogue
            .find_matching(&RequestContext::new(), &filters)
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["urn:csr:b", "urn:csr:a"]);
        assert_eq!(found[0].endpoint, "http://b2");
    }

    #[tokio::test]
    async fn unavailable_catalogue_is_a_catalogue_error() {
        let catalogue = InMemoryCatalogue::new();
        catalogue.set_available(false);
        let filters = CSRFilters::for_query(&EntitiesQuery::default()).unwrap();
        let err = catalogue
            .find_matching(&RequestContext::new(), &filters)
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::Catalogue(_)));
    }
}
