//! Context source registration selection criteria

use std::collections::BTreeSet;

use regex::Regex;

use super::query::EntitiesQuery;
use super::registration::{ContextSourceRegistration, EntityInfo, Operation, RegistrationInfo};
use super::type_selection::TypeSelection;
use crate::error::{FederationError, FederationResult};

/// Normalized criteria for selecting context source registrations.
///
/// A registration matches iff it supports at least one of `operations`
/// and at least one of its information entries is compatible with every
/// non-empty dimension. Empty dimensions are wildcards.
#[derive(Debug, Clone)]
pub struct CSRFilters {
    pub ids: BTreeSet<String>,
    pub id_pattern: Option<Regex>,
    pub type_selection: Option<TypeSelection>,
    pub attrs: BTreeSet<String>,
    pub operations: Vec<Operation>,
}

impl CSRFilters {
    /// Filters for an entity query
    pub fn for_query(query: &EntitiesQuery) -> FederationResult<Self> {
        Self::build(
            query.ids.iter().cloned().collect(),
            query,
            vec![Operation::QueryEntity],
        )
    }

    /// Filters for retrieving one entity
    pub fn for_retrieve(entity_id: &str, query: &EntitiesQuery) -> FederationResult<Self> {
        if entity_id.is_empty() {
            return Err(FederationError::InvalidRequest(
                "Entity id must not be empty".to_string(),
            ));
        }
        Self::build(
            BTreeSet::from([entity_id.to_string()]),
            query,
            vec![Operation::RetrieveEntity],
        )
    }

    fn build(
        ids: BTreeSet<String>,
        query: &EntitiesQuery,
        operations: Vec<Operation>,
    ) -> FederationResult<Self> {
        let id_pattern = query
            .id_pattern
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    FederationError::InvalidRequest(format!("Invalid idPattern '{}': {}", p, e))
                })
            })
            .transpose()?;

        let type_selection = query
            .type_selection
            .as_deref()
            .map(TypeSelection::parse)
            .transpose()?;

        Ok(Self {
            ids,
            id_pattern,
            type_selection,
            attrs: query.attrs.iter().cloned().collect(),
            operations,
        })
    }

    /// Whether `registration` is eligible under these filters
    pub fn matches(&self, registration: &ContextSourceRegistration) -> bool {
        registration.supports_any(&self.operations)
            && registration
                .information
                .iter()
                .any(|info| self.info_compatible(info))
    }

    /// Attribute names the registration declares on its compatible
    /// information entries, or `None` when any of them covers all attributes
    pub fn declared_attributes(&self, registration: &ContextSourceRegistration) -> Option<BTreeSet<String>> {
        let mut declared = BTreeSet::new();
        for info in registration
            .information
            .iter()
            .filter(|info| self.info_compatible(info))
        {
            declared.extend(info.declared_attributes()?.into_iter().map(String::from));
        }
        Some(declared)
    }

    fn info_compatible(&self, info: &RegistrationInfo) -> bool {
        let entities_ok = match info.entities {
            Some(ref entities) if !entities.is_empty() => {
                entities.iter().any(|e| self.entity_compatible(e))
            }
            _ => true,
        };
        entities_ok && self.attrs_compatible(info)
    }

    fn entity_compatible(&self, entity: &EntityInfo) -> bool {
        if let Some(ref selection) = self.type_selection {
            if !selection.mentions(&entity.entity_type) {
                return false;
            }
        }

        if !self.ids.is_empty() {
            let ids_ok = match (&entity.id, &entity.id_pattern) {
                (Some(id), _) => self.ids.contains(id),
                (None, Some(pattern)) => self.ids.iter().any(|id| pattern.is_match(id)),
                (None, None) => true,
            };
            if !ids_ok {
                return false;
            }
        }

        match (&self.id_pattern, &entity.id) {
            (Some(pattern), Some(id)) => pattern.is_match(id),
            // Two patterns may overlap; the source is asked and decides
            _ => true,
        }
    }

    fn attrs_compatible(&self, info: &RegistrationInfo) -> bool {
        if self.attrs.is_empty() {
            return true;
        }
        match info.declared_attributes() {
            None => true,
            Some(declared) => declared.iter().any(|name| self.attrs.contains(*name)),
        }
    }
}
