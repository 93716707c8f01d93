//! Entity merge and count reconciliation
//!
//! Fragments of the same entity arrive from the local store and from remote
//! sources. They are merged attribute by attribute: the first candidate
//! carrying an attribute instance wins, later differing values are dropped
//! with an `attribute-conflict` warning, and attributes present in only some
//! candidates are unioned. Candidates are ordered local first, then remotes
//! in selection order.
//!
//! Attribute instances are keyed by `datasetId`, so instances with distinct
//! dataset ids from different sources are all kept.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use ngsild_core::{
    CompactedEntity, FederationError, FederationResult, MergeCandidate, NgsiLdWarning, Origin,
    WarningCode, CREATED_AT, DATASET_ID, JSONLD_CONTEXT, MODIFIED_AT, SCOPE, TYPE,
};
use serde_json::Value;
use tracing::warn;

/// Merge the local result list with remote fragments.
///
/// Output holds one entity per id: local ids in local order, followed by ids
/// first seen remotely in the order they were discovered.
pub fn merge_entities_lists(
    local: Vec<CompactedEntity>,
    remote: Vec<MergeCandidate>,
) -> (Vec<CompactedEntity>, Vec<NgsiLdWarning>) {
    let mut groups: Vec<Vec<MergeCandidate>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for candidate in local.into_iter().map(MergeCandidate::local).chain(remote) {
        match index.get(candidate.entity.id()).copied() {
            Some(i) => groups[i].push(candidate),
            None => {
                index.insert(candidate.entity.id().to_string(), groups.len());
                groups.push(vec![candidate]);
            }
        }
    }

    let mut warnings = Vec::new();
    let entities = groups
        .into_iter()
        .filter_map(|group| merge_group(group, &mut warnings))
        .collect();
    (entities, warnings)
}

/// Merge every fragment of one entity.
///
/// Fails with [`FederationError::EntityNotFound`] when there is no fragment
/// at all.
pub fn merge_entities(
    entity_id: &str,
    local: Option<CompactedEntity>,
    remote: Vec<MergeCandidate>,
) -> FederationResult<(CompactedEntity, Vec<NgsiLdWarning>)> {
    let candidates = local
        .map(MergeCandidate::local)
        .into_iter()
        .chain(remote)
        .collect();

    let mut warnings = Vec::new();
    match merge_group(candidates, &mut warnings) {
        Some(entity) => Ok((entity, warnings)),
        None => Err(FederationError::EntityNotFound(entity_id.to_string())),
    }
}

/// Total count across sources whose answers may overlap: the largest count
/// reported by anyone, never the sum.
pub fn reconcile_count(local: usize, remote: impl IntoIterator<Item = usize>) -> usize {
    remote.into_iter().fold(local, usize::max)
}

fn merge_group(
    candidates: Vec<MergeCandidate>,
    warnings: &mut Vec<NgsiLdWarning>,
) -> Option<CompactedEntity> {
    let mut candidates = candidates.into_iter();
    let mut merger = EntityMerger::new(candidates.next()?);
    for candidate in candidates {
        merger.absorb(candidate, warnings);
    }
    Some(merger.entity)
}

/// Attribute instance key: attribute name and optional datasetId
type InstanceKey = (String, Option<String>);

struct EntityMerger {
    entity: CompactedEntity,
    /// Where each kept attribute instance came from
    owners: HashMap<InstanceKey, Origin>,
}

impl EntityMerger {
    fn new(first: MergeCandidate) -> Self {
        let mut owners = HashMap::new();
        for (name, value) in first.entity.attributes() {
            for instance in instances(value) {
                owners.insert((name.clone(), dataset_id(instance)), first.origin.clone());
            }
        }
        Self {
            entity: first.entity,
            owners,
        }
    }

    fn absorb(&mut self, candidate: MergeCandidate, warnings: &mut Vec<NgsiLdWarning>) {
        let MergeCandidate { entity, origin } = candidate;

        self.union_member(TYPE, &entity);
        self.union_member(SCOPE, &entity);
        self.merge_timestamp(CREATED_AT, &entity, false);
        self.merge_timestamp(MODIFIED_AT, &entity, true);
        if !self.entity.contains(JSONLD_CONTEXT) {
            if let Some(context) = entity.get(JSONLD_CONTEXT) {
                self.entity.set(JSONLD_CONTEXT, context.clone());
            }
        }

        for (name, incoming) in entity.attributes() {
            let merged = match self.entity.get(name) {
                None => {
                    for instance in instances(incoming) {
                        self.owners
                            .insert((name.clone(), dataset_id(instance)), origin.clone());
                    }
                    Some(incoming.clone())
                }
                Some(existing) => {
                    let existing = existing.clone();
                    self.merge_attribute(name, &existing, incoming, &origin, warnings)
                }
            };
            if let Some(value) = merged {
                self.entity.set(name.clone(), value);
            }
        }
    }

    /// Returns the new attribute value, or `None` when the kept value stands
    fn merge_attribute(
        &mut self,
        name: &str,
        existing: &Value,
        incoming: &Value,
        origin: &Origin,
        warnings: &mut Vec<NgsiLdWarning>,
    ) -> Option<Value> {
        let mut kept: Vec<Value> = instances(existing).into_iter().cloned().collect();
        let kept_before = kept.len();

        for instance in instances(incoming) {
            let key = dataset_id(instance);
            match kept.iter().find(|k| dataset_id(k) == key) {
                None => {
                    kept.push(instance.clone());
                    self.owners.insert((name.to_string(), key), origin.clone());
                }
                Some(current) if current == instance => {}
                Some(_) => warnings.push(self.conflict(name, key, origin)),
            }
        }

        (kept.len() > kept_before).then_some(Value::Array(kept))
    }

    fn conflict(&self, name: &str, dataset: Option<String>, loser: &Origin) -> NgsiLdWarning {
        let winner = self
            .owners
            .get(&(name.to_string(), dataset.clone()))
            .map(ToString::to_string)
            .unwrap_or_else(|| "an earlier source".to_string());
        let attribute = match dataset {
            Some(ref dataset) => format!("'{}' (datasetId {})", name, dataset),
            None => format!("'{}'", name),
        };

        warn!(
            entity_id = %self.entity.id(),
            attribute = %name,
            kept = %winner,
            dropped = %loser,
            "Conflicting attribute values"
        );

        NgsiLdWarning {
            registration_id: loser.registration_id().map(String::from),
            code: WarningCode::AttributeConflict,
            message: format!(
                "Entity {}: attribute {} from {} conflicts with the value from {}; keeping the value from {}",
                self.entity.id(),
                attribute,
                loser,
                winner,
                winner
            ),
        }
    }

    /// Ordered union of a string-or-array member (`type`, `scope`)
    fn union_member(&mut self, member: &str, other: &CompactedEntity) {
        let mut values = strings(self.entity.get(member));
        let before = values.len();
        for value in strings(other.get(member)) {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        if values.len() > before {
            let merged = match values.len() {
                1 => Value::String(values.remove(0)),
                _ => Value::Array(values.into_iter().map(Value::String).collect()),
            };
            self.entity.set(member, merged);
        }
    }

    /// Keep the earliest (or, with `keep_later`, the latest) timestamp
    fn merge_timestamp(&mut self, member: &str, other: &CompactedEntity, keep_later: bool) {
        let Some(incoming) = other.get(member) else {
            return;
        };
        let replace = match self.entity.get(member) {
            None => true,
            Some(current) => match (timestamp(current), timestamp(incoming)) {
                (Some(current), Some(incoming)) if keep_later => incoming > current,
                (Some(current), Some(incoming)) => incoming < current,
                (None, Some(_)) => true,
                _ => false,
            },
        };
        if replace {
            self.entity.set(member, incoming.clone());
        }
    }
}

/// Instances of an attribute: the elements of a non-empty array of
/// objects, otherwise the value itself
fn instances(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            items.iter().collect()
        }
        other => vec![other],
    }
}

fn dataset_id(instance: &Value) -> Option<String> {
    instance
        .get(DATASET_ID)
        .and_then(Value::as_str)
        .map(String::from)
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn timestamp(value: &Value) -> Option<DateTime<FixedOffset>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}
