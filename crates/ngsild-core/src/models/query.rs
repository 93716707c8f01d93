//! Entity query parameters and per-request context

use serde::{Deserialize, Serialize};

/// Parameters of an NGSI-LD entity query (`GET /ngsi-ld/v1/entities`) or of
/// a single-entity retrieval.
///
/// Values are kept in their textual form so they can be forwarded verbatim
/// to remote context sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitiesQuery {
    /// Entity ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    /// Regular expression over entity ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_pattern: Option<String>,
    /// Type selection expression
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_selection: Option<String>,
    /// Attribute projection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attrs: Vec<String>,
    /// NGSI-LD query language expression
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// Representation options (e.g. `keyValues`, `sysAttrs`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Page size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Page offset
    #[serde(default)]
    pub offset: usize,
}

impl EntitiesQuery {
    /// Query selecting entities by type selection
    pub fn by_type(type_selection: impl Into<String>) -> Self {
        Self {
            type_selection: Some(type_selection.into()),
            ..Default::default()
        }
    }

    /// Restrict the query to the given attributes
    pub fn with_attrs<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs = attrs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the page size
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs for forwarding this query, in a stable order.
    ///
    /// `count=true` is always requested so remote sources report their total.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if !self.ids.is_empty() {
            pairs.push(("id".to_string(), self.ids.join(",")));
        }
        if let Some(ref pattern) = self.id_pattern {
            pairs.push(("idPattern".to_string(), pattern.clone()));
        }
        if let Some(ref types) = self.type_selection {
            pairs.push(("type".to_string(), types.clone()));
        }
        if !self.attrs.is_empty() {
            pairs.push(("attrs".to_string(), self.attrs.join(",")));
        }
        if let Some(ref q) = self.q {
            pairs.push(("q".to_string(), q.clone()));
        }
        if !self.options.is_empty() {
            pairs.push(("options".to_string(), self.options.join(",")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if self.offset > 0 {
            pairs.push(("offset".to_string(), self.offset.to_string()));
        }
        pairs.push(("count".to_string(), "true".to_string()));
        pairs
    }
}

/// Per-request context passed explicitly through every call boundary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Tenant (`NGSILD-Tenant` header); `None` is the default tenant
    pub tenant: Option<String>,
    /// JSON-LD contexts the caller's terms are compacted against
    pub contexts: Vec<String>,
    /// Caller headers to forward to remote sources (e.g. `Authorization`)
    pub headers: Vec<(String, String)>,
}

impl RequestContext {
    /// Context for the default tenant with no extra headers
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tenant
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Add a JSON-LD context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.contexts.push(context.into());
        self
    }

    /// Add a header to forward
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_pairs_always_request_count() {
        let pairs = EntitiesQuery::default().to_query_pairs();
        assert_eq!(pairs, vec![("count".to_string(), "true".to_string())]);
    }

    #[test]
    fn query_pairs_forward_every_set_parameter() {
        let query = EntitiesQuery {
            ids: vec!["urn:1".into(), "urn:2".into()],
            id_pattern: Some("urn:.*".into()),
            type_selection: Some("Beehive;Sensor".into()),
            attrs: vec!["temperature".into(), "name".into()],
            q: Some("temperature>20".into()),
            options: vec!["keyValues".into()],
            limit: Some(10),
            offset: 20,
        };

        let names: Vec<String> = query.to_query_pairs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            names,
            vec!["id", "idPattern", "type", "attrs", "q", "options", "limit", "offset", "count"]
        );
        assert!(query
            .to_query_pairs()
            .contains(&("attrs".to_string(), "temperature,name".to_string())));
    }

    #[test]
    fn deserialize_from_camel_case() {
        let query: EntitiesQuery = serde_json::from_value(serde_json::json!({
            "type": "Beehive",
            "idPattern": "urn:ngsi-ld:Beehive:.*",
            "limit": 5
        }))
        .unwrap();
        assert_eq!(query.type_selection.as_deref(), Some("Beehive"));
        assert_eq!(query.id_pattern.as_deref(), Some("urn:ngsi-ld:Beehive:.*"));
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, 0);
    }
}
