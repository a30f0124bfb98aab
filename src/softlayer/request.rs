//! REST request targets
//!
//! A [`RequestTarget`] names one call against the API:
//! `<Service>[/<id>]/<action>.json` plus an optional object mask (sparse field
//! selection) and object filter (row selection). Mutating calls send their
//! payload inside a [`Parameters`] envelope.

use serde::Serialize;
use serde_json::{Map, Value};

/// Public REST endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.softlayer.com/rest/v3";

/// Server-side field projection, rendered as `mask[a,b.c,d[e]]`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectMask {
    paths: Vec<String>,
}

impl ObjectMask {
    /// Build a mask from field paths. Order is kept, duplicates are dropped.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for path in paths {
            let path = path.into();
            let path = path.trim();
            if !path.is_empty() && !unique.iter().any(|p| p == path) {
                unique.push(path.to_string());
            }
        }
        Self { paths: unique }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn render(&self) -> String {
        format!("mask[{}]", self.paths.join(","))
    }
}

/// Server-side row filter
///
/// Only equality filters are needed: the dotted path `a.b.c` becomes
/// `{"a":{"b":{"c":{"operation": value}}}}`. A filter is immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectFilter(Value);

impl ObjectFilter {
    pub fn equals(path: &str, value: impl Into<Value>) -> Self {
        let mut node = serde_json::json!({ "operation": value.into() });
        for segment in path.rsplit('.').filter(|s| !s.is_empty()) {
            let mut map = Map::new();
            map.insert(segment.to_string(), node);
            node = Value::Object(map);
        }
        Self(node)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn render(&self) -> String {
        self.0.to_string()
    }
}

/// One API call: service, optional instance id, action, mask and filter
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTarget {
    service: String,
    id: Option<i64>,
    action: String,
    mask: Option<ObjectMask>,
    filter: Option<ObjectFilter>,
}

impl RequestTarget {
    /// Call an action on one instance: `<service>/<id>/<action>.json`
    pub fn by_id(service: &str, id: i64, action: &str) -> Self {
        Self {
            service: service.to_string(),
            id: Some(id),
            action: action.to_string(),
            mask: None,
            filter: None,
        }
    }

    /// Call a service-level action: `<service>/<action>.json`
    pub fn list(service: &str, action: &str) -> Self {
        Self {
            service: service.to_string(),
            id: None,
            action: action.to_string(),
            mask: None,
            filter: None,
        }
    }

    /// Attach a field projection. An empty mask means "default field set".
    pub fn with_mask(mut self, mask: ObjectMask) -> Self {
        self.mask = (!mask.is_empty()).then_some(mask);
        self
    }

    pub fn with_filter(mut self, filter: ObjectFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn mask(&self) -> Option<&ObjectMask> {
        self.mask.as_ref()
    }

    pub fn filter(&self) -> Option<&ObjectFilter> {
        self.filter.as_ref()
    }

    /// Path relative to the endpoint, query values percent-encoded
    pub fn path(&self) -> String {
        let mut path = match self.id {
            Some(id) => format!("{}/{}/{}.json", self.service, id, self.action),
            None => format!("{}/{}.json", self.service, self.action),
        };

        let mut query_parts: Vec<String> = Vec::new();
        if let Some(mask) = &self.mask {
            query_parts.push(format!("objectMask={}", urlencoding::encode(&mask.render())));
        }
        if let Some(filter) = &self.filter {
            query_parts.push(format!(
                "objectFilter={}",
                urlencoding::encode(&filter.render())
            ));
        }

        if !query_parts.is_empty() {
            path.push('?');
            path.push_str(&query_parts.join("&"));
        }
        path
    }
}

/// Request body envelope: `{"parameters": [...]}`
///
/// `T` is a tuple so each element becomes one positional parameter.
#[derive(Debug, Clone, Serialize)]
pub struct Parameters<T> {
    parameters: T,
}

impl<'a, E: Serialize> Parameters<(&'a E,)> {
    /// Wrap a single entity, the shape of every create and edit call
    pub fn single(entity: &'a E) -> Self {
        Self {
            parameters: (entity,),
        }
    }
}

impl<'a, A: Serialize, B: Serialize> Parameters<(&'a A, &'a B)> {
    pub fn pair(first: &'a A, second: &'a B) -> Self {
        Self {
            parameters: (first, second),
        }
    }
}

impl Parameters<[(); 0]> {
    /// An empty envelope for actions that take no arguments
    pub fn none() -> Self {
        Self { parameters: [] }
    }
}
