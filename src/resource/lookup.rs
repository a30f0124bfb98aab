//! Name <-> id resolution
//!
//! Many API fields take a numeric id for what users know by name: datacenters,
//! routing methods, health check types and so on. A [`Resolver`] translates in
//! either direction with one fresh round trip per call. Nothing is memoised, so
//! a second call always sees current remote state.

use super::registry::{get_lookup, LookupDef};
use crate::error::{SlError, SlResult};
use crate::softlayer::client::SlClient;
use crate::softlayer::request::{ObjectFilter, ObjectMask, RequestTarget};
use serde_json::Value;
use std::fmt;

/// Entity kinds with a lookup definition in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Datacenter,
    RoutingMethod,
    RoutingType,
    HealthCheckType,
    LocationGroup,
    TerminationPolicy,
    Timezone,
}

impl LookupKind {
    pub const ALL: [LookupKind; 7] = [
        LookupKind::Datacenter,
        LookupKind::RoutingMethod,
        LookupKind::RoutingType,
        LookupKind::HealthCheckType,
        LookupKind::LocationGroup,
        LookupKind::TerminationPolicy,
        LookupKind::Timezone,
    ];

    pub fn key(self) -> &'static str {
        match self {
            LookupKind::Datacenter => "datacenter",
            LookupKind::RoutingMethod => "routing_method",
            LookupKind::RoutingType => "routing_type",
            LookupKind::HealthCheckType => "health_check_type",
            LookupKind::LocationGroup => "location_group",
            LookupKind::TerminationPolicy => "termination_policy",
            LookupKind::Timezone => "timezone",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.replace('-', "_");
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn def(self) -> SlResult<&'static LookupDef> {
        get_lookup(self.key())
            .ok_or_else(|| SlError::Unsupported(format!("no lookup definition for {}", self.key())))
    }
}

/// What the caller knows about the entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    ById(i64),
    ByName(String),
}

impl LookupKey {
    /// Digits are an id, anything else a name
    pub fn parse(input: &str) -> Self {
        match input.trim().parse::<i64>() {
            Ok(id) => LookupKey::ById(id),
            Err(_) => LookupKey::ByName(input.trim().to_string()),
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::ById(id) => write!(f, "{}", id),
            LookupKey::ByName(name) => write!(f, "{}", name),
        }
    }
}

/// The counterpart of a [`LookupKey`]: a name resolves to an id and vice versa
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Id(i64),
    Name(String),
}

pub struct Resolver<'a> {
    client: &'a SlClient,
    def: &'a LookupDef,
}

impl<'a> Resolver<'a> {
    pub fn new(client: &'a SlClient, def: &'a LookupDef) -> Self {
        Self { client, def }
    }

    pub fn for_kind(client: &'a SlClient, kind: LookupKind) -> SlResult<Self> {
        Ok(Self::new(client, kind.def()?))
    }

    pub async fn resolve(&self, key: &LookupKey) -> SlResult<Resolved> {
        match key {
            LookupKey::ById(id) => self.name_for(*id).await.map(Resolved::Name),
            LookupKey::ByName(name) => self.id_for(name).await.map(Resolved::Id),
        }
    }

    /// Filtered listing, then an exact-match scan of the rows
    pub async fn id_for(&self, name: &str) -> SlResult<i64> {
        let target = RequestTarget::list(&self.def.service, &self.def.list_method)
            .with_mask(self.mask())
            .with_filter(ObjectFilter::equals(&self.def.name_field, name));

        let rows: Vec<Value> = self.client.list(&target).await?;
        tracing::debug!(
            "{} lookup for {:?} returned {} rows",
            self.def.display_name,
            name,
            rows.len()
        );

        find_id_by_name(&rows, &self.def.name_field, &self.def.id_field, name)
            .ok_or_else(|| SlError::not_found(&self.def.display_name, name))
    }

    /// Direct get by id with a mask on the name field
    pub async fn name_for(&self, id: i64) -> SlResult<String> {
        let target = RequestTarget::by_id(&self.def.service, id, &self.def.get_method)
            .with_mask(self.mask());

        let row: Value = match self.client.get(&target).await {
            Ok(row) => row,
            Err(e) if e.is_not_found() => {
                return Err(SlError::not_found(&self.def.display_name, id))
            },
            Err(e) => return Err(e),
        };

        row.get(&self.def.name_field)
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| SlError::not_found(&self.def.display_name, id))
    }

    fn mask(&self) -> ObjectMask {
        ObjectMask::new([self.def.id_field.as_str(), self.def.name_field.as_str()])
    }
}

/// Id of the first row whose `name_field` equals `name` exactly
pub fn find_id_by_name(
    rows: &[Value],
    name_field: &str,
    id_field: &str,
    name: &str,
) -> Option<i64> {
    rows.iter()
        .find(|row| row.get(name_field).and_then(Value::as_str) == Some(name))
        .and_then(|row| row.get(id_field))
        .and_then(Value::as_i64)
}
