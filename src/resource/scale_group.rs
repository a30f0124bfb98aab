//! Autoscale groups
//!
//! `createObject` returns immediately with the group in `BUSY` state. The group
//! is usable once its status reaches `ACTIVE`.

use super::lifecycle::{ResourceLifecycle, Timeouts};
use super::lookup::{LookupKind, Resolver};
use crate::error::{SlError, SlResult};
use crate::poll::{PollState, Poller};
use crate::softlayer::client::SlClient;
use crate::softlayer::request::{ObjectMask, Parameters, RequestTarget};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SERVICE: &str = "SoftLayer_Scale_Group";

const ACTIVATION_PENDING: &[&str] = &["BUSY", "SCALING"];
const ACTIVATION_TARGET: &[&str] = &["ACTIVE"];

const SCALE_GROUP_MASK: &[&str] = &[
    "id",
    "name",
    "regionalGroup[id,name]",
    "minimumMemberCount",
    "maximumMemberCount",
    "cooldown",
    "status[keyName]",
    "terminationPolicy[keyName]",
    "virtualGuestMemberTemplate",
    "networkVlans[networkVlanId]",
    "loadBalancers[id,port,virtualServerId,healthCheck[id,healthCheckTypeId]]",
];

/// Health check run by a load balancer against group members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    /// Health check type name, e.g. `HTTP` or `HTTP-CUSTOM`
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub custom_method: Option<String>,
    #[serde(default)]
    pub custom_request: Option<String>,
    #[serde(default)]
    pub custom_response: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLoadBalancerSpec {
    pub virtual_server_id: i64,
    pub port: u16,
    pub health_check: HealthCheckSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleGroupSpec {
    pub name: String,
    pub regional_group: String,
    pub minimum_member_count: u32,
    pub maximum_member_count: u32,
    /// Seconds between two scale actions
    #[serde(default)]
    pub cooldown: u32,
    #[serde(default)]
    pub termination_policy: Option<String>,
    pub virtual_guest_member_template: Value,
    #[serde(default)]
    pub network_vlan_ids: Vec<i64>,
    #[serde(default)]
    pub load_balancers: Vec<GroupLoadBalancerSpec>,
}

impl ScaleGroupSpec {
    fn validate(&self) -> SlResult<()> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("missing name".to_string());
        }
        if self.regional_group.trim().is_empty() {
            problems.push("missing regional_group".to_string());
        }
        if self.minimum_member_count > self.maximum_member_count {
            problems.push(format!(
                "minimum_member_count {} exceeds maximum_member_count {}",
                self.minimum_member_count, self.maximum_member_count
            ));
        }
        if !self.virtual_guest_member_template.is_object() {
            problems.push("virtual_guest_member_template must be an object".to_string());
        }
        for lb in &self.load_balancers {
            if lb.port == 0 {
                problems.push(format!("virtual server {}: port must be set", lb.virtual_server_id));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SlError::validation("scale group", problems))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttributeType {
    keyname: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthAttribute {
    #[serde(rename = "type")]
    attribute_type: AttributeType,
    value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthCheckTemplate {
    health_check_type_id: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<HealthAttribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadBalancerAttachment {
    virtual_server_id: i64,
    port: u16,
    health_check: HealthCheckTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkVlanRef {
    pub network_vlan_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScaleGroupTemplate<'a> {
    name: &'a str,
    regional_group_id: i64,
    minimum_member_count: u32,
    maximum_member_count: u32,
    cooldown: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    termination_policy_id: Option<i64>,
    virtual_guest_member_template: &'a Value,
    network_vlans: Vec<NetworkVlanRef>,
    load_balancers: Vec<LoadBalancerAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyNamed {
    pub key_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegionalGroup {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub health_check_type_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupLoadBalancerRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub port: u16,
    pub virtual_server_id: i64,
    #[serde(default)]
    pub health_check: Option<HealthCheckRecord>,
}

/// Scale group as returned by the API
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleGroupRecord {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub regional_group: Option<RegionalGroup>,
    #[serde(default)]
    pub minimum_member_count: Option<u32>,
    #[serde(default)]
    pub maximum_member_count: Option<u32>,
    #[serde(default)]
    pub cooldown: Option<u32>,
    #[serde(default)]
    pub status: Option<KeyNamed>,
    #[serde(default)]
    pub termination_policy: Option<KeyNamed>,
    #[serde(default)]
    pub virtual_guest_member_template: Option<Value>,
    #[serde(default)]
    pub network_vlans: Vec<NetworkVlanRef>,
    #[serde(default)]
    pub load_balancers: Vec<GroupLoadBalancerRecord>,
}

impl ScaleGroupRecord {
    fn status_label(&self) -> String {
        self.status
            .as_ref()
            .map(|s| s.key_name.clone())
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupLoadBalancerState {
    pub virtual_server_id: i64,
    pub port: u16,
    pub health_check_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleGroupState {
    pub id: i64,
    pub name: Option<String>,
    pub status: String,
    pub regional_group: Option<String>,
    pub minimum_member_count: Option<u32>,
    pub maximum_member_count: Option<u32>,
    pub cooldown: Option<u32>,
    pub termination_policy: Option<String>,
    pub virtual_guest_member_template: Option<Value>,
    pub network_vlan_ids: Vec<i64>,
    pub load_balancers: Vec<GroupLoadBalancerState>,
}

fn health_attributes(check: &HealthCheckSpec) -> Vec<HealthAttribute> {
    [
        ("HTTP_CUSTOM_TYPE", &check.custom_method),
        ("LOCATION", &check.custom_request),
        ("EXPECTED_RESPONSE", &check.custom_response),
    ]
    .into_iter()
    .filter_map(|(keyname, value)| {
        value.as_ref().map(|v| HealthAttribute {
            attribute_type: AttributeType { keyname },
            value: v.clone(),
        })
    })
    .collect()
}

pub struct ScaleGroups {
    client: SlClient,
    timeouts: Timeouts,
}

impl ScaleGroups {
    pub fn new(client: SlClient) -> Self {
        Self {
            client,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Resolve every name in the spec and build the wire template
    async fn template<'a>(&self, spec: &'a ScaleGroupSpec) -> SlResult<ScaleGroupTemplate<'a>> {
        let regional_group_id = Resolver::for_kind(&self.client, LookupKind::LocationGroup)?
            .id_for(&spec.regional_group)
            .await?;

        let termination_policy_id = match &spec.termination_policy {
            Some(policy) => Some(
                Resolver::for_kind(&self.client, LookupKind::TerminationPolicy)?
                    .id_for(policy)
                    .await?,
            ),
            None => None,
        };

        let health_checks = Resolver::for_kind(&self.client, LookupKind::HealthCheckType)?;
        let type_ids = try_join_all(
            spec.load_balancers
                .iter()
                .map(|lb| health_checks.id_for(&lb.health_check.type_name)),
        )
        .await?;

        let load_balancers = spec
            .load_balancers
            .iter()
            .zip(type_ids)
            .map(|(lb, health_check_type_id)| LoadBalancerAttachment {
                virtual_server_id: lb.virtual_server_id,
                port: lb.port,
                health_check: HealthCheckTemplate {
                    health_check_type_id,
                    attributes: health_attributes(&lb.health_check),
                },
            })
            .collect();

        Ok(ScaleGroupTemplate {
            name: &spec.name,
            regional_group_id,
            minimum_member_count: spec.minimum_member_count,
            maximum_member_count: spec.maximum_member_count,
            cooldown: spec.cooldown,
            termination_policy_id,
            virtual_guest_member_template: &spec.virtual_guest_member_template,
            network_vlans: spec
                .network_vlan_ids
                .iter()
                .map(|&network_vlan_id| NetworkVlanRef { network_vlan_id })
                .collect(),
            load_balancers,
        })
    }

    async fn wait_for_active(&self, id: i64) -> SlResult<()> {
        let target = RequestTarget::by_id(SERVICE, id, "getObject")
            .with_mask(ObjectMask::new(["id", "status[keyName]"]));
        let target = &target;
        let client = &self.client;

        Poller::new(format!("scale group {} to become active", id), self.timeouts.activation)
            .pending(ACTIVATION_PENDING)
            .target(ACTIVATION_TARGET)
            .run(move || async move {
                let record: ScaleGroupRecord = client.get(target).await?;
                let label = record.status_label();
                Ok(PollState::new(record.id, label))
            })
            .await?;
        Ok(())
    }

    async fn fetch(&self, id: i64) -> SlResult<Option<ScaleGroupRecord>> {
        let target = RequestTarget::by_id(SERVICE, id, "getObject")
            .with_mask(ObjectMask::new(SCALE_GROUP_MASK.iter().copied()));
        match self.client.get(&target).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn to_state(&self, record: ScaleGroupRecord) -> SlResult<ScaleGroupState> {
        let health_checks = Resolver::for_kind(&self.client, LookupKind::HealthCheckType)?;
        let type_names = try_join_all(record.load_balancers.iter().map(|lb| {
            let health_checks = &health_checks;
            async move {
                match &lb.health_check {
                    Some(check) => health_checks
                        .name_for(check.health_check_type_id)
                        .await
                        .map(Some),
                    None => Ok(None),
                }
            }
        }))
        .await?;

        let status = record.status_label();
        Ok(ScaleGroupState {
            id: record.id,
            name: record.name,
            status,
            regional_group: record.regional_group.map(|g| g.name),
            minimum_member_count: record.minimum_member_count,
            maximum_member_count: record.maximum_member_count,
            cooldown: record.cooldown,
            termination_policy: record.termination_policy.map(|p| p.key_name),
            virtual_guest_member_template: record.virtual_guest_member_template,
            network_vlan_ids: record
                .network_vlans
                .iter()
                .map(|v| v.network_vlan_id)
                .collect(),
            load_balancers: record
                .load_balancers
                .iter()
                .zip(type_names)
                .map(|(lb, health_check_type)| GroupLoadBalancerState {
                    virtual_server_id: lb.virtual_server_id,
                    port: lb.port,
                    health_check_type,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl ResourceLifecycle for ScaleGroups {
    type Spec = ScaleGroupSpec;
    type State = ScaleGroupState;

    fn type_name(&self) -> &'static str {
        "scale-group"
    }

    async fn create(&self, spec: &ScaleGroupSpec) -> SlResult<ScaleGroupState> {
        spec.validate()?;
        let template = self.template(spec).await?;

        let target = RequestTarget::list(SERVICE, "createObject");
        let created: ScaleGroupRecord = self
            .client
            .post(&target, &Parameters::single(&template))
            .await?;
        tracing::info!("Created scale group {} ({})", created.id, spec.name);

        self.wait_for_active(created.id).await?;

        self.read(created.id)
            .await?
            .ok_or_else(|| SlError::not_found("scale group", created.id))
    }

    async fn read(&self, id: i64) -> SlResult<Option<ScaleGroupState>> {
        match self.fetch(id).await? {
            Some(record) => self.to_state(record).await.map(Some),
            None => Ok(None),
        }
    }

    async fn update(&self, id: i64, spec: &ScaleGroupSpec) -> SlResult<ScaleGroupState> {
        spec.validate()?;
        let template = self.template(spec).await?;

        let target = RequestTarget::by_id(SERVICE, id, "editObject");
        self.client
            .post_bool(&target, &Parameters::single(&template))
            .await?;

        self.read(id)
            .await?
            .ok_or_else(|| SlError::not_found("scale group", id))
    }

    async fn delete(&self, id: i64) -> SlResult<()> {
        let target = RequestTarget::by_id(SERVICE, id, "forceDeleteObject");
        match self.client.delete_bool(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
