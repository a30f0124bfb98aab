//! Load balancer service groups
//!
//! A service group hangs off a virtual server, which in turn belongs to a load
//! balancer. The API has no create call for virtual servers: they are added by
//! editing the parent load balancer, then found again by port.

use super::lifecycle::ResourceLifecycle;
use super::load_balancer::SERVICE as VIP_SERVICE;
use super::lookup::{LookupKind, Resolver};
use crate::error::{SlError, SlResult};
use crate::softlayer::client::SlClient;
use crate::softlayer::request::{ObjectMask, Parameters, RequestTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "SoftLayer_Network_Application_Delivery_Controller_LoadBalancer_VirtualServer";

const VIRTUAL_SERVER_MASK: &[&str] = &[
    "id",
    "allocation",
    "port",
    "virtualIpAddressId",
    "serviceGroups[id,routingMethodId,routingTypeId]",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGroupSpec {
    pub load_balancer_id: i64,
    pub port: u16,
    /// Share of the load balancer's connections, in percent
    pub allocation: u8,
    pub routing_method: String,
    pub routing_type: String,
}

impl ServiceGroupSpec {
    fn validate(&self) -> SlResult<()> {
        let mut problems = Vec::new();
        if self.port == 0 {
            problems.push("port must be between 1 and 65535".to_string());
        }
        if self.allocation == 0 || self.allocation > 100 {
            problems.push(format!("allocation {} is not a percentage", self.allocation));
        }
        if self.routing_method.trim().is_empty() {
            problems.push("missing routing_method".to_string());
        }
        if self.routing_type.trim().is_empty() {
            problems.push("missing routing_type".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SlError::validation("load balancer service group", problems))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub routing_method_id: i64,
    pub routing_type_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub allocation: u8,
    pub port: u16,
    #[serde(default, skip_serializing)]
    pub virtual_ip_address_id: Option<i64>,
    #[serde(default)]
    pub service_groups: Vec<ServiceGroup>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadBalancerEdit<'a> {
    virtual_servers: &'a [VirtualServer],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceGroupState {
    /// Virtual server id
    pub id: i64,
    pub service_group_id: Option<i64>,
    pub load_balancer_id: Option<i64>,
    pub port: u16,
    pub allocation: u8,
    pub routing_method: Option<String>,
    pub routing_type: Option<String>,
}

pub struct ServiceGroups {
    client: SlClient,
}

impl ServiceGroups {
    pub fn new(client: SlClient) -> Self {
        Self { client }
    }

    fn mask() -> ObjectMask {
        ObjectMask::new(VIRTUAL_SERVER_MASK.iter().copied())
    }

    /// Routing method and type ids, resolved concurrently
    async fn routing_ids(&self, spec: &ServiceGroupSpec) -> SlResult<(i64, i64)> {
        let methods = Resolver::for_kind(&self.client, LookupKind::RoutingMethod)?;
        let types = Resolver::for_kind(&self.client, LookupKind::RoutingType)?;
        futures::try_join!(
            methods.id_for(&spec.routing_method),
            types.id_for(&spec.routing_type)
        )
    }

    async fn routing_names(&self, group: &ServiceGroup) -> SlResult<(String, String)> {
        let methods = Resolver::for_kind(&self.client, LookupKind::RoutingMethod)?;
        let types = Resolver::for_kind(&self.client, LookupKind::RoutingType)?;
        futures::try_join!(
            methods.name_for(group.routing_method_id),
            types.name_for(group.routing_type_id)
        )
    }

    async fn edit_load_balancer(
        &self,
        load_balancer_id: i64,
        server: VirtualServer,
    ) -> SlResult<()> {
        let target = RequestTarget::by_id(VIP_SERVICE, load_balancer_id, "editObject");
        let servers = [server];
        let edit = LoadBalancerEdit {
            virtual_servers: &servers,
        };
        self.client.post_bool(&target, &Parameters::single(&edit)).await
    }

    async fn fetch(&self, id: i64) -> SlResult<Option<VirtualServer>> {
        let target = RequestTarget::by_id(SERVICE, id, "getObject").with_mask(Self::mask());
        match self.client.get(&target).await {
            Ok(server) => Ok(Some(server)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ResourceLifecycle for ServiceGroups {
    type Spec = ServiceGroupSpec;
    type State = ServiceGroupState;

    fn type_name(&self) -> &'static str {
        "lb-service-group"
    }

    async fn create(&self, spec: &ServiceGroupSpec) -> SlResult<ServiceGroupState> {
        spec.validate()?;
        let (routing_method_id, routing_type_id) = self.routing_ids(spec).await?;

        self.edit_load_balancer(
            spec.load_balancer_id,
            VirtualServer {
                id: None,
                allocation: spec.allocation,
                port: spec.port,
                virtual_ip_address_id: None,
                service_groups: vec![ServiceGroup {
                    id: None,
                    routing_method_id,
                    routing_type_id,
                }],
            },
        )
        .await?;

        let target = RequestTarget::by_id(VIP_SERVICE, spec.load_balancer_id, "getVirtualServers")
            .with_mask(Self::mask());
        let servers: Vec<VirtualServer> = self.client.list(&target).await?;
        let server = servers
            .into_iter()
            .find(|s| s.port == spec.port)
            .ok_or_else(|| {
                SlError::not_found(
                    format!("virtual server on load balancer {}", spec.load_balancer_id),
                    format!("port {}", spec.port),
                )
            })?;
        let id = server
            .id
            .ok_or_else(|| SlError::not_found("virtual server id for port", spec.port))?;

        tracing::info!(
            "Added virtual server {} on port {} to load balancer {}",
            id,
            spec.port,
            spec.load_balancer_id
        );

        Ok(ServiceGroupState {
            id,
            service_group_id: server.service_groups.first().and_then(|g| g.id),
            load_balancer_id: Some(spec.load_balancer_id),
            port: server.port,
            allocation: server.allocation,
            routing_method: Some(spec.routing_method.clone()),
            routing_type: Some(spec.routing_type.clone()),
        })
    }

    async fn read(&self, id: i64) -> SlResult<Option<ServiceGroupState>> {
        let Some(server) = self.fetch(id).await? else {
            return Ok(None);
        };

        let group = server.service_groups.first();
        let (routing_method, routing_type) = match group {
            Some(group) => {
                let (method, kind) = self.routing_names(group).await?;
                (Some(method), Some(kind))
            },
            None => (None, None),
        };

        Ok(Some(ServiceGroupState {
            id,
            service_group_id: group.and_then(|g| g.id),
            load_balancer_id: server.virtual_ip_address_id,
            port: server.port,
            allocation: server.allocation,
            routing_method,
            routing_type,
        }))
    }

    async fn update(&self, id: i64, spec: &ServiceGroupSpec) -> SlResult<ServiceGroupState> {
        spec.validate()?;
        let current = self
            .fetch(id)
            .await?
            .ok_or_else(|| SlError::not_found("virtual server", id))?;
        if current
            .virtual_ip_address_id
            .is_some_and(|lb| lb != spec.load_balancer_id)
        {
            return Err(SlError::validation(
                "load balancer service group",
                vec!["load_balancer_id cannot be changed in place".to_string()],
            ));
        }
        let (routing_method_id, routing_type_id) = self.routing_ids(spec).await?;

        self.edit_load_balancer(
            spec.load_balancer_id,
            VirtualServer {
                id: Some(id),
                allocation: spec.allocation,
                port: spec.port,
                virtual_ip_address_id: None,
                service_groups: vec![ServiceGroup {
                    id: current.service_groups.first().and_then(|g| g.id),
                    routing_method_id,
                    routing_type_id,
                }],
            },
        )
        .await?;

        self.read(id)
            .await?
            .ok_or_else(|| SlError::not_found("virtual server", id))
    }

    async fn delete(&self, id: i64) -> SlResult<()> {
        let target = RequestTarget::by_id(SERVICE, id, "deleteObject");
        match self.client.delete_bool(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubTransport;
    use reqwest::Method;
    use serde_json::Value;

    fn spec() -> ServiceGroupSpec {
        ServiceGroupSpec {
            load_balancer_id: 77,
            port: 80,
            allocation: 100,
            routing_method: "ROUND_ROBIN".to_string(),
            routing_type: "HTTP".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_edits_load_balancer_and_finds_port() {
        let stub = StubTransport::new()
            .respond(200, r#"[{"id": 10, "keyname": "ROUND_ROBIN"}]"#)
            .respond(200, r#"[{"id": 3, "keyname": "HTTP"}]"#)
            .respond(200, "true")
            .respond(
                200,
                r#"[{"id": 500, "port": 443, "allocation": 50, "serviceGroups": []},
                    {"id": 501, "port": 80, "allocation": 100,
                     "serviceGroups": [{"id": 900, "routingMethodId": 10, "routingTypeId": 3}]}]"#,
            );
        let client = SlClient::with_transport(stub.clone());

        let state = ServiceGroups::new(client).create(&spec()).await.unwrap();

        assert_eq!(state.id, 501);
        assert_eq!(state.service_group_id, Some(900));

        let requests = stub.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[2].method, Method::POST);
        assert!(requests[2].path.starts_with(&format!("{}/77/editObject.json", VIP_SERVICE)));
        let body: Value = serde_json::from_str(requests[2].body.as_deref().unwrap()).unwrap();
        let server = &body["parameters"][0]["virtualServers"][0];
        assert_eq!(server["port"], 80);
        assert!(server.get("id").is_none());
        assert_eq!(server["serviceGroups"][0]["routingMethodId"], 10);
        assert_eq!(server["serviceGroups"][0]["routingTypeId"], 3);
    }

    #[tokio::test]
    async fn test_create_unknown_routing_method_skips_edit() {
        let stub = StubTransport::new()
            .respond(200, "[]")
            .respond(200, r#"[{"id": 3, "keyname": "HTTP"}]"#);
        let client = SlClient::with_transport(stub.clone());

        let err = ServiceGroups::new(client).create(&spec()).await.unwrap_err();

        assert_eq!(err.to_string(), "routing method ROUND_ROBIN not found");
        assert!(stub
            .requests()
            .iter()
            .all(|r| !r.path.contains("editObject")));
    }

    #[tokio::test]
    async fn test_invalid_allocation_makes_no_calls() {
        let stub = StubTransport::new();
        let client = SlClient::with_transport(stub.clone());
        let bad = ServiceGroupSpec {
            allocation: 120,
            ..spec()
        };

        let err = ServiceGroups::new(client).create(&bad).await.unwrap_err();

        assert!(matches!(err, SlError::Validation { .. }));
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_read_resolves_routing_names_by_id() {
        let stub = StubTransport::new()
            .respond(
                200,
                r#"{"id": 501, "port": 80, "allocation": 100, "virtualIpAddressId": 77,
                    "serviceGroups": [{"id": 900, "routingMethodId": 10, "routingTypeId": 3}]}"#,
            )
            .respond(200, r#"{"id": 10, "keyname": "ROUND_ROBIN"}"#)
            .respond(200, r#"{"id": 3, "keyname": "HTTP"}"#);
        let client = SlClient::with_transport(stub.clone());

        let state = ServiceGroups::new(client).read(501).await.unwrap().unwrap();

        assert_eq!(state.load_balancer_id, Some(77));
        assert_eq!(state.routing_method.as_deref(), Some("ROUND_ROBIN"));
        assert_eq!(state.routing_type.as_deref(), Some("HTTP"));
        assert!(stub.requests()[1].path.contains("/10/getObject.json"));
    }

    #[tokio::test]
    async fn test_delete_uses_delete_method() {
        let stub = StubTransport::new().respond(200, "true");
        let client = SlClient::with_transport(stub.clone());

        ServiceGroups::new(client).delete(501).await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests[0].method, Method::DELETE);
        assert_eq!(requests[0].path, format!("{}/501/deleteObject.json", SERVICE));
    }

    #[tokio::test]
    async fn test_update_rejects_moving_to_another_load_balancer() {
        let stub = StubTransport::new().respond(
            200,
            r#"{"id": 501, "port": 80, "allocation": 100, "virtualIpAddressId": 77,
                "serviceGroups": [{"id": 900, "routingMethodId": 10, "routingTypeId": 3}]}"#,
        );
        let client = SlClient::with_transport(stub.clone());
        let moved = ServiceGroupSpec {
            load_balancer_id: 78,
            ..spec()
        };

        let err = ServiceGroups::new(client).update(501, &moved).await.unwrap_err();

        assert!(matches!(err, SlError::Validation { .. }));
        assert!(err.to_string().contains("load_balancer_id cannot be changed in place"));
        assert_eq!(stub.call_count(), 1);
    }
}
