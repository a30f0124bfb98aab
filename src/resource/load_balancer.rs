//! Local load balancers
//!
//! Creation is an order: pick the catalog price for the requested capacity,
//! resolve the datacenter, place the order, then wait for the load balancer
//! to show up on the account. Deletion cancels the billing item.

use super::lifecycle::{ResourceLifecycle, Timeouts};
use super::lookup::{LookupKind, Resolver};
use super::order::{self, BillingCancellation, BillingItem, ItemPrice};
use crate::error::{SlError, SlResult};
use crate::softlayer::client::SlClient;
use crate::softlayer::request::{ObjectFilter, ObjectMask, Parameters, RequestTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub(crate) const SERVICE: &str =
    "SoftLayer_Network_Application_Delivery_Controller_LoadBalancer_VirtualIpAddress";

/// Product package holding the load balancer items
pub const LOAD_BALANCER_PACKAGE_ID: i64 = 194;
const ORDER_CONTAINER: &str = "SoftLayer_Container_Product_Order_Network_LoadBalancer";
const HA_ITEM_KEY: &str = "DEDICATED_LOAD_BALANCER_WITH_HIGH_AVAILABILITY_AND_SSL";
const ORDER_FILTER_PATH: &str = "adcLoadBalancers.billingItem.orderItem.order.id";

const LOAD_BALANCER_MASK: &[&str] = &[
    "id",
    "connectionLimit",
    "securityCertificateId",
    "highAvailabilityFlag",
    "sslEnabledFlag",
    "ipAddress[ipAddress,subnetId]",
    "loadBalancerHardware[datacenter[name]]",
];

/// Desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub connections: u32,
    pub datacenter: String,
    #[serde(default)]
    pub ha_enabled: bool,
    #[serde(default)]
    pub security_certificate_id: Option<i64>,
}

impl LoadBalancerSpec {
    /// Catalog key of the price matching this capacity / availability tier
    pub fn item_key(&self) -> String {
        if self.ha_enabled {
            HA_ITEM_KEY.to_string()
        } else {
            format!("LOAD_BALANCER_{}_VIP_CONNECTIONS", self.connections)
        }
    }

    fn validate(&self) -> SlResult<()> {
        let mut problems = Vec::new();
        if self.connections == 0 {
            problems.push("missing connections".to_string());
        }
        if self.datacenter.trim().is_empty() {
            problems.push("missing datacenter".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SlError::validation("load balancer", problems))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAddress {
    pub ip_address: String,
    #[serde(default)]
    pub subnet_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoadBalancerHardware {
    #[serde(default)]
    pub datacenter: Option<Named>,
}

/// Load balancer as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualIpAddress {
    pub id: i64,
    #[serde(default)]
    pub connection_limit: Option<u32>,
    #[serde(default)]
    pub security_certificate_id: Option<i64>,
    #[serde(default)]
    pub high_availability_flag: Option<bool>,
    #[serde(default)]
    pub ssl_enabled_flag: Option<bool>,
    #[serde(default)]
    pub ip_address: Option<IpAddress>,
    #[serde(default)]
    pub load_balancer_hardware: Vec<LoadBalancerHardware>,
}

/// Observed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerState {
    pub id: i64,
    pub connections: Option<u32>,
    pub datacenter: Option<String>,
    pub ha_enabled: bool,
    pub ssl_enabled: bool,
    pub ip_address: Option<String>,
    pub subnet_id: Option<i64>,
    pub security_certificate_id: Option<i64>,
}

impl From<VirtualIpAddress> for LoadBalancerState {
    fn from(vip: VirtualIpAddress) -> Self {
        let datacenter = vip
            .load_balancer_hardware
            .into_iter()
            .find_map(|hw| hw.datacenter)
            .map(|dc| dc.name);
        let (ip_address, subnet_id) = match vip.ip_address {
            Some(ip) => (Some(ip.ip_address), ip.subnet_id),
            None => (None, None),
        };

        Self {
            id: vip.id,
            connections: vip.connection_limit,
            datacenter,
            ha_enabled: vip.high_availability_flag.unwrap_or(false),
            ssl_enabled: vip.ssl_enabled_flag.unwrap_or(false),
            ip_address,
            subnet_id,
            security_certificate_id: vip.security_certificate_id,
        }
    }
}

/// Order container for a local load balancer
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadBalancerOrder {
    complex_type: &'static str,
    package_id: i64,
    location: String,
    prices: Vec<ItemPrice>,
    quantity: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CertificateEdit {
    security_certificate_id: Option<i64>,
}

pub struct LoadBalancers {
    client: SlClient,
    timeouts: Timeouts,
}

impl LoadBalancers {
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

    fn mask() -> ObjectMask {
        ObjectMask::new(LOAD_BALANCER_MASK.iter().copied())
    }

    async fn find_price(&self, spec: &LoadBalancerSpec) -> SlResult<ItemPrice> {
        let items = order::get_package_items(&self.client, LOAD_BALANCER_PACKAGE_ID).await?;
        let key = spec.item_key();
        order::find_item_price(&items, &key).cloned().ok_or_else(|| {
            SlError::validation(
                "load balancer",
                vec![format!("no catalog price with key {}", key)],
            )
        })
    }

    async fn set_certificate(&self, id: i64, certificate_id: Option<i64>) -> SlResult<()> {
        let target = RequestTarget::by_id(SERVICE, id, "editObject");
        let edit = CertificateEdit {
            security_certificate_id: certificate_id,
        };
        self.client.post_bool(&target, &Parameters::single(&edit)).await
    }

    async fn fetch(&self, id: i64) -> SlResult<Option<VirtualIpAddress>> {
        let target = RequestTarget::by_id(SERVICE, id, "getObject").with_mask(Self::mask());
        match self.client.get(&target).await {
            Ok(vip) => Ok(Some(vip)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ResourceLifecycle for LoadBalancers {
    type Spec = LoadBalancerSpec;
    type State = LoadBalancerState;

    fn type_name(&self) -> &'static str {
        "lb"
    }

    async fn create(&self, spec: &LoadBalancerSpec) -> SlResult<LoadBalancerState> {
        spec.validate()?;

        let price = self.find_price(spec).await?;
        let datacenter_id = Resolver::for_kind(&self.client, LookupKind::Datacenter)?
            .id_for(&spec.datacenter)
            .await?;

        let container = LoadBalancerOrder {
            complex_type: ORDER_CONTAINER,
            package_id: LOAD_BALANCER_PACKAGE_ID,
            location: datacenter_id.to_string(),
            prices: vec![price],
            quantity: 1,
        };
        let receipt = order::place_order(&self.client, &container).await?;
        tracing::info!(
            "Placed load balancer order {} in {}",
            receipt.order_id,
            spec.datacenter
        );

        let listing = RequestTarget::list("SoftLayer_Account", "getAdcLoadBalancers")
            .with_mask(Self::mask())
            .with_filter(ObjectFilter::equals(ORDER_FILTER_PATH, receipt.order_id));
        let vip: VirtualIpAddress = order::wait_for_order(
            &self.client,
            &listing,
            &format!("load balancer for order {}", receipt.order_id),
            self.timeouts.order,
        )
        .await?;

        if spec.security_certificate_id.is_some() {
            self.set_certificate(vip.id, spec.security_certificate_id).await?;
            return self
                .read(vip.id)
                .await?
                .ok_or_else(|| SlError::not_found("load balancer", vip.id));
        }

        Ok(vip.into())
    }

    async fn read(&self, id: i64) -> SlResult<Option<LoadBalancerState>> {
        Ok(self.fetch(id).await?.map(LoadBalancerState::from))
    }

    async fn update(&self, id: i64, spec: &LoadBalancerSpec) -> SlResult<LoadBalancerState> {
        let current = self
            .read(id)
            .await?
            .ok_or_else(|| SlError::not_found("load balancer", id))?;

        let mut problems = Vec::new();
        if current.connections.is_some_and(|c| c != spec.connections) {
            problems.push("connections cannot be changed in place".to_string());
        }
        if current.ha_enabled != spec.ha_enabled {
            problems.push("ha_enabled cannot be changed in place".to_string());
        }
        if current
            .datacenter
            .as_deref()
            .is_some_and(|dc| dc != spec.datacenter)
        {
            problems.push("datacenter cannot be changed in place".to_string());
        }
        if !problems.is_empty() {
            return Err(SlError::validation("load balancer", problems));
        }

        if current.security_certificate_id != spec.security_certificate_id {
            self.set_certificate(id, spec.security_certificate_id).await?;
        }

        self.read(id)
            .await?
            .ok_or_else(|| SlError::not_found("load balancer", id))
    }

    async fn delete(&self, id: i64) -> SlResult<()> {
        let target = RequestTarget::by_id(SERVICE, id, "getBillingItem")
            .with_mask(ObjectMask::new(["id"]));
        let billing_item: Option<BillingItem> = match self.client.get(&target).await {
            Ok(item) => item,
            Err(e) if e.is_not_found() => {
                tracing::info!("Load balancer {} already gone", id);
                return Ok(());
            },
            Err(e) => return Err(e),
        };

        let billing_item = billing_item
            .ok_or_else(|| SlError::not_found("billing item for load balancer", id))?;

        BillingCancellation::new(self.timeouts.cancellation)
            .cancel(&self.client, billing_item.id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::PollSettings;
    use crate::testing::StubTransport;
    use reqwest::Method;
    use serde_json::Value;
    use std::time::Duration;

    const CATALOG: &str = r#"[
        {"id": 1, "keyName": "LOAD_BALANCER_250_VIP_CONNECTIONS", "prices": [{"id": 2210}]},
        {"id": 2, "keyName": "DEDICATED_LOAD_BALANCER_WITH_HIGH_AVAILABILITY_AND_SSL", "prices": [{"id": 8472}]}
    ]"#;

    fn spec() -> LoadBalancerSpec {
        LoadBalancerSpec {
            connections: 250,
            datacenter: "dal09".to_string(),
            ha_enabled: false,
            security_certificate_id: None,
        }
    }

    fn quick_timeouts() -> Timeouts {
        Timeouts {
            order: PollSettings::new(Duration::from_secs(60), Duration::from_secs(3)),
            ..Timeouts::default()
        }
    }

    #[test]
    fn test_item_key() {
        assert_eq!(spec().item_key(), "LOAD_BALANCER_250_VIP_CONNECTIONS");
        let ha = LoadBalancerSpec {
            ha_enabled: true,
            ..spec()
        };
        assert_eq!(ha.item_key(), HA_ITEM_KEY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_orders_then_discovers() {
        let stub = StubTransport::new()
            .respond(200, CATALOG)
            .respond(200, r#"[{"id": 138124, "name": "dal09"}]"#)
            .respond(200, r#"{"orderId": 4411}"#)
            .respond(200, "[]")
            .respond(
                200,
                r#"[{"id": 77, "connectionLimit": 250, "ipAddress": {"ipAddress": "10.0.0.5", "subnetId": 9},
                    "loadBalancerHardware": [{"datacenter": {"name": "dal09"}}]}]"#,
            );
        let client = SlClient::with_transport(stub.clone());

        let state = LoadBalancers::new(client)
            .with_timeouts(quick_timeouts())
            .create(&spec())
            .await
            .unwrap();

        assert_eq!(state.id, 77);
        assert_eq!(state.datacenter.as_deref(), Some("dal09"));
        assert_eq!(state.ip_address.as_deref(), Some("10.0.0.5"));

        let requests = stub.requests();
        assert_eq!(requests.len(), 5);
        assert!(requests[0].path.starts_with("SoftLayer_Product_Package/194/getItems.json"));
        assert_eq!(requests[2].method, Method::POST);
        let order: Value = serde_json::from_str(requests[2].body.as_deref().unwrap()).unwrap();
        assert_eq!(order["parameters"][0]["complexType"], ORDER_CONTAINER);
        assert_eq!(order["parameters"][0]["location"], "138124");
        assert_eq!(order["parameters"][0]["prices"][0]["id"], 2210);
        assert_eq!(order["parameters"][1], false);
        assert!(requests[3].path.starts_with("SoftLayer_Account/getAdcLoadBalancers.json?"));
    }

    #[tokio::test]
    async fn test_create_without_catalog_price_places_no_order() {
        let stub = StubTransport::new().respond(200, CATALOG);
        let client = SlClient::with_transport(stub.clone());
        let odd = LoadBalancerSpec {
            connections: 333,
            ..spec()
        };

        let err = LoadBalancers::new(client).create(&odd).await.unwrap_err();

        assert!(matches!(err, SlError::Validation { .. }));
        assert!(err.to_string().contains("LOAD_BALANCER_333_VIP_CONNECTIONS"));
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_surfaces_ambiguous_discovery() {
        let stub = StubTransport::new()
            .respond(200, CATALOG)
            .respond(200, r#"[{"id": 138124, "name": "dal09"}]"#)
            .respond(200, r#"{"orderId": 4411}"#)
            .respond(200, r#"[{"id": 77}, {"id": 78}]"#);
        let client = SlClient::with_transport(stub);

        let err = LoadBalancers::new(client)
            .with_timeouts(quick_timeouts())
            .create(&spec())
            .await
            .unwrap_err();

        assert!(matches!(err, SlError::Ambiguous { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let stub = StubTransport::new().respond(
            404,
            r#"{"error":"Unable to find object","code":"SoftLayer_Exception_ObjectNotFound"}"#,
        );
        let client = SlClient::with_transport(stub);

        assert_eq!(LoadBalancers::new(client).read(5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_rejects_capacity_change() {
        let stub = StubTransport::new().respond(200, r#"{"id": 77, "connectionLimit": 250}"#);
        let client = SlClient::with_transport(stub.clone());
        let bigger = LoadBalancerSpec {
            connections: 500,
            ..spec()
        };

        let err = LoadBalancers::new(client).update(77, &bigger).await.unwrap_err();

        assert!(err.to_string().contains("connections cannot be changed in place"));
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_cancels_billing_item() {
        let stub = StubTransport::new()
            .respond(200, r#"{"id": 9001}"#)
            .respond(200, "true");
        let client = SlClient::with_transport(stub.clone());

        LoadBalancers::new(client).delete(77).await.unwrap();

        let requests = stub.requests();
        assert!(requests[0].path.starts_with(&format!("{}/77/getBillingItem.json", SERVICE)));
        assert_eq!(requests[1].path, "SoftLayer_Billing_Item/9001/cancelService.json");
    }
}
