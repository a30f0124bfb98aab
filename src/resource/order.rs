//! Provisioning orders and billing cancellation
//!
//! Placing an order returns an order id, not a resource id. The resource shows
//! up later and has to be found by listing filtered on the order id. Tearing a
//! resource down goes through its billing item, and the cancel call is refused
//! while another transaction runs against the resource.

use crate::error::{SlError, SlResult};
use crate::poll::{PollSettings, PollState, Poller};
use crate::softlayer::client::SlClient;
use crate::softlayer::request::{ObjectMask, Parameters, RequestTarget};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

const ORDER_SERVICE: &str = "SoftLayer_Product_Order";
const BILLING_ITEM_SERVICE: &str = "SoftLayer_Billing_Item";

/// Error text the API returns while another transaction holds the resource
pub const ACTIVE_TRANSACTION_MESSAGE: &str = "There is currently an active transaction";

/// Exception classes that will not clear up by waiting
const PERMANENT_CANCELLATION_EXCEPTIONS: &[&str] = &[
    "SoftLayer_Exception_ObjectNotFound",
    "SoftLayer_Exception_NotFound",
    "SoftLayer_Exception_InvalidValue",
    "SoftLayer_Exception_Public_InvalidValue",
];

/// Receipt returned by `placeOrder`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: i64,
    #[serde(default)]
    pub order_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPrice {
    pub id: i64,
}

/// One entry of a product package catalog
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductItem {
    pub id: i64,
    pub key_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prices: Vec<ItemPrice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BillingItem {
    pub id: i64,
}

/// Fetch the item catalog of a product package
pub async fn get_package_items(client: &SlClient, package_id: i64) -> SlResult<Vec<ProductItem>> {
    let target = RequestTarget::by_id("SoftLayer_Product_Package", package_id, "getItems")
        .with_mask(ObjectMask::new(["id", "keyName", "description", "prices[id]"]));
    client.list(&target).await
}

/// Price of the catalog item whose key matches exactly
pub fn find_item_price<'a>(items: &'a [ProductItem], key_name: &str) -> Option<&'a ItemPrice> {
    items
        .iter()
        .find(|item| item.key_name == key_name)
        .and_then(|item| item.prices.first())
}

/// Submit an order container; the receipt only carries the order id
pub async fn place_order<O: Serialize>(client: &SlClient, order: &O) -> SlResult<OrderReceipt> {
    let target = RequestTarget::list(ORDER_SERVICE, "placeOrder");
    // second positional parameter: saveAsQuote
    client.post(&target, &Parameters::pair(order, &false)).await
}

/// Poll `target` until exactly one row appears
///
/// No rows means still provisioning. More than one row means the order does
/// not identify a single resource, which is fatal rather than guessed at.
pub async fn wait_for_order<T>(
    client: &SlClient,
    target: &RequestTarget,
    what: &str,
    settings: PollSettings,
) -> SlResult<T>
where
    T: DeserializeOwned + Debug,
{
    let found: Vec<T> = Poller::new(what, settings)
        .run(move || async move {
            let rows: Vec<T> = client.list(target).await?;
            match rows.len() {
                0 => Ok(PollState::pending(rows)),
                1 => Ok(PollState::complete(rows)),
                count => Err(SlError::Ambiguous {
                    what: what.to_string(),
                    count,
                }),
            }
        })
        .await?;

    found.into_iter().next().ok_or_else(|| SlError::Ambiguous {
        what: what.to_string(),
        count: 0,
    })
}

/// Whether a failed `cancelService` call should be retried
///
/// The "active transaction" refusal is the known transient case. Other HTTP
/// 500 responses are also retried until the deadline unless their exception
/// class says the cancellation can never succeed.
pub fn is_transient_cancellation_error(err: &SlError) -> bool {
    if err
        .remote_message()
        .is_some_and(|m| m.contains(ACTIVE_TRANSACTION_MESSAGE))
    {
        return true;
    }

    match err {
        SlError::Http {
            code: 500,
            exception,
            ..
        } => !exception
            .as_deref()
            .is_some_and(|e| PERMANENT_CANCELLATION_EXCEPTIONS.contains(&e)),
        _ => false,
    }
}

/// Cancels a billing item, waiting out transient refusals
#[derive(Clone, Copy)]
pub struct BillingCancellation {
    pub settings: PollSettings,
    pub is_pending: fn(&SlError) -> bool,
}

impl BillingCancellation {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings,
            is_pending: is_transient_cancellation_error,
        }
    }

    pub fn with_predicate(mut self, is_pending: fn(&SlError) -> bool) -> Self {
        self.is_pending = is_pending;
        self
    }

    pub async fn cancel(&self, client: &SlClient, billing_item_id: i64) -> SlResult<()> {
        let target = RequestTarget::by_id(BILLING_ITEM_SERVICE, billing_item_id, "cancelService");
        let target = &target;
        let is_pending = self.is_pending;

        Poller::new(
            format!("cancellation of billing item {}", billing_item_id),
            self.settings,
        )
        .run(move || async move {
            match client.get_bool(target).await {
                Ok(()) => Ok(PollState::complete(None)),
                Err(e) if is_pending(&e) => {
                    tracing::warn!("Billing item {} not cancelled yet: {}", billing_item_id, e);
                    Ok(PollState::pending(Some(e.to_string())))
                },
                Err(e) => Err(e),
            }
        })
        .await?;

        tracing::info!("Cancelled billing item {}", billing_item_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::softlayer::request::ObjectFilter;
    use crate::testing::StubTransport;
    use serde_json::Value;
    use std::time::Duration;

    fn fast() -> PollSettings {
        PollSettings::new(Duration::from_secs(600), Duration::from_secs(3))
    }

    fn listing() -> RequestTarget {
        RequestTarget::list("SoftLayer_Account", "getAdcLoadBalancers").with_filter(
            ObjectFilter::equals("adcLoadBalancers.billingItem.orderItem.order.id", 77),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_discovery_after_two_probes() {
        let stub = StubTransport::new()
            .respond(200, "[]")
            .respond(200, r#"[{"id": 501}]"#);
        let client = SlClient::with_transport(stub.clone());

        let found: Value = wait_for_order(&client, &listing(), "load balancer for order 77", fast())
            .await
            .unwrap();

        assert_eq!(found["id"], 501);
        assert_eq!(stub.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_discovery_ambiguous_fails_immediately() {
        let stub = StubTransport::new().respond(200, r#"[{"id": 501}, {"id": 502}]"#);
        let client = SlClient::with_transport(stub.clone());

        let err = wait_for_order::<Value>(&client, &listing(), "load balancer for order 77", fast())
            .await
            .unwrap_err();

        assert!(matches!(err, SlError::Ambiguous { count: 2, .. }));
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_waits_out_active_transaction() {
        let stub = StubTransport::new()
            .respond(
                500,
                r#"{"error":"There is currently an active transaction for this billing item.","code":"SoftLayer_Exception_Public"}"#,
            )
            .respond(200, "true");
        let client = SlClient::with_transport(stub.clone());

        BillingCancellation::new(fast())
            .cancel(&client, 88)
            .await
            .unwrap();

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, "SoftLayer_Billing_Item/88/cancelService.json");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_error_envelope_with_200_fails() {
        let stub = StubTransport::new()
            .respond(200, r#"{"error":"Billing item is already cancelled"}"#);
        let client = SlClient::with_transport(stub.clone());

        let err = BillingCancellation::new(fast())
            .cancel(&client, 88)
            .await
            .unwrap_err();

        assert!(matches!(err, SlError::Application { .. }));
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_with_custom_predicate() {
        let stub = StubTransport::new().respond(
            500,
            r#"{"error":"There is currently an active transaction","code":"SoftLayer_Exception_Public"}"#,
        );
        let client = SlClient::with_transport(stub.clone());

        let err = BillingCancellation::new(fast())
            .with_predicate(|_| false)
            .cancel(&client, 5)
            .await
            .unwrap_err();

        assert!(matches!(err, SlError::Http { code: 500, .. }));
        assert_eq!(stub.call_count(), 1);
    }

    #[test]
    fn test_transient_cancellation_predicate() {
        let http = |code: u16, message: &str, exception: Option<&str>| SlError::Http {
            service: BILLING_ITEM_SERVICE.to_string(),
            action: "cancelService".to_string(),
            code,
            message: message.to_string(),
            exception: exception.map(|e| e.to_string()),
        };

        assert!(is_transient_cancellation_error(&http(
            500,
            "There is currently an active transaction for this server",
            Some("SoftLayer_Exception_Public")
        )));
        assert!(is_transient_cancellation_error(&http(500, "Internal Error", None)));
        assert!(!is_transient_cancellation_error(&http(
            500,
            "Unable to find object",
            Some("SoftLayer_Exception_ObjectNotFound")
        )));
        assert!(!is_transient_cancellation_error(&http(403, "Forbidden", None)));
        assert!(!is_transient_cancellation_error(&SlError::Transport {
            service: BILLING_ITEM_SERVICE.to_string(),
            action: "cancelService".to_string(),
            message: "timeout".to_string(),
        }));
    }

    #[test]
    fn test_find_item_price_exact_key() {
        let items = vec![
            ProductItem {
                id: 1,
                key_name: "LOAD_BALANCER_250_VIP_CONNECTIONS".to_string(),
                description: None,
                prices: vec![ItemPrice { id: 1001 }],
            },
            ProductItem {
                id: 2,
                key_name: "LOAD_BALANCER_2500_VIP_CONNECTIONS".to_string(),
                description: None,
                prices: vec![ItemPrice { id: 1002 }],
            },
        ];
        assert_eq!(
            find_item_price(&items, "LOAD_BALANCER_250_VIP_CONNECTIONS"),
            Some(&ItemPrice { id: 1001 })
        );
        assert_eq!(find_item_price(&items, "LOAD_BALANCER_25_VIP_CONNECTIONS"), None);
    }
}
