//! Dispatch
//!
//! Maps a resource type name and an action name onto the lifecycle
//! implementation for that type. Parameters arrive as JSON from the caller.

use super::get_resource;
use super::lifecycle::{ResourceLifecycle, Timeouts};
use super::lb_service_group::ServiceGroups;
use super::load_balancer::LoadBalancers;
use super::provisioning_hook::ProvisioningHooks;
use super::scale_group::ScaleGroups;
use super::scale_policy::ScalePolicies;
use super::user::Users;
use crate::error::{SlError, SlResult};
use crate::softlayer::client::SlClient;
use serde_json::{json, Value};

/// Execute an action on a resource type
pub async fn execute_action(
    resource_type: &str,
    action: &str,
    client: &SlClient,
    timeouts: Timeouts,
    id: Option<i64>,
    params: &Value,
) -> SlResult<Value> {
    tracing::info!(
        "execute_action: type={}, action={}, id={:?}",
        resource_type,
        action,
        id
    );

    let Some(def) = get_resource(resource_type) else {
        return Err(SlError::Unsupported(format!(
            "Unknown resource type: {}",
            resource_type
        )));
    };
    if !def.supports(action) {
        return Err(SlError::Unsupported(format!(
            "{} does not support action {}",
            def.display_name, action
        )));
    }

    let client = client.clone();
    match resource_type {
        "lb" => {
            let lbs = LoadBalancers::new(client).with_timeouts(timeouts);
            run(&lbs, action, id, params).await
        },
        "lb-service-group" => run(&ServiceGroups::new(client), action, id, params).await,
        "scale-group" => {
            let groups = ScaleGroups::new(client).with_timeouts(timeouts);
            run(&groups, action, id, params).await
        },
        "scale-policy" => run(&ScalePolicies::new(client), action, id, params).await,
        "user" => execute_user_action(Users::new(client), action, id, params).await,
        "provisioning-hook" => run(&ProvisioningHooks::new(client), action, id, params).await,
        _ => Err(SlError::Unsupported(format!(
            "Unknown resource type: {}",
            resource_type
        ))),
    }
}

/// Lifecycle actions shared by every resource type
async fn run<R: ResourceLifecycle>(
    resource: &R,
    action: &str,
    id: Option<i64>,
    params: &Value,
) -> SlResult<Value> {
    match action {
        "create" => {
            let spec = parse_spec::<R>(resource, params)?;
            let state = resource.create(&spec).await?;
            to_value(resource, &state)
        },
        "read" => {
            let id = require_id(resource.type_name(), action, id)?;
            match resource.read(id).await? {
                Some(state) => to_value(resource, &state),
                None => Ok(Value::Null),
            }
        },
        "update" => {
            let id = require_id(resource.type_name(), action, id)?;
            let spec = parse_spec::<R>(resource, params)?;
            let state = resource.update(id, &spec).await?;
            to_value(resource, &state)
        },
        "delete" => {
            let id = require_id(resource.type_name(), action, id)?;
            resource.delete(id).await?;
            serde_json::to_value(resource.reference(id)).map_err(|source| {
                SlError::InvalidParameters {
                    resource: resource.type_name().to_string(),
                    source,
                }
            })
        },
        _ => Err(SlError::Unsupported(format!(
            "Unknown action {} for {}",
            action,
            resource.type_name()
        ))),
    }
}

async fn execute_user_action(
    users: Users,
    action: &str,
    id: Option<i64>,
    params: &Value,
) -> SlResult<Value> {
    match action {
        "add-api-key" => {
            let id = require_id("user", action, id)?;
            let key = users.add_api_key(id).await?;
            Ok(json!({ "id": id, "api_key": key }))
        },
        "remove-api-key" => {
            let id = require_id("user", action, id)?;
            let removed = users.remove_api_key(id).await?;
            Ok(json!({ "id": id, "removed": removed }))
        },
        _ => run(&users, action, id, params).await,
    }
}

fn parse_spec<R: ResourceLifecycle>(resource: &R, params: &Value) -> SlResult<R::Spec> {
    serde_json::from_value(params.clone()).map_err(|source| SlError::InvalidParameters {
        resource: resource.type_name().to_string(),
        source,
    })
}

fn to_value<R: ResourceLifecycle>(resource: &R, state: &R::State) -> SlResult<Value> {
    serde_json::to_value(state).map_err(|source| SlError::InvalidParameters {
        resource: resource.type_name().to_string(),
        source,
    })
}

fn require_id(resource_type: &str, action: &str, id: Option<i64>) -> SlResult<i64> {
    id.ok_or_else(|| {
        SlError::validation(
            resource_type,
            vec![format!("{} requires a resource id", action)],
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubTransport;

    #[tokio::test]
    async fn test_unknown_type_is_unsupported() {
        let client = SlClient::with_transport(StubTransport::new());
        let err = execute_action(
            "dns-zone",
            "read",
            &client,
            Timeouts::default(),
            Some(1),
            &Value::Null,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SlError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_unregistered_action_is_unsupported() {
        let stub = StubTransport::new();
        let client = SlClient::with_transport(stub.clone());
        let err = execute_action(
            "lb",
            "add-api-key",
            &client,
            Timeouts::default(),
            Some(1),
            &Value::Null,
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Local Load Balancer does not support action add-api-key");
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_read_requires_id() {
        let client = SlClient::with_transport(StubTransport::new());
        let err = execute_action(
            "provisioning-hook",
            "read",
            &client,
            Timeouts::default(),
            None,
            &Value::Null,
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid provisioning-hook: read requires a resource id"
        );
    }

    #[tokio::test]
    async fn test_read_missing_returns_null() {
        let stub = StubTransport::new().respond(
            404,
            r#"{"error":"Unable to find object","code":"SoftLayer_Exception_ObjectNotFound"}"#,
        );
        let client = SlClient::with_transport(stub);
        let value = execute_action(
            "provisioning-hook",
            "read",
            &client,
            Timeouts::default(),
            Some(3),
            &Value::Null,
        )
        .await
        .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_create_with_malformed_params() {
        let stub = StubTransport::new();
        let client = SlClient::with_transport(stub.clone());
        let err = execute_action(
            "provisioning-hook",
            "create",
            &client,
            Timeouts::default(),
            None,
            &json!({"name": "hook"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SlError::InvalidParameters { .. }));
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_returns_reference() {
        let stub = StubTransport::new().respond(200, "true");
        let client = SlClient::with_transport(stub);
        let value = execute_action(
            "scale-policy",
            "delete",
            &client,
            Timeouts::default(),
            Some(12),
            &Value::Null,
        )
        .await
        .unwrap();
        assert_eq!(value, json!({"type_name": "scale-policy", "id": 12}));
    }
}
