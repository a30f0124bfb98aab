//! Provisioning hooks: a URI called once a server finishes provisioning

use super::lifecycle::ResourceLifecycle;
use crate::error::{SlError, SlResult};
use crate::softlayer::client::SlClient;
use crate::softlayer::request::{ObjectMask, Parameters, RequestTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "SoftLayer_Provisioning_Hook";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningHookSpec {
    pub name: String,
    pub uri: String,
}

impl ProvisioningHookSpec {
    fn validate(&self) -> SlResult<()> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("missing name".to_string());
        }
        if url::Url::parse(&self.uri).is_err() {
            problems.push(format!("uri {:?} is not a URL", self.uri));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SlError::validation("provisioning hook", problems))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningHookState {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

pub struct ProvisioningHooks {
    client: SlClient,
}

impl ProvisioningHooks {
    pub fn new(client: SlClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceLifecycle for ProvisioningHooks {
    type Spec = ProvisioningHookSpec;
    type State = ProvisioningHookState;

    fn type_name(&self) -> &'static str {
        "provisioning-hook"
    }

    async fn create(&self, spec: &ProvisioningHookSpec) -> SlResult<ProvisioningHookState> {
        spec.validate()?;
        let target = RequestTarget::list(SERVICE, "createObject");
        let created: ProvisioningHookState = self
            .client
            .post(&target, &Parameters::single(spec))
            .await?;
        tracing::info!("Created provisioning hook {}", created.id);
        Ok(created)
    }

    async fn read(&self, id: i64) -> SlResult<Option<ProvisioningHookState>> {
        let target = RequestTarget::by_id(SERVICE, id, "getObject")
            .with_mask(ObjectMask::new(["id", "name", "uri"]));
        match self.client.get(&target).await {
            Ok(hook) => Ok(Some(hook)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update(
        &self,
        id: i64,
        spec: &ProvisioningHookSpec,
    ) -> SlResult<ProvisioningHookState> {
        spec.validate()?;
        let target = RequestTarget::by_id(SERVICE, id, "editObject");
        self.client.post_bool(&target, &Parameters::single(spec)).await?;

        Ok(ProvisioningHookState {
            id,
            name: Some(spec.name.clone()),
            uri: Some(spec.uri.clone()),
        })
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

    fn spec() -> ProvisioningHookSpec {
        ProvisioningHookSpec {
            name: "notify".to_string(),
            uri: "https://hooks.example.com/provisioned".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_posts_single_entity() {
        let stub = StubTransport::new().respond(
            200,
            r#"{"id": 31, "name": "notify", "uri": "https://hooks.example.com/provisioned"}"#,
        );
        let client = SlClient::with_transport(stub.clone());

        let state = ProvisioningHooks::new(client).create(&spec()).await.unwrap();

        assert_eq!(state.id, 31);
        assert_eq!(
            stub.requests()[0].body.as_deref(),
            Some(r#"{"parameters":[{"name":"notify","uri":"https://hooks.example.com/provisioned"}]}"#)
        );
    }

    #[tokio::test]
    async fn test_update_requires_true() {
        let stub = StubTransport::new().respond(200, "false");
        let client = SlClient::with_transport(stub);

        let err = ProvisioningHooks::new(client)
            .update(31, &spec())
            .await
            .unwrap_err();

        assert!(matches!(err, SlError::Application { .. }));
    }

    #[tokio::test]
    async fn test_delete_of_missing_hook_succeeds() {
        let stub = StubTransport::new().respond(
            404,
            r#"{"error":"Unable to find object with id of '31'.","code":"SoftLayer_Exception_ObjectNotFound"}"#,
        );
        let client = SlClient::with_transport(stub);

        ProvisioningHooks::new(client).delete(31).await.unwrap();
    }

    #[test]
    fn test_invalid_uri_rejected() {
        let bad = ProvisioningHookSpec {
            uri: "not a url".to_string(),
            ..spec()
        };
        assert!(matches!(bad.validate(), Err(SlError::Validation { .. })));
    }
}
