//! Declarative lifecycle interface shared by every resource kind

use crate::error::SlResult;
use crate::poll::PollSettings;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of a remote resource as assigned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub type_name: String,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_ids: Vec<i64>,
}

impl ResourceRef {
    pub fn new(type_name: &str, id: i64) -> Self {
        Self {
            type_name: type_name.to_string(),
            id,
            sub_ids: Vec::new(),
        }
    }
}

/// Poll budgets for the asynchronous workflows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    /// Order placed -> resource visible
    pub order: PollSettings,
    /// Billing item cancellation accepted
    pub cancellation: PollSettings,
    /// Scale group reaches ACTIVE
    pub activation: PollSettings,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            order: PollSettings::new(Duration::from_secs(10 * 60), Duration::from_secs(3))
                .with_delay(Duration::from_secs(5)),
            cancellation: PollSettings::new(Duration::from_secs(10 * 60), Duration::from_secs(30)),
            activation: PollSettings::new(Duration::from_secs(30 * 60), Duration::from_secs(10))
                .with_backoff(1.5, Duration::from_secs(60)),
        }
    }
}

/// Create / read / update / delete for one resource kind
///
/// `Spec` is the desired state handed over by the orchestrator, `State` the
/// observed state returned to it. `read` returns `None` when the resource is
/// gone so the orchestrator can plan a re-create.
#[async_trait]
pub trait ResourceLifecycle: Send + Sync {
    type Spec: DeserializeOwned + Send + Sync;
    type State: Serialize + Send;

    /// Resource type key, as registered in `resources.json`
    fn type_name(&self) -> &'static str;

    async fn create(&self, spec: &Self::Spec) -> SlResult<Self::State>;

    async fn read(&self, id: i64) -> SlResult<Option<Self::State>>;

    async fn update(&self, id: i64, spec: &Self::Spec) -> SlResult<Self::State>;

    async fn delete(&self, id: i64) -> SlResult<()>;

    fn reference(&self, id: i64) -> ResourceRef {
        ResourceRef::new(self.type_name(), id)
    }
}
