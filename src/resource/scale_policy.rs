//! Autoscale policies
//!
//! A policy belongs to a scale group and carries scale actions plus the
//! triggers that fire them. Triggers live in three separate lists on the wire,
//! one per trigger type; here they are a single tagged list.

use super::lifecycle::ResourceLifecycle;
use crate::error::{SlError, SlResult};
use crate::softlayer::client::SlClient;
use crate::softlayer::request::{ObjectMask, Parameters, RequestTarget};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SERVICE: &str = "SoftLayer_Scale_Policy";
const ACTION_SERVICE: &str = "SoftLayer_Scale_Policy_Action";
const TRIGGER_SERVICE: &str = "SoftLayer_Scale_Policy_Trigger";

const SCALE_ACTION_TYPE_ID: i64 = 1;
const RESOURCE_USE_TRIGGER_TYPE_ID: i64 = 1;
const REPEATING_TRIGGER_TYPE_ID: i64 = 2;
const ONE_TIME_TRIGGER_TYPE_ID: i64 = 3;

const SCALE_POLICY_MASK: &[&str] = &[
    "id",
    "name",
    "scaleGroupId",
    "cooldown",
    "scaleActions[id,amount,scaleType]",
    "oneTimeTriggers[id,date]",
    "repeatingTriggers[id,schedule]",
    "resourceUseTriggers[id,watches[id,metric,operator,period,value,algorithm]]",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaleType {
    /// Add or remove this many members
    Relative,
    /// Set the member count
    Absolute,
    /// Grow or shrink by a percentage of the current count
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleAction {
    #[serde(rename = "type")]
    pub scale_type: ScaleType,
    pub amount: i32,
}

fn default_algorithm() -> String {
    "EWMA".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// e.g. `host.cpu.percent`
    pub metric: String,
    /// `>` or `<`
    pub operator: String,
    /// Seconds
    pub period: u32,
    pub value: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Cron expression
    Repeating { schedule: String },
    OneTime { date: DateTime<Utc> },
    ResourceUse { watches: Vec<Watch> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalePolicySpec {
    pub name: String,
    pub scale_group_id: i64,
    #[serde(default)]
    pub cooldown: Option<u32>,
    #[serde(default)]
    pub scale_actions: Vec<ScaleAction>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

impl ScalePolicySpec {
    /// All problems at once, before anything is sent
    pub fn validate(&self) -> SlResult<()> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("missing name".to_string());
        }
        if self.scale_actions.is_empty() {
            problems.push("missing scale_actions".to_string());
        }
        for action in &self.scale_actions {
            match action.scale_type {
                ScaleType::Absolute if action.amount < 0 => {
                    problems.push(format!("absolute amount {} is negative", action.amount))
                },
                ScaleType::Relative | ScaleType::Percent if action.amount == 0 => {
                    problems.push(format!("{:?} amount must not be zero", action.scale_type))
                },
                _ => {},
            }
        }
        for trigger in &self.triggers {
            match trigger {
                Trigger::Repeating { schedule } if schedule.trim().is_empty() => {
                    problems.push("repeating trigger without schedule".to_string())
                },
                Trigger::ResourceUse { watches } if watches.is_empty() => {
                    problems.push("resource use trigger without watches".to_string())
                },
                _ => {},
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SlError::validation("scale policy", problems))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScaleActionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scale_policy_id: Option<i64>,
    scale_type: ScaleType,
    amount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OneTimeTriggerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scale_policy_id: Option<i64>,
    date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepeatingTriggerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scale_policy_id: Option<i64>,
    schedule: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceUseTriggerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scale_policy_id: Option<i64>,
    #[serde(default)]
    watches: Vec<Watch>,
}

/// Triggers split by wire list
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerLists {
    #[serde(default)]
    one_time_triggers: Vec<OneTimeTriggerRecord>,
    #[serde(default)]
    repeating_triggers: Vec<RepeatingTriggerRecord>,
    #[serde(default)]
    resource_use_triggers: Vec<ResourceUseTriggerRecord>,
}

impl TriggerLists {
    fn split(triggers: &[Trigger], scale_policy_id: Option<i64>) -> Self {
        let mut lists = TriggerLists::default();
        for trigger in triggers {
            match trigger {
                Trigger::OneTime { date } => lists.one_time_triggers.push(OneTimeTriggerRecord {
                    id: None,
                    type_id: Some(ONE_TIME_TRIGGER_TYPE_ID),
                    scale_policy_id,
                    date: *date,
                }),
                Trigger::Repeating { schedule } => {
                    lists.repeating_triggers.push(RepeatingTriggerRecord {
                        id: None,
                        type_id: Some(REPEATING_TRIGGER_TYPE_ID),
                        scale_policy_id,
                        schedule: schedule.clone(),
                    })
                },
                Trigger::ResourceUse { watches } => {
                    lists.resource_use_triggers.push(ResourceUseTriggerRecord {
                        id: None,
                        type_id: Some(RESOURCE_USE_TRIGGER_TYPE_ID),
                        scale_policy_id,
                        watches: watches
                            .iter()
                            .cloned()
                            .map(|w| Watch { id: None, ..w })
                            .collect(),
                    })
                },
            }
        }
        lists
    }

    /// One-time, then repeating, then resource use; watch ids dropped
    fn merge(&self) -> Vec<Trigger> {
        let one_time = self
            .one_time_triggers
            .iter()
            .map(|t| Trigger::OneTime { date: t.date });
        let repeating = self.repeating_triggers.iter().map(|t| Trigger::Repeating {
            schedule: t.schedule.clone(),
        });
        let resource_use = self.resource_use_triggers.iter().map(|t| Trigger::ResourceUse {
            watches: t.watches.iter().cloned().map(|w| Watch { id: None, ..w }).collect(),
        });
        one_time.chain(repeating).chain(resource_use).collect()
    }

    fn ids(&self) -> Vec<i64> {
        self.one_time_triggers
            .iter()
            .filter_map(|t| t.id)
            .chain(self.repeating_triggers.iter().filter_map(|t| t.id))
            .chain(self.resource_use_triggers.iter().filter_map(|t| t.id))
            .collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyTemplate<'a> {
    name: &'a str,
    scale_group_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    cooldown: Option<u32>,
    scale_actions: Vec<ScaleActionRecord>,
    #[serde(flatten)]
    triggers: TriggerLists,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyEdit<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cooldown: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScalePolicyRecord {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    scale_group_id: Option<i64>,
    #[serde(default)]
    cooldown: Option<u32>,
    #[serde(default)]
    scale_actions: Vec<ScaleActionRecord>,
    #[serde(flatten)]
    triggers: TriggerLists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalePolicyState {
    pub id: i64,
    pub name: Option<String>,
    pub scale_group_id: Option<i64>,
    pub cooldown: Option<u32>,
    pub scale_actions: Vec<ScaleAction>,
    pub triggers: Vec<Trigger>,
}

impl From<ScalePolicyRecord> for ScalePolicyState {
    fn from(record: ScalePolicyRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            scale_group_id: record.scale_group_id,
            cooldown: record.cooldown,
            scale_actions: record
                .scale_actions
                .iter()
                .map(|a| ScaleAction {
                    scale_type: a.scale_type,
                    amount: a.amount,
                })
                .collect(),
            triggers: record.triggers.merge(),
        }
    }
}

pub struct ScalePolicies {
    client: SlClient,
}

impl ScalePolicies {
    pub fn new(client: SlClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: i64) -> SlResult<Option<ScalePolicyRecord>> {
        let target = RequestTarget::by_id(SERVICE, id, "getObject")
            .with_mask(ObjectMask::new(SCALE_POLICY_MASK.iter().copied()));
        match self.client.get(&target).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Edits changed actions in place, creates extra wanted ones and deletes
    /// the leftovers, pairing by position
    async fn sync_actions(
        &self,
        policy_id: i64,
        current: &[ScaleActionRecord],
        wanted: &[ScaleAction],
    ) -> SlResult<()> {
        let existing: Vec<(i64, &ScaleActionRecord)> = current
            .iter()
            .filter_map(|a| a.id.map(|id| (id, a)))
            .collect();

        for (index, action) in wanted.iter().enumerate() {
            match existing.get(index) {
                Some((_, record))
                    if record.scale_type == action.scale_type
                        && record.amount == action.amount => {},
                Some((action_id, _)) => {
                    let record = ScaleActionRecord {
                        id: None,
                        type_id: None,
                        scale_policy_id: None,
                        scale_type: action.scale_type,
                        amount: action.amount,
                    };
                    self.client
                        .post_bool(
                            &RequestTarget::by_id(ACTION_SERVICE, *action_id, "editObject"),
                            &Parameters::single(&record),
                        )
                        .await?;
                },
                None => {
                    let record = ScaleActionRecord {
                        id: None,
                        type_id: Some(SCALE_ACTION_TYPE_ID),
                        scale_policy_id: Some(policy_id),
                        scale_type: action.scale_type,
                        amount: action.amount,
                    };
                    let target = RequestTarget::list(ACTION_SERVICE, "createObject");
                    let created: serde_json::Value =
                        self.client.post(&target, &Parameters::single(&record)).await?;
                    tracing::debug!(
                        "Added scale action {} to policy {}",
                        created["id"],
                        policy_id
                    );
                },
            }
        }

        for (action_id, _) in existing.iter().skip(wanted.len()) {
            self.client
                .delete_bool(&RequestTarget::by_id(ACTION_SERVICE, *action_id, "deleteObject"))
                .await?;
            tracing::debug!("Removed scale action {} from policy {}", action_id, policy_id);
        }
        Ok(())
    }

    async fn replace_triggers(
        &self,
        policy_id: i64,
        old: &TriggerLists,
        new: &[Trigger],
    ) -> SlResult<()> {
        for id in old.ids() {
            self.client
                .delete_bool(&RequestTarget::by_id(TRIGGER_SERVICE, id, "deleteObject"))
                .await?;
        }

        let lists = TriggerLists::split(new, Some(policy_id));
        for trigger in &lists.one_time_triggers {
            self.create_trigger("SoftLayer_Scale_Policy_Trigger_OneTime", trigger)
                .await?;
        }
        for trigger in &lists.repeating_triggers {
            self.create_trigger("SoftLayer_Scale_Policy_Trigger_Repeating", trigger)
                .await?;
        }
        for trigger in &lists.resource_use_triggers {
            self.create_trigger("SoftLayer_Scale_Policy_Trigger_ResourceUse", trigger)
                .await?;
        }
        Ok(())
    }

    async fn create_trigger<T: Serialize + Sync>(
        &self,
        service: &str,
        trigger: &T,
    ) -> SlResult<()> {
        let target = RequestTarget::list(service, "createObject");
        let _: serde_json::Value = self
            .client
            .post(&target, &Parameters::single(trigger))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceLifecycle for ScalePolicies {
    type Spec = ScalePolicySpec;
    type State = ScalePolicyState;

    fn type_name(&self) -> &'static str {
        "scale-policy"
    }

    async fn create(&self, spec: &ScalePolicySpec) -> SlResult<ScalePolicyState> {
        spec.validate()?;

        let template = PolicyTemplate {
            name: &spec.name,
            scale_group_id: spec.scale_group_id,
            cooldown: spec.cooldown,
            scale_actions: spec
                .scale_actions
                .iter()
                .map(|a| ScaleActionRecord {
                    id: None,
                    type_id: Some(SCALE_ACTION_TYPE_ID),
                    scale_policy_id: None,
                    scale_type: a.scale_type,
                    amount: a.amount,
                })
                .collect(),
            triggers: TriggerLists::split(&spec.triggers, None),
        };

        let target = RequestTarget::list(SERVICE, "createObject");
        let created: ScalePolicyRecord = self
            .client
            .post(&target, &Parameters::single(&template))
            .await?;
        tracing::info!(
            "Created scale policy {} on scale group {}",
            created.id,
            spec.scale_group_id
        );

        self.read(created.id)
            .await?
            .ok_or_else(|| SlError::not_found("scale policy", created.id))
    }

    async fn read(&self, id: i64) -> SlResult<Option<ScalePolicyState>> {
        Ok(self.fetch(id).await?.map(ScalePolicyState::from))
    }

    async fn update(&self, id: i64, spec: &ScalePolicySpec) -> SlResult<ScalePolicyState> {
        spec.validate()?;
        let current = self
            .fetch(id)
            .await?
            .ok_or_else(|| SlError::not_found("scale policy", id))?;

        let edit = PolicyEdit {
            name: &spec.name,
            cooldown: spec.cooldown,
        };
        self.client
            .post_bool(
                &RequestTarget::by_id(SERVICE, id, "editObject"),
                &Parameters::single(&edit),
            )
            .await?;

        self.sync_actions(id, &current.scale_actions, &spec.scale_actions)
            .await?;

        let wanted = TriggerLists::split(&spec.triggers, None).merge();
        if current.triggers.merge() != wanted {
            self.replace_triggers(id, &current.triggers, &spec.triggers)
                .await?;
        }

        self.read(id)
            .await?
            .ok_or_else(|| SlError::not_found("scale policy", id))
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
