//! Account users
//!
//! Users are never hard-deleted: removal moves them to the cancel-pending
//! status. API keys are managed through separate add/remove actions.

use super::lifecycle::ResourceLifecycle;
use super::lookup::{LookupKind, Resolver};
use crate::error::{SlError, SlResult};
use crate::softlayer::client::SlClient;
use crate::softlayer::request::{ObjectMask, Parameters, RequestTarget};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const SERVICE: &str = "SoftLayer_User_Customer";

const USER_MASK: &[&str] = &[
    "id",
    "username",
    "email",
    "firstName",
    "lastName",
    "companyName",
    "address1",
    "address2",
    "city",
    "state",
    "country",
    "timezone[shortName]",
    "userStatusId",
    "apiAuthenticationKeys[id,authenticationKey]",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    #[default]
    Active,
    Disabled,
    Inactive,
    CancelPending,
}

impl UserStatus {
    pub fn id(self) -> i64 {
        match self {
            UserStatus::Active => 1001,
            UserStatus::Disabled => 1002,
            UserStatus::Inactive => 1003,
            UserStatus::CancelPending => 1021,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1001 => Some(UserStatus::Active),
            1002 => Some(UserStatus::Disabled),
            1003 => Some(UserStatus::Inactive),
            1021 => Some(UserStatus::CancelPending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSpec {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: String,
    pub address1: String,
    #[serde(default)]
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    /// Timezone short name, e.g. `EST`
    pub timezone: String,
    #[serde(default)]
    pub user_status: UserStatus,
    /// Only used on create
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub has_api_key: bool,
}

impl UserSpec {
    fn validate(&self, creating: bool) -> SlResult<()> {
        let mut problems = Vec::new();
        for (field, value) in [
            ("username", &self.username),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("company_name", &self.company_name),
            ("address1", &self.address1),
            ("city", &self.city),
            ("country", &self.country),
            ("timezone", &self.timezone),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("missing {}", field));
            }
        }
        if !self.email.contains('@') {
            problems.push(format!("email {:?} is not an address", self.email));
        }
        if creating && self.password.as_deref().map_or(true, str::is_empty) {
            problems.push("missing password".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SlError::validation("user", problems))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserTemplate<'a> {
    username: &'a str,
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    company_name: &'a str,
    address1: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    address2: Option<&'a str>,
    city: &'a str,
    state: &'a str,
    country: &'a str,
    timezone_id: i64,
    user_status_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusEdit {
    user_status_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: i64,
    #[serde(default)]
    pub authentication_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Timezone {
    short_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    id: i64,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    address1: Option<String>,
    #[serde(default)]
    address2: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    timezone: Option<Timezone>,
    #[serde(default)]
    user_status_id: Option<i64>,
    #[serde(default)]
    api_authentication_keys: Vec<ApiKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserState {
    pub id: i64,
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
    pub user_status: Option<UserStatus>,
    pub has_api_key: bool,
    pub api_key: Option<String>,
}

impl From<UserRecord> for UserState {
    fn from(record: UserRecord) -> Self {
        let api_key = record
            .api_authentication_keys
            .first()
            .and_then(|k| k.authentication_key.clone());
        Self {
            id: record.id,
            username: record.username,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            company_name: record.company_name,
            address1: record.address1,
            address2: record.address2,
            city: record.city,
            state: record.state,
            country: record.country,
            timezone: record.timezone.map(|t| t.short_name),
            user_status: record.user_status_id.and_then(UserStatus::from_id),
            has_api_key: !record.api_authentication_keys.is_empty(),
            api_key,
        }
    }
}

pub struct Users {
    client: SlClient,
}

impl Users {
    pub fn new(client: SlClient) -> Self {
        Self { client }
    }

    async fn template<'a>(&self, spec: &'a UserSpec) -> SlResult<UserTemplate<'a>> {
        let timezone_id = Resolver::for_kind(&self.client, LookupKind::Timezone)?
            .id_for(&spec.timezone)
            .await?;

        Ok(UserTemplate {
            username: &spec.username,
            email: &spec.email,
            first_name: &spec.first_name,
            last_name: &spec.last_name,
            company_name: &spec.company_name,
            address1: &spec.address1,
            address2: spec.address2.as_deref(),
            city: &spec.city,
            state: &spec.state,
            country: &spec.country,
            timezone_id,
            user_status_id: spec.user_status.id(),
        })
    }

    async fn fetch(&self, id: i64) -> SlResult<Option<UserRecord>> {
        let target = RequestTarget::by_id(SERVICE, id, "getObject")
            .with_mask(ObjectMask::new(USER_MASK.iter().copied()));
        match self.client.get(&target).await {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn api_keys(&self, id: i64) -> SlResult<Vec<ApiKey>> {
        let target = RequestTarget::by_id(SERVICE, id, "getApiAuthenticationKeys")
            .with_mask(ObjectMask::new(["id", "authenticationKey"]));
        self.client.list(&target).await
    }

    /// Generate an API key for the user and return it
    pub async fn add_api_key(&self, id: i64) -> SlResult<String> {
        let target = RequestTarget::by_id(SERVICE, id, "addApiAuthenticationKey");
        self.client.post_bool(&target, &Parameters::none()).await?;
        tracing::info!("Added API key for user {}", id);

        self.api_keys(id)
            .await?
            .into_iter()
            .find_map(|k| k.authentication_key)
            .ok_or_else(|| SlError::not_found("API key for user", id))
    }

    /// Remove every API key of the user, returning how many were removed
    pub async fn remove_api_key(&self, id: i64) -> SlResult<usize> {
        let keys = self.api_keys(id).await?;
        for key in &keys {
            let target = RequestTarget::by_id(SERVICE, id, "removeApiAuthenticationKey");
            self.client.post_bool(&target, &Parameters::single(&key.id)).await?;
        }
        tracing::info!("Removed {} API keys for user {}", keys.len(), id);
        Ok(keys.len())
    }
}

#[async_trait]
impl ResourceLifecycle for Users {
    type Spec = UserSpec;
    type State = UserState;

    fn type_name(&self) -> &'static str {
        "user"
    }

    async fn create(&self, spec: &UserSpec) -> SlResult<UserState> {
        spec.validate(true)?;
        let template = self.template(spec).await?;
        let password = spec.password.as_deref().unwrap_or_default();

        let target = RequestTarget::list(SERVICE, "createObject");
        let created: UserRecord = self
            .client
            .post(&target, &Parameters::pair(&template, &password))
            .await?;
        tracing::info!("Created user {} ({})", created.id, spec.username);

        if spec.has_api_key {
            self.add_api_key(created.id).await?;
        }

        self.read(created.id)
            .await?
            .ok_or_else(|| SlError::not_found("user", created.id))
    }

    async fn read(&self, id: i64) -> SlResult<Option<UserState>> {
        Ok(self.fetch(id).await?.map(UserState::from))
    }

    async fn update(&self, id: i64, spec: &UserSpec) -> SlResult<UserState> {
        spec.validate(false)?;
        let current = self
            .fetch(id)
            .await?
            .ok_or_else(|| SlError::not_found("user", id))?;
        let template = self.template(spec).await?;

        let target = RequestTarget::by_id(SERVICE, id, "editObject");
        self.client
            .post_bool(&target, &Parameters::single(&template))
            .await?;

        let has_key = !current.api_authentication_keys.is_empty();
        if spec.has_api_key && !has_key {
            self.add_api_key(id).await?;
        } else if !spec.has_api_key && has_key {
            self.remove_api_key(id).await?;
        }

        self.read(id)
            .await?
            .ok_or_else(|| SlError::not_found("user", id))
    }

    async fn delete(&self, id: i64) -> SlResult<()> {
        let target = RequestTarget::by_id(SERVICE, id, "editObject");
        let edit = StatusEdit {
            user_status_id: UserStatus::CancelPending.id(),
        };
        match self.client.post_bool(&target, &Parameters::single(&edit)).await {
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
    use serde_json::Value;

    fn spec() -> UserSpec {
        UserSpec {
            username: "jdoe".to_string(),
            email: "jdoe@example.com".to_string(),
            first_name: "Jo".to_string(),
            last_name: "Doe".to_string(),
            company_name: "Example".to_string(),
            address1: "1 Main St".to_string(),
            address2: None,
            city: "Dallas".to_string(),
            state: "TX".to_string(),
            country: "US".to_string(),
            timezone: "CST".to_string(),
            user_status: UserStatus::Active,
            password: Some("S3cret!pass".to_string()),
            has_api_key: true,
        }
    }

    #[tokio::test]
    async fn test_create_with_password_and_api_key() {
        let stub = StubTransport::new()
            .respond(200, r#"[{"id": 113, "shortName": "CST"}]"#)
            .respond(200, r#"{"id": 4242}"#)
            .respond(200, "true")
            .respond(200, r#"[{"id": 9, "authenticationKey": "abc123"}]"#)
            .respond(
                200,
                r#"{"id": 4242, "username": "jdoe", "userStatusId": 1001,
                    "timezone": {"shortName": "CST"},
                    "apiAuthenticationKeys": [{"id": 9, "authenticationKey": "abc123"}]}"#,
            );
        let client = SlClient::with_transport(stub.clone());

        let state = Users::new(client).create(&spec()).await.unwrap();

        assert_eq!(state.id, 4242);
        assert_eq!(state.user_status, Some(UserStatus::Active));
        assert_eq!(state.timezone.as_deref(), Some("CST"));
        assert!(state.has_api_key);

        let requests = stub.requests();
        let body: Value = serde_json::from_str(requests[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["parameters"][0]["timezoneId"], 113);
        assert_eq!(body["parameters"][0]["userStatusId"], 1001);
        assert_eq!(body["parameters"][1], "S3cret!pass");
        assert_eq!(
            requests[2].path,
            "SoftLayer_User_Customer/4242/addApiAuthenticationKey.json"
        );
        assert_eq!(requests[2].body.as_deref(), Some(r#"{"parameters":[]}"#));
    }

    #[tokio::test]
    async fn test_create_requires_password() {
        let stub = StubTransport::new();
        let client = SlClient::with_transport(stub.clone());
        let no_password = UserSpec {
            password: None,
            ..spec()
        };

        let err = Users::new(client).create(&no_password).await.unwrap_err();

        assert_eq!(err.to_string(), "invalid user: missing password");
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_sets_cancel_pending_status() {
        let stub = StubTransport::new().respond(200, "true");
        let client = SlClient::with_transport(stub.clone());

        Users::new(client).delete(4242).await.unwrap();

        let requests = stub.requests();
        assert_eq!(requests[0].path, "SoftLayer_User_Customer/4242/editObject.json");
        assert_eq!(
            requests[0].body.as_deref(),
            Some(r#"{"parameters":[{"userStatusId":1021}]}"#)
        );
    }

    #[tokio::test]
    async fn test_remove_api_key_removes_each_key() {
        let stub = StubTransport::new()
            .respond(200, r#"[{"id": 9}, {"id": 10}]"#)
            .respond(200, "true")
            .respond(200, "true");
        let client = SlClient::with_transport(stub.clone());

        let removed = Users::new(client).remove_api_key(4242).await.unwrap();

        assert_eq!(removed, 2);
        let requests = stub.requests();
        assert_eq!(requests[2].body.as_deref(), Some(r#"{"parameters":[10]}"#));
    }
}
