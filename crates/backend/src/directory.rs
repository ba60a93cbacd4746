//! Users, roles and plans.
//!
//! Admin-only user creation resolves the caller's bearer token to a user,
//! requires the `admin` role in the `user_roles` table, creates the account
//! through the admin auth API and then bootstraps a plan row for it.

use std::sync::Arc;

use async_trait::async_trait;
use labprompt_core::{AuthError, Error};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::client::{BackendClient, Filter};
use crate::BackendError;

pub const ADMIN_ROLE: &str = "admin";
const ROLES_TABLE: &str = "user_roles";
const PLANS_TABLE: &str = "user_plans";

/// A user known to the auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Input for admin user creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    /// Plan to bootstrap; the configured default when absent.
    #[serde(default)]
    pub plan: Option<String>,
}

/// Identity and entitlement lookups.
#[async_trait]
pub trait Directory: Send + Sync {
    /// The user an access token belongs to, or `None` when the token is not
    /// valid.
    async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>, BackendError>;

    async fn has_role(&self, user_id: &str, role: &str) -> Result<bool, BackendError>;

    async fn create_user(&self, user: &NewUser) -> Result<AuthUser, BackendError>;

    async fn bootstrap_plan(&self, user_id: &str, plan: &str) -> Result<(), BackendError>;
}

/// [`Directory`] over the hosted backend's REST API.
pub struct HttpDirectory {
    client: BackendClient,
}

impl HttpDirectory {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>, BackendError> {
        match self.client.auth_user(token).await {
            Ok(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| BackendError::Decode(format!("auth user: {e}"))),
            Err(BackendError::Http { status: 401 | 403, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn has_role(&self, user_id: &str, role: &str) -> Result<bool, BackendError> {
        let rows = self
            .client
            .select(
                ROLES_TABLE,
                "role",
                &[Filter::eq("user_id", user_id), Filter::eq("role", role)],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn create_user(&self, user: &NewUser) -> Result<AuthUser, BackendError> {
        let mut metadata = serde_json::Map::new();
        if let Some(name) = &user.full_name {
            metadata.insert("full_name".into(), Value::String(name.clone()));
        }
        let body = json!({
            "email": user.email,
            "password": user.password,
            "email_confirm": true,
            "user_metadata": metadata,
        });
        let created = self.client.admin_create_user(&body).await?;
        // Some deployments wrap the user in `{ "user": ... }`.
        let user_value = created.get("user").cloned().unwrap_or(created);
        serde_json::from_value(user_value)
            .map_err(|e| BackendError::Decode(format!("created user: {e}")))
    }

    async fn bootstrap_plan(&self, user_id: &str, plan: &str) -> Result<(), BackendError> {
        self.client
            .upsert(
                PLANS_TABLE,
                &json!({ "user_id": user_id, "plan": plan, "status": "active" }),
                "user_id",
            )
            .await?;
        Ok(())
    }
}

/// The admin-only user creation flow.
pub struct AdminService {
    directory: Arc<dyn Directory>,
    default_plan: String,
}

impl AdminService {
    pub fn new(directory: Arc<dyn Directory>, default_plan: impl Into<String>) -> Self {
        Self {
            directory,
            default_plan: default_plan.into(),
        }
    }

    /// The user behind `token`, required to hold `role`.
    pub async fn require_role(&self, token: &str, role: &str) -> Result<AuthUser, Error> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Unauthenticated("missing bearer token".into()).into());
        }

        let caller = self
            .directory
            .user_for_token(token)
            .await?
            .ok_or_else(|| AuthError::Unauthenticated("invalid or expired token".into()))?;

        if !self.directory.has_role(&caller.id, role).await? {
            warn!(user_id = %caller.id, role, "Caller lacks required role");
            return Err(AuthError::Forbidden(format!("role '{role}' required")).into());
        }
        Ok(caller)
    }

    /// Create a user on behalf of an admin caller.
    ///
    /// Plan bootstrapping is best-effort: the account exists once the auth
    /// API has created it, so a failed plan insert is logged, not returned.
    pub async fn create_user(&self, caller_token: &str, new_user: NewUser) -> Result<AuthUser, Error> {
        if new_user.email.trim().is_empty() {
            return Err(labprompt_core::ValidationError::MissingField("email").into());
        }
        if new_user.password.is_empty() {
            return Err(labprompt_core::ValidationError::MissingField("password").into());
        }

        let admin = self.require_role(caller_token, ADMIN_ROLE).await?;
        let created = self.directory.create_user(&new_user).await?;
        info!(admin = %admin.id, user_id = %created.id, "User created by admin");

        let plan = new_user
            .plan
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.default_plan);
        if let Err(e) = self.directory.bootstrap_plan(&created.id, plan).await {
            warn!(user_id = %created.id, plan, error = %e, "Failed to bootstrap plan");
        }

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockDirectory {
        tokens: HashMap<String, AuthUser>,
        roles: HashSet<(String, String)>,
        created: Mutex<Vec<String>>,
        plans: Mutex<Vec<(String, String)>>,
        fail_plan: bool,
    }

    impl MockDirectory {
        fn with_user(mut self, token: &str, id: &str, roles: &[&str]) -> Self {
            self.tokens.insert(
                token.into(),
                AuthUser {
                    id: id.into(),
                    email: Some(format!("{id}@example.com")),
                },
            );
            for role in roles {
                self.roles.insert((id.into(), (*role).into()));
            }
            self
        }
    }

    #[async_trait]
    impl Directory for MockDirectory {
        async fn user_for_token(&self, token: &str) -> Result<Option<AuthUser>, BackendError> {
            Ok(self.tokens.get(token).cloned())
        }

        async fn has_role(&self, user_id: &str, role: &str) -> Result<bool, BackendError> {
            Ok(self.roles.contains(&(user_id.to_string(), role.to_string())))
        }

        async fn create_user(&self, user: &NewUser) -> Result<AuthUser, BackendError> {
            self.created.lock().unwrap().push(user.email.clone());
            Ok(AuthUser {
                id: format!("new-{}", user.email),
                email: Some(user.email.clone()),
            })
        }

        async fn bootstrap_plan(&self, user_id: &str, plan: &str) -> Result<(), BackendError> {
            if self.fail_plan {
                return Err(BackendError::Http {
                    status: 500,
                    message: "plans table locked".into(),
                });
            }
            self.plans
                .lock()
                .unwrap()
                .push((user_id.into(), plan.into()));
            Ok(())
        }
    }

    fn new_user() -> NewUser {
        NewUser {
            email: "ana@example.com".into(),
            password: "s3cret!".into(),
            full_name: Some("Ana".into()),
            plan: None,
        }
    }

    #[tokio::test]
    async fn admin_creates_user_and_plan() {
        let dir = Arc::new(MockDirectory::default().with_user("tok-admin", "u1", &["admin"]));
        let svc = AdminService::new(dir.clone(), "free");

        let user = svc.create_user("tok-admin", new_user()).await.unwrap();
        assert_eq!(user.email.as_deref(), Some("ana@example.com"));
        assert_eq!(dir.created.lock().unwrap().len(), 1);
        assert_eq!(
            dir.plans.lock().unwrap()[0],
            ("new-ana@example.com".to_string(), "free".to_string())
        );
    }

    #[tokio::test]
    async fn non_admin_is_forbidden() {
        let dir = Arc::new(MockDirectory::default().with_user("tok-user", "u2", &["editor"]));
        let svc = AdminService::new(dir.clone(), "free");

        let err = svc.create_user("tok-user", new_user()).await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::Forbidden(_))));
        assert!(dir.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_token_is_unauthenticated() {
        let svc = AdminService::new(Arc::new(MockDirectory::default()), "free");
        let err = svc.create_user("nope", new_user()).await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::Unauthenticated(_))));

        let err = svc.create_user("  ", new_user()).await.unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn missing_email_is_validation_error() {
        let dir = Arc::new(MockDirectory::default().with_user("tok-admin", "u1", &["admin"]));
        let svc = AdminService::new(dir, "free");
        let mut user = new_user();
        user.email = " ".into();
        let err = svc.create_user("tok-admin", user).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn requested_plan_overrides_default() {
        let dir = Arc::new(MockDirectory::default().with_user("tok-admin", "u1", &["admin"]));
        let svc = AdminService::new(dir.clone(), "free");
        let mut user = new_user();
        user.plan = Some("pro".into());
        svc.create_user("tok-admin", user).await.unwrap();
        assert_eq!(dir.plans.lock().unwrap()[0].1, "pro");
    }

    #[tokio::test]
    async fn plan_failure_does_not_fail_creation() {
        let mut dir = MockDirectory::default().with_user("tok-admin", "u1", &["admin"]);
        dir.fail_plan = true;
        let svc = AdminService::new(Arc::new(dir), "free");
        assert!(svc.create_user("tok-admin", new_user()).await.is_ok());
    }
}
