//! Account endpoints: register, login, logout, current user, refresh.

use std::fmt;

use serde::{Deserialize, Serialize};

use texgen_core::subscription::SubscriptionPlan;

use crate::auth::AuthenticatedClient;
use crate::error::ClientError;
use crate::transport::HttpRequest;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub subscription_plan: String,
    #[serde(default)]
    pub credits: i64,
}

impl User {
    pub fn plan(&self) -> SubscriptionPlan {
        SubscriptionPlan::from_plan_name(&self.subscription_plan)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Clone, Serialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct RegisterCredentials {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl fmt::Debug for RegisterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AuthApi
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AuthApi {
    client: AuthenticatedClient,
}

impl AuthApi {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    /// Create an account and sign in as it.
    pub async fn register(&self, credentials: &RegisterCredentials) -> Result<AuthResponse, ClientError> {
        let request = HttpRequest::post("/auth/register").json(serde_json::to_value(credentials)?);
        let auth: AuthResponse = self.client.send_anonymous(request).await?.parse()?;
        self.client.session().set_tokens(&auth.access_token, &auth.refresh_token);
        tracing::info!(user_id = %auth.user.id, "Registered new account");
        Ok(auth)
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, ClientError> {
        let request = HttpRequest::post("/auth/login").json(serde_json::to_value(credentials)?);
        let auth: AuthResponse = self.client.send_anonymous(request).await?.parse()?;
        self.client.session().set_tokens(&auth.access_token, &auth.refresh_token);
        tracing::info!(user_id = %auth.user.id, plan = %auth.user.subscription_plan, "Signed in");
        Ok(auth)
    }

    /// Revoke the session server-side, then forget the tokens.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.require_session()?;
        self.client
            .execute(HttpRequest::post("/auth/logout"))
            .await?
            .ensure_success()?;
        self.client.session().clear_tokens();
        Ok(())
    }

    pub async fn current_user(&self) -> Result<User, ClientError> {
        self.require_session()?;
        self.client.execute(HttpRequest::get("/auth/me")).await?.parse()
    }

    /// Exchange the refresh token for a new token pair.
    pub async fn refresh(&self) -> Result<AuthResponse, ClientError> {
        self.client.refresh_tokens().await
    }

    fn require_session(&self) -> Result<(), ClientError> {
        if self.client.session().is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::AuthRequired)
        }
    }
}
