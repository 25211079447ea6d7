//! Login against the public login route

use partsdesk_core::{Session, lenient, oid};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::api::{ApiClient, ApiRequest};
use crate::{ClientError, Result};

#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login response; identity may sit at the top level or under `user`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    #[serde(default, alias = "accessToken", deserialize_with = "lenient::string")]
    token: Option<String>,

    #[serde(default, alias = "expires_at", deserialize_with = "lenient::string")]
    expires_at: Option<String>,

    #[serde(default)]
    user: Option<LoginUser>,

    #[serde(flatten)]
    identity: LoginUser,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginUser {
    #[serde(default, alias = "_id", alias = "id", deserialize_with = "oid::object_id")]
    user_id: Option<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    role: Option<String>,

    #[serde(
        default,
        alias = "technicianId",
        alias = "tecnicoId",
        deserialize_with = "oid::object_id"
    )]
    secondary_id: Option<String>,
}

impl LoginResponse {
    fn into_session(self) -> Option<Session> {
        let token = self.token.filter(|t| !t.trim().is_empty())?;
        let user = self.user.unwrap_or_default();
        let identity = self.identity;

        let mut session = Session::new(token);
        session.expires_at = self.expires_at;
        session.user_id = user.user_id.or(identity.user_id);
        session.role = user.role.or(identity.role);
        session.secondary_id = user.secondary_id.or(identity.secondary_id);
        Some(session)
    }
}

impl ApiClient {
    /// Authenticate and replace the stored session.
    ///
    /// The expiry falls back to the `X-Token-Expires-At` header when the body
    /// does not carry one. Renewal throttling starts fresh for the new session.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<Session> {
        let body = serde_json::to_value(credentials)
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        let response = self
            .execute(ApiRequest::post(self.login_path()).json(body).skip_renewal())
            .await?;

        let parsed: LoginResponse = serde_json::from_str(&response.body)
            .map_err(|e| ClientError::Parse(format!("login response: {}", e)))?;
        let mut session = parsed
            .into_session()
            .ok_or_else(|| ClientError::Parse("login response carried no token".to_string()))?;
        if session.expires_at.is_none() {
            session.expires_at = response.token_expires_at;
        }

        self.store().save(session.clone())?;
        self.renewal().reset();
        info!(
            user_id = session.user_id.as_deref().unwrap_or_default(),
            role = session.role.as_deref().unwrap_or_default(),
            "Logged in"
        );
        Ok(session)
    }
}
