use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::IdentityConfig;
use crate::error::IdentityError;
use crate::store::{AccountCreationData, IdentifierType, IdentityStore, UserRecord};
use crate::token::TokenCache;

/// Keycloak-backed [`IdentityStore`].
///
/// Authenticates against the `master` realm's admin-cli client via the
/// resource-owner-password-credentials grant, then drives the target
/// realm's admin REST API (`/admin/realms/{realm}/users`).
pub struct KeycloakIdentityStore {
    client: reqwest::Client,
    config: IdentityConfig,
    token: TokenCache,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct KeycloakUser {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default, rename = "firstName")]
    first_name: String,
    #[serde(default, rename = "lastName")]
    last_name: String,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    attributes: Option<std::collections::HashMap<String, Vec<String>>>,
}

impl KeycloakUser {
    fn phone(&self) -> String {
        self.attributes
            .as_ref()
            .and_then(|attrs| attrs.get("phoneNumber"))
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_default()
    }
}

impl From<KeycloakUser> for UserRecord {
    fn from(u: KeycloakUser) -> Self {
        let phone = u.phone();
        Self {
            user_id: u.id,
            email: u.email,
            phone,
            first_name: u.first_name,
            last_name: u.last_name,
            enabled: u.enabled,
        }
    }
}

impl KeycloakIdentityStore {
    #[must_use]
    pub fn new(config: IdentityConfig) -> Self {
        let client = reqwest::Client::builder().timeout(config.timeout).build().unwrap_or_default();
        Self { client, config, token: TokenCache::new() }
    }

    async fn access_token(&self) -> Result<String, IdentityError> {
        if let Some(token) = self.token.get() {
            return Ok(token);
        }
        let url = format!("{}/realms/master/protocol/openid-connect/token", self.config.url);
        let params = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("username", self.config.admin_user.as_str()),
            ("password", self.config.admin_pass.as_str()),
        ];
        let resp = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| IdentityError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::AuthFailed(format!("status {status}: {body}")));
        }
        let parsed: TokenResponse =
            resp.json().await.map_err(|e| IdentityError::Serialization(e.to_string()))?;
        self.token.set(parsed.access_token.clone(), std::time::Duration::from_secs(parsed.expires_in));
        Ok(parsed.access_token)
    }

    fn users_url(&self) -> String {
        format!("{}/admin/realms/{}/users", self.config.url, self.config.realm)
    }

    async fn find_users(&self, query_param: &str, query_value: &str) -> Result<Vec<KeycloakUser>, IdentityError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .get(self.users_url())
            .bearer_auth(token)
            .query(&[(query_param, query_value)])
            .send()
            .await
            .map_err(|e| IdentityError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::Rejected { status, body });
        }
        resp.json().await.map_err(|e| IdentityError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl IdentityStore for KeycloakIdentityStore {
    async fn create_user(&self, data: &AccountCreationData) -> Result<String, IdentityError> {
        let token = self.access_token().await?;
        let payload = json!({
            "email": data.email,
            "firstName": data.first_name,
            "lastName": data.last_name,
            "enabled": true,
            "emailVerified": false,
            "attributes": { "phoneNumber": [data.phone] },
            "credentials": [{ "type": "password", "value": data.password, "temporary": false }],
        });
        let resp = self
            .client
            .post(self.users_url())
            .bearer_auth(token.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| IdentityError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IdentityError::Rejected { status, body });
        }

        // Keycloak returns the new user's id via a Location header, not a body.
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .map(str::to_owned);

        match location {
            Some(id) => Ok(id),
            None => {
                let created = self.find_users("email", &data.email).await?;
                created.into_iter().next().map(|u| u.id).ok_or(IdentityError::NotFound)
            }
        }
    }

    async fn get_user(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
    ) -> Result<Option<UserRecord>, IdentityError> {
        let users = match identifier_type {
            IdentifierType::Email => self.find_users("email", identifier).await?,
            IdentifierType::Phone => {
                self.find_users("q", &format!("phoneNumber:{identifier}")).await?
            }
        };
        Ok(users.into_iter().next().map(UserRecord::from))
    }
}
