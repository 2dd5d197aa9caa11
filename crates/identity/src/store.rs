use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Which attribute a lookup is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierType {
    Email,
    Phone,
}

/// Account data required to provision a new identity record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCreationData {
    pub email: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

/// A user record as reported by the identity authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub enabled: bool,
}

/// The upstream identity authority: account creation and lookup by email or phone.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn create_user(&self, data: &AccountCreationData) -> Result<String, IdentityError>;

    async fn get_user(
        &self,
        identifier: &str,
        identifier_type: IdentifierType,
    ) -> Result<Option<UserRecord>, IdentityError>;
}
