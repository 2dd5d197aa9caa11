pub mod config;
pub mod error;
pub mod http;
pub mod store;
pub mod token;

pub use config::IdentityConfig;
pub use error::IdentityError;
pub use http::KeycloakIdentityStore;
pub use store::{AccountCreationData, IdentifierType, IdentityStore, UserRecord};
