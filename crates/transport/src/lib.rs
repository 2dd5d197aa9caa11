pub mod config;
pub mod error;
pub mod transport;
pub mod verifier;

pub use config::TransportConfig;
pub use error::TransportError;
pub use transport::{HttpMessagingTransport, MessagingTransport, OutboundMedia};
pub use verifier::SignatureVerifier;
