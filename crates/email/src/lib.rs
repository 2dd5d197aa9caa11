pub mod config;
pub mod error;
pub mod sender;
pub mod sendgrid;
pub mod validate;

pub use config::EmailConfig;
pub use error::EmailError;
pub use sender::EmailSender;
pub use sendgrid::SendGridEmailSender;
pub use validate::is_valid_email;
