pub mod message;
pub mod number;
pub mod sequence;

pub use message::{InboundMessage, MediaAttachment, OutboundReply};
pub use number::{ChannelNumber, NumberStatus};
pub use sequence::{
    AccountCreationData, AccountCreationStep, EmailCheckData, PhoneCheckData, SendOtpData,
    SequenceData, VerifyEmailData, required_previous_step,
};
