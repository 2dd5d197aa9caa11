use serde::{Deserialize, Serialize};

/// A media attachment extracted from an inbound webhook's `MediaUrlN` /
/// `MediaContentTypeN` form fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub content_type: String,
    pub url: String,
}

/// A message accepted from the upstream transport's webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
}

/// A reply produced by the conversation backend, ready to be cleaned and
/// dispatched back through the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundReply {
    pub text: String,
    pub conversation_id: Option<String>,
}
