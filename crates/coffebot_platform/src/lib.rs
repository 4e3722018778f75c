#![forbid(unsafe_code)]

pub mod kick;

use std::fmt;

use coffebot_domain::{ChannelId, ChatEvent, SenderType};
use serde::{Deserialize, Serialize};

/// Wrapper that redacts in logs.
#[derive(Clone, Default)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

impl<'de> serde::Deserialize<'de> for SecretString {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(SecretString::new(s))
	}
}

/// Destination for normalized chat events coming off an ingestion path.
///
/// Implementations must not block: the connection manager calls this from its
/// receive loop and the webhook endpoint from the request task.
pub trait ChatEventSink: Send + Sync + 'static {
	fn dispatch(&self, event: ChatEvent);
}

/// Outbound chat message request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatSendRequest {
	pub content: String,
	#[serde(rename = "type")]
	pub sender_type: SenderType,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub broadcaster_user_id: Option<ChannelId>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reply_to_message_id: Option<String>,
}

/// Result of a successful chat send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatSendResult {
	pub is_sent: bool,
	#[serde(default)]
	pub message_id: String,
}

/// Capability to post a chat message on the platform.
#[async_trait::async_trait]
pub trait ChatSender: Send + Sync + 'static {
	async fn send_chat_message(&self, access_token: &str, request: ChatSendRequest) -> anyhow::Result<ChatSendResult>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn secret_string_is_redacted() {
		let s = SecretString::new("hunter2");
		assert_eq!(format!("{s}"), "<redacted>");
		assert_eq!(format!("{s:?}"), "SecretString(<redacted>)");
		assert_eq!(s.expose(), "hunter2");
		assert!(SecretString::new("  ").is_blank());
	}

	#[test]
	fn chat_send_request_omits_missing_fields() {
		let req = ChatSendRequest {
			content: "hi".to_string(),
			sender_type: SenderType::Bot,
			broadcaster_user_id: None,
			reply_to_message_id: None,
		};
		let json = serde_json::to_value(&req).unwrap();
		assert_eq!(json, serde_json::json!({"content": "hi", "type": "bot"}));

		let req = ChatSendRequest {
			broadcaster_user_id: Some(ChannelId::new(7)),
			reply_to_message_id: Some("m-1".to_string()),
			..req
		};
		let json = serde_json::to_value(&req).unwrap();
		assert_eq!(json["broadcaster_user_id"], 7);
		assert_eq!(json["reply_to_message_id"], "m-1");
	}
}
