#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use coffebot_domain::ChatEvent;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NormalizeError {
	#[error("payload is not valid JSON: {0}")]
	NotJson(#[from] serde_json::Error),
	#[error("payload is not a JSON object")]
	NotObject,
	#[error("socket frame data has unsupported shape: {0}")]
	UnsupportedData(&'static str),
}

/// The wire shapes a chat message can arrive in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
	/// Top-level webhook body.
	Webhook(WebhookChatMessage),
	/// WebSocket frame carrying an `event` discriminator.
	Socket(SocketFrame),
}

/// Fields shared by the webhook body and the socket frame `data`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookChatMessage {
	#[serde(default, deserialize_with = "lenient_string")]
	pub content: String,
	#[serde(default)]
	pub sender: Option<WebhookSender>,
	#[serde(default, deserialize_with = "lenient_string")]
	pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookSender {
	#[serde(default, deserialize_with = "lenient_string")]
	pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SocketFrame {
	pub event: String,
	#[serde(default)]
	pub data: Value,
	#[serde(default)]
	pub channel: Option<String>,
}

impl WebhookChatMessage {
	pub fn username(&self) -> &str {
		self.sender.as_ref().map(|s| s.username.as_str()).unwrap_or("")
	}

	/// Build the canonical event; `None` when both username and content are empty.
	pub fn into_event(self, received_at: DateTime<Utc>) -> Option<ChatEvent> {
		let occurred_at = parse_timestamp(&self.created_at).unwrap_or(received_at);
		let username = self.sender.map(|s| s.username).unwrap_or_default();
		let event = ChatEvent::new(username, self.content, occurred_at);
		if event.is_blank() { None } else { Some(event) }
	}
}

impl SocketFrame {
	pub fn parse(text: &str) -> Result<Self, NormalizeError> {
		Ok(serde_json::from_str(text)?)
	}

	/// Decode `data`, which is either a nested JSON string or an inline object.
	pub fn message(&self) -> Result<WebhookChatMessage, NormalizeError> {
		match &self.data {
			Value::String(nested) => Ok(serde_json::from_str(nested)?),
			Value::Object(_) => Ok(serde_json::from_value(self.data.clone())?),
			Value::Null => Err(NormalizeError::UnsupportedData("missing")),
			_ => Err(NormalizeError::UnsupportedData("expected string or object")),
		}
	}
}

/// Classify a raw payload by the presence of an `event` field.
pub fn decode(raw: &[u8]) -> Result<InboundPayload, NormalizeError> {
	let value: Value = serde_json::from_slice(raw)?;
	let Value::Object(map) = &value else {
		return Err(NormalizeError::NotObject);
	};

	if map.get("event").is_some_and(Value::is_string) {
		Ok(InboundPayload::Socket(serde_json::from_value(value)?))
	} else {
		Ok(InboundPayload::Webhook(serde_json::from_value(value)?))
	}
}

pub fn normalize(raw: &[u8]) -> Option<ChatEvent> {
	normalize_at(raw, Utc::now())
}

/// Like [`normalize`] with an explicit ingestion time used when the payload
/// carries no usable timestamp.
pub fn normalize_at(raw: &[u8], received_at: DateTime<Utc>) -> Option<ChatEvent> {
	let message = match decode(raw) {
		Ok(InboundPayload::Webhook(message)) => message,
		Ok(InboundPayload::Socket(frame)) => match frame.message() {
			Ok(message) => message,
			Err(err) => {
				tracing::debug!(error = %err, event = %frame.event, "dropping socket frame");
				metrics::counter!("coffebot_normalize_malformed_total").increment(1);
				return None;
			}
		},
		Err(err) => {
			tracing::debug!(error = %err, "dropping malformed payload");
			metrics::counter!("coffebot_normalize_malformed_total").increment(1);
			return None;
		}
	};

	message.into_event(received_at)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
	let raw = raw.trim();
	if raw.is_empty() {
		return None;
	}
	DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc))
}

/// Strings pass through; null and non-string values become `""`.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Value::deserialize(deserializer)? {
		Value::String(s) => s,
		Value::Number(n) => n.to_string(),
		_ => String::new(),
	})
}
