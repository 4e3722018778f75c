#![forbid(unsafe_code)]

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("unknown sender type: {0}")]
	UnknownSenderType(String),
	#[error("invalid format: {0}")]
	InvalidFormat(String),
}

/// Normalized chat event shared by every ingestion path.
///
/// Values are immutable once built; the event hub hands out `Arc<ChatEvent>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
	pub username: String,
	pub content: String,
	pub occurred_at: DateTime<Utc>,
}

impl ChatEvent {
	pub fn new(username: impl Into<String>, content: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
		Self {
			username: username.into(),
			content: content.into(),
			occurred_at,
		}
	}

	/// True when neither username nor content carries anything.
	pub fn is_blank(&self) -> bool {
		self.username.trim().is_empty() && self.content.trim().is_empty()
	}
}

/// Opaque identifier for an event hub subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub uuid::Uuid);

impl SubscriptionId {
	/// Create a new random subscription id.
	pub fn new_v4() -> Self {
		Self(uuid::Uuid::new_v4())
	}
}

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Kick broadcaster/channel numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
	pub const fn new(id: u64) -> Self {
		Self(id)
	}

	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for ChannelId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}
		s.parse::<u64>()
			.map(ChannelId)
			.map_err(|_| ParseIdError::InvalidFormat(format!("expected numeric channel id, got {s}")))
	}
}

/// Who a chat message is sent as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
	#[default]
	User,
	Bot,
}

impl SenderType {
	/// Stable wire identifier.
	pub const fn as_str(self) -> &'static str {
		match self {
			SenderType::User => "user",
			SenderType::Bot => "bot",
		}
	}
}

impl fmt::Display for SenderType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for SenderType {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}

		match s.to_ascii_lowercase().as_str() {
			"user" => Ok(SenderType::User),
			"bot" => Ok(SenderType::Bot),
			other => Err(ParseIdError::UnknownSenderType(other.to_string())),
		}
	}
}
