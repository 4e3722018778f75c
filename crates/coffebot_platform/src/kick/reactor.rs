#![forbid(unsafe_code)]

use std::sync::Arc;

use coffebot_domain::{ChannelId, ChatEvent, SenderType};
use tracing::{debug, warn};

use crate::{ChatSendRequest, ChatSender, SecretString};

pub const DEFAULT_TRIGGER_PREFIX: &str = "!coffebot";
pub const DEFAULT_RESPONSE: &str = "☕ CoffeeBot here! Type !coffebot help for commands.";

#[derive(Debug, Clone)]
pub struct ReactorConfig {
	pub trigger_prefix: String,
	pub response: String,
	pub sender_type: SenderType,
	pub reply_channel_id: Option<ChannelId>,
	pub access_token: SecretString,
}

impl Default for ReactorConfig {
	fn default() -> Self {
		Self {
			trigger_prefix: DEFAULT_TRIGGER_PREFIX.to_string(),
			response: DEFAULT_RESPONSE.to_string(),
			sender_type: SenderType::User,
			reply_channel_id: None,
			access_token: SecretString::default(),
		}
	}
}

/// Replies to chat commands. Sends run detached and never fail the caller.
#[derive(Clone)]
pub struct CommandReactor {
	cfg: Arc<ReactorConfig>,
	sender: Arc<dyn ChatSender>,
}

impl CommandReactor {
	pub fn new(cfg: ReactorConfig, sender: Arc<dyn ChatSender>) -> Self {
		Self {
			cfg: Arc::new(cfg),
			sender,
		}
	}

	pub fn is_trigger(&self, content: &str) -> bool {
		let prefix = self.cfg.trigger_prefix.trim();
		if prefix.is_empty() {
			return false;
		}
		content
			.get(..prefix.len())
			.is_some_and(|head| head.eq_ignore_ascii_case(prefix))
	}

	/// Returns whether a reply was scheduled.
	pub fn on_event(&self, event: &ChatEvent) -> bool {
		if !self.is_trigger(&event.content) {
			return false;
		}

		if self.cfg.access_token.is_blank() {
			warn!(username = %event.username, "command trigger seen but no reply credentials are configured");
			metrics::counter!("coffebot_reactor_replies_skipped_total").increment(1);
			return false;
		}

		metrics::counter!("coffebot_reactor_triggers_total").increment(1);
		debug!(username = %event.username, "command trigger; scheduling reply");

		let request = ChatSendRequest {
			content: self.cfg.response.clone(),
			sender_type: self.cfg.sender_type,
			broadcaster_user_id: self.cfg.reply_channel_id,
			reply_to_message_id: None,
		};
		let sender = Arc::clone(&self.sender);
		let cfg = Arc::clone(&self.cfg);

		tokio::spawn(async move {
			match sender.send_chat_message(cfg.access_token.expose(), request).await {
				Ok(result) if result.is_sent => {
					debug!(message_id = %result.message_id, "command reply sent");
					metrics::counter!("coffebot_reactor_replies_total", "outcome" => "sent").increment(1);
				}
				Ok(_) => {
					warn!("command reply was not accepted");
					metrics::counter!("coffebot_reactor_replies_total", "outcome" => "rejected").increment(1);
				}
				Err(err) => {
					warn!(error = %format!("{err:#}"), "command reply failed");
					metrics::counter!("coffebot_reactor_replies_total", "outcome" => "error").increment(1);
				}
			}
		});

		true
	}
}
