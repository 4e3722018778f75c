#![forbid(unsafe_code)]

use anyhow::{Context, anyhow};
use coffebot_domain::ChannelId;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::{ChatSendRequest, ChatSendResult, ChatSender};

/// Event name Kick uses for webhook chat deliveries.
pub const CHAT_MESSAGE_SENT_EVENT: &str = "chat.message.sent";

#[derive(Debug, Clone)]
pub struct KickClient {
	base_url: String,
	client: reqwest::Client,
}

impl KickClient {
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			client: reqwest::Client::new(),
		}
	}

	pub fn base_url(&self) -> &str {
		self.base_url.trim_end_matches('/')
	}

	/// Default location of the webhook signing key.
	pub fn public_key_url(&self) -> String {
		format!("{}/public/v1/public-key", self.base_url())
	}

	fn auth_header(access_token: &str) -> anyhow::Result<String> {
		let token = access_token.trim();
		if token.is_empty() {
			return Err(anyhow!("missing kick access token"));
		}
		Ok(format!("Bearer {token}"))
	}

	pub async fn post_chat_message(&self, access_token: &str, request: &ChatSendRequest) -> anyhow::Result<ChatSendResult> {
		let url = format!("{}/public/v1/chat", self.base_url());
		let resp = self
			.client
			.post(url)
			.header("Authorization", Self::auth_header(access_token)?)
			.json(request)
			.send()
			.await
			.context("kick send chat")?;

		let status = resp.status();
		let body = resp.text().await.context("read kick send chat response")?;
		if !status.is_success() {
			return Err(anyhow!("kick send chat failed: status={} body={}", status, body));
		}

		let parsed: KickDataResponse<ChatSendResult> =
			serde_json::from_str(&body).context("parse kick send chat response")?;
		Ok(parsed.data)
	}

	/// Fetch the PEM-encoded public key used to sign webhook deliveries.
	pub async fn fetch_public_key_pem(&self, url: &str) -> anyhow::Result<String> {
		let resp = self
			.client
			.get(url)
			.header("Accept", "application/json, application/x-pem-file, text/plain")
			.send()
			.await
			.context("kick get public key")?;

		if !resp.status().is_success() {
			return Err(anyhow!("kick get public key failed: status={}", resp.status()));
		}

		let body = resp.text().await.context("read kick public key response")?;
		extract_public_key_pem(&body).ok_or_else(|| anyhow!("kick public key response did not contain a PEM key"))
	}

	/// Register webhook delivery of `chat.message.sent` for a broadcaster.
	pub async fn subscribe_chat_events(&self, access_token: &str, broadcaster_user_id: ChannelId) -> anyhow::Result<()> {
		let url = format!("{}/public/v1/events/subscriptions", self.base_url());
		let body = KickCreateSubscriptionsRequest {
			broadcaster_user_id,
			events: vec![KickEventFilter {
				name: CHAT_MESSAGE_SENT_EVENT.to_string(),
				version: 1,
			}],
			method: "webhook".to_string(),
		};

		let resp = self
			.client
			.post(url)
			.header("Authorization", Self::auth_header(access_token)?)
			.json(&body)
			.send()
			.await
			.context("kick create event subscriptions")?;

		match resp.status() {
			StatusCode::OK | StatusCode::CREATED => Ok(()),
			status => Err(anyhow!("kick create event subscriptions failed: status={}", status)),
		}
	}
}

#[async_trait::async_trait]
impl ChatSender for KickClient {
	async fn send_chat_message(&self, access_token: &str, request: ChatSendRequest) -> anyhow::Result<ChatSendResult> {
		self.post_chat_message(access_token, &request).await
	}
}

/// Accept either a bare PEM body or `{"data":{"public_key":"..."}}`.
pub(crate) fn extract_public_key_pem(body: &str) -> Option<String> {
	let trimmed = body.trim();
	if trimmed.starts_with("-----BEGIN") {
		return Some(trimmed.to_string());
	}

	let parsed: KickDataResponse<KickPublicKeyData> = serde_json::from_str(trimmed).ok()?;
	let pem = parsed.data.public_key.trim().to_string();
	if pem.is_empty() { None } else { Some(pem) }
}

#[derive(Debug, Deserialize)]
struct KickDataResponse<T> {
	data: T,
}

#[derive(Debug, Deserialize)]
struct KickPublicKeyData {
	public_key: String,
}

#[derive(Debug, serde::Serialize)]
struct KickCreateSubscriptionsRequest {
	broadcaster_user_id: ChannelId,
	events: Vec<KickEventFilter>,
	method: String,
}

#[derive(Debug, serde::Serialize)]
struct KickEventFilter {
	name: String,
	version: u32,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn public_key_accepts_bare_pem_and_json_envelope() {
		let pem = "-----BEGIN PUBLIC KEY-----\nabc\n-----END PUBLIC KEY-----";
		assert_eq!(extract_public_key_pem(&format!("\n{pem}\n")).as_deref(), Some(pem));

		let json = serde_json::json!({"data": {"public_key": pem}, "message": "OK"}).to_string();
		assert_eq!(extract_public_key_pem(&json).as_deref(), Some(pem));

		assert!(extract_public_key_pem("{\"data\":{\"public_key\":\"\"}}").is_none());
		assert!(extract_public_key_pem("nope").is_none());
	}

	#[test]
	fn chat_send_result_decodes_data_envelope() {
		let body = r#"{"data":{"is_sent":true,"message_id":"abc"},"message":"OK"}"#;
		let parsed: KickDataResponse<ChatSendResult> = serde_json::from_str(body).unwrap();
		assert!(parsed.data.is_sent);
		assert_eq!(parsed.data.message_id, "abc");
	}

	#[test]
	fn blank_token_is_rejected_before_any_request() {
		assert!(KickClient::auth_header("   ").is_err());
		assert_eq!(KickClient::auth_header(" t ").unwrap(), "Bearer t");
	}
}
