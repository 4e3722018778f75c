#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use coffebot_domain::{ChannelId, ChatEvent};
use coffebot_platform::kick::{CommandReactor, ReactorConfig};
use coffebot_platform::{ChatEventSink, ChatSendRequest, ChatSendResult, ChatSender, SecretString};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::server::event_hub::EventHub;
use crate::server::pipeline::EventPipeline;

struct ForwardingSender(mpsc::UnboundedSender<ChatSendRequest>);

#[async_trait::async_trait]
impl ChatSender for ForwardingSender {
	async fn send_chat_message(&self, _access_token: &str, request: ChatSendRequest) -> anyhow::Result<ChatSendResult> {
		let _ = self.0.send(request);
		Ok(ChatSendResult {
			is_sent: true,
			message_id: String::new(),
		})
	}
}

fn pipeline() -> (EventPipeline, mpsc::UnboundedReceiver<ChatSendRequest>) {
	let (tx, rx) = mpsc::unbounded_channel();
	let reactor = CommandReactor::new(
		ReactorConfig {
			reply_channel_id: Some(ChannelId::new(5)),
			access_token: SecretString::new("bot-token"),
			..ReactorConfig::default()
		},
		Arc::new(ForwardingSender(tx)),
	);
	(EventPipeline::new(EventHub::new(), Some(reactor)), rx)
}

fn event(content: &str) -> ChatEvent {
	ChatEvent::new("bob", content, std::time::SystemTime::UNIX_EPOCH.into())
}

#[tokio::test]
async fn dispatch_publishes_and_reacts() {
	let (pipeline, mut replies) = pipeline();
	let (_id, mut stream) = pipeline.hub().subscribe();

	pipeline.dispatch(event("!coffebot help"));

	let published = timeout(Duration::from_millis(250), stream.recv()).await.unwrap().unwrap();
	assert_eq!(published.content, "!coffebot help");

	let reply = timeout(Duration::from_millis(250), replies.recv()).await.unwrap().unwrap();
	assert_eq!(reply.broadcaster_user_id, Some(ChannelId::new(5)));
}

#[tokio::test]
async fn plain_chat_is_published_without_reply() {
	let (pipeline, mut replies) = pipeline();
	let (_id, mut stream) = pipeline.hub().subscribe();

	pipeline.dispatch(event("hello"));

	assert_eq!(stream.recv().await.unwrap().content, "hello");
	assert!(timeout(Duration::from_millis(50), replies.recv()).await.is_err());
}

#[tokio::test]
async fn pipeline_without_reactor_only_publishes() {
	let pipeline = EventPipeline::new(EventHub::new(), None);
	let (_id, mut stream) = pipeline.hub().subscribe();
	pipeline.dispatch(event("!coffebot"));
	assert_eq!(stream.recv().await.unwrap().content, "!coffebot");
}
