#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use coffebot_domain::ChannelId;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
pub use tokio_tungstenite::tungstenite::handshake::client::Request as WsRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use url::Url;

use super::normalize::SocketFrame;
use super::verifier::BoxFuture;
use crate::{ChatEventSink, SecretString};

pub type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
pub type WsConnector = Arc<dyn Fn(WsRequest) -> BoxFuture<'static, anyhow::Result<WsStream>> + Send + Sync>;

pub const PUSHER_PING_EVENT: &str = "pusher:ping";
pub const PUSHER_PONG_EVENT: &str = "pusher:pong";

const DEFAULT_WS_URL: &str = "wss://ws-us2.pusher.com/app/32cbd69e4b950bf97679?protocol=7&client=js&version=8.4.0&flash=false";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct ListenerConfig {
	/// WebSocket endpoint; `{channel_id}` is substituted before connecting.
	pub ws_url: String,
	pub subscribe_event: String,
	/// Channel name sent in the subscribe frame; `{channel_id}` is substituted.
	pub channel_template: String,
	/// Event names treated as chat messages. Empty accepts any non-protocol event.
	pub chat_events: Vec<String>,
	pub backoff_floor: Duration,
	pub backoff_ceiling: Duration,
	/// Send `pusher:ping` after this long without an inbound frame.
	pub ping_interval: Option<Duration>,
	/// Reconnect when nothing arrives for this long.
	pub idle_timeout: Option<Duration>,
	/// Test hook for substituting the connection step.
	pub ws_connector: Option<WsConnector>,
}

impl Default for ListenerConfig {
	fn default() -> Self {
		Self {
			ws_url: DEFAULT_WS_URL.to_string(),
			subscribe_event: "pusher:subscribe".to_string(),
			channel_template: "chatrooms.{channel_id}.v2".to_string(),
			chat_events: vec!["App\\Events\\ChatMessageEvent".to_string()],
			backoff_floor: Duration::from_secs(1),
			backoff_ceiling: Duration::from_secs(30),
			ping_interval: Some(Duration::from_secs(60)),
			idle_timeout: Some(Duration::from_secs(150)),
			ws_connector: None,
		}
	}
}

impl fmt::Debug for ListenerConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ListenerConfig")
			.field("ws_url", &self.ws_url)
			.field("subscribe_event", &self.subscribe_event)
			.field("channel_template", &self.channel_template)
			.field("chat_events", &self.chat_events)
			.field("backoff_floor", &self.backoff_floor)
			.field("backoff_ceiling", &self.backoff_ceiling)
			.field("ping_interval", &self.ping_interval)
			.field("idle_timeout", &self.idle_timeout)
			.field("ws_connector", &self.ws_connector.as_ref().map(|_| "custom"))
			.finish()
	}
}

impl ListenerConfig {
	pub fn resolved_url(&self, channel_id: ChannelId) -> anyhow::Result<Url> {
		let raw = self.ws_url.replace("{channel_id}", &channel_id.to_string());
		Url::parse(&raw).with_context(|| format!("invalid listener ws url: {raw}"))
	}

	/// Pusher-style handshakes (`pusher:*` events) also carry an empty `auth`.
	pub fn subscribe_frame(&self, channel_id: ChannelId) -> serde_json::Value {
		let channel = self.channel_template.replace("{channel_id}", &channel_id.to_string());
		if self.subscribe_event.starts_with("pusher:") {
			serde_json::json!({ "event": self.subscribe_event, "data": { "auth": "", "channel": channel } })
		} else {
			serde_json::json!({ "event": self.subscribe_event, "data": { "channel": channel } })
		}
	}

	pub fn is_chat_event(&self, event: &str) -> bool {
		if self.chat_events.is_empty() {
			return !event.starts_with("pusher:") && !event.starts_with("pusher_internal:");
		}
		self.chat_events.iter().any(|e| e == event)
	}

	fn connector(&self) -> WsConnector {
		if let Some(c) = &self.ws_connector {
			return c.clone();
		}

		Arc::new(|request: WsRequest| {
			Box::pin(async move {
				let (ws, _resp) = tokio_tungstenite::connect_async(request)
					.await
					.context("connect_async to chat ws")?;
				Ok(ws)
			}) as BoxFuture<'static, anyhow::Result<WsStream>>
		})
	}
}

/// Exponential reconnect delay between a floor and a ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
	floor: Duration,
	ceiling: Duration,
	current: Duration,
}

impl Backoff {
	pub fn new(floor: Duration, ceiling: Duration) -> Self {
		let floor = floor.max(Duration::from_millis(1));
		let ceiling = ceiling.max(floor);
		Self {
			floor,
			ceiling,
			current: floor,
		}
	}

	pub fn current(&self) -> Duration {
		self.current
	}

	/// Returns the delay to sleep now and doubles the next one, capped at the ceiling.
	pub fn next_delay(&mut self) -> Duration {
		let delay = self.current;
		self.current = self.current.saturating_mul(2).min(self.ceiling);
		delay
	}

	pub fn reset(&mut self) {
		self.current = self.floor;
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
	Idle,
	Connecting,
	Subscribed,
	Streaming,
	Reconnecting,
	Closing,
}

impl ListenerState {
	pub const fn as_str(self) -> &'static str {
		match self {
			ListenerState::Idle => "idle",
			ListenerState::Connecting => "connecting",
			ListenerState::Subscribed => "subscribed",
			ListenerState::Streaming => "streaming",
			ListenerState::Reconnecting => "reconnecting",
			ListenerState::Closing => "closing",
		}
	}
}

impl fmt::Display for ListenerState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

struct Shared {
	cfg: ListenerConfig,
	sink: Arc<dyn ChatEventSink>,
	running: AtomicBool,
	state: parking_lot::Mutex<ListenerState>,
}

impl Shared {
	fn set_state(&self, next: ListenerState) {
		let mut state = self.state.lock();
		if *state != next {
			debug!(from = %*state, to = %next, "chat listener state");
			*state = next;
		}
	}
}

struct RunningSession {
	shutdown_tx: oneshot::Sender<()>,
	handle: JoinHandle<()>,
	channel_id: ChannelId,
}

/// Owns at most one live chat WebSocket and keeps it connected until stopped.
pub struct ChatListener {
	shared: Arc<Shared>,
	session: tokio::sync::Mutex<Option<RunningSession>>,
}

impl ChatListener {
	pub fn new(cfg: ListenerConfig, sink: Arc<dyn ChatEventSink>) -> Self {
		Self {
			shared: Arc::new(Shared {
				cfg,
				sink,
				running: AtomicBool::new(false),
				state: parking_lot::Mutex::new(ListenerState::Idle),
			}),
			session: tokio::sync::Mutex::new(None),
		}
	}

	/// Spawn the connection loop. Returns `false` when already running.
	pub async fn start(&self, access_token: SecretString, channel_id: ChannelId) -> bool {
		let mut session = self.session.lock().await;
		if self.shared.running.load(Ordering::SeqCst) {
			debug!(%channel_id, "chat listener already running; start ignored");
			return false;
		}

		self.shared.running.store(true, Ordering::SeqCst);
		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let shared = Arc::clone(&self.shared);
		let handle = tokio::spawn(run_loop(shared, access_token, channel_id, shutdown_rx));

		info!(%channel_id, "chat listener started");
		metrics::counter!("coffebot_listener_starts_total").increment(1);
		*session = Some(RunningSession {
			shutdown_tx,
			handle,
			channel_id,
		});
		true
	}

	/// Signal the loop and wait for it to exit. Idempotent.
	pub async fn stop(&self) {
		let mut session = self.session.lock().await;
		self.shared.running.store(false, Ordering::SeqCst);

		let Some(running) = session.take() else {
			return;
		};

		let _ = running.shutdown_tx.send(());
		if let Err(err) = running.handle.await {
			warn!(error = %err, "chat listener task ended abnormally");
		}
		self.shared.set_state(ListenerState::Idle);
		info!(channel_id = %running.channel_id, "chat listener stopped");
	}

	pub fn is_running(&self) -> bool {
		self.shared.running.load(Ordering::SeqCst)
	}

	pub fn state(&self) -> ListenerState {
		*self.shared.state.lock()
	}

	pub fn config(&self) -> &ListenerConfig {
		&self.shared.cfg
	}
}

enum SessionEnd {
	Shutdown,
	Lost(String),
}

async fn run_loop(shared: Arc<Shared>, token: SecretString, channel_id: ChannelId, mut shutdown_rx: oneshot::Receiver<()>) {
	let connector = shared.cfg.connector();
	let mut backoff = Backoff::new(shared.cfg.backoff_floor, shared.cfg.backoff_ceiling);

	loop {
		shared.set_state(ListenerState::Connecting);

		let connected = tokio::select! {
			_ = &mut shutdown_rx => break,
			res = connect_and_subscribe(&shared.cfg, &connector, &token, channel_id) => res,
		};

		match connected {
			Ok(mut ws) => {
				backoff.reset();
				shared.set_state(ListenerState::Subscribed);
				metrics::counter!("coffebot_listener_connects_total").increment(1);
				info!(%channel_id, "chat ws subscribed");

				match stream_session(&shared, &mut ws, &mut shutdown_rx).await {
					SessionEnd::Shutdown => {
						shared.set_state(ListenerState::Closing);
						let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await;
						break;
					}
					SessionEnd::Lost(reason) => {
						warn!(%channel_id, %reason, "chat ws session lost");
						let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await;
					}
				}
			}
			Err(err) => {
				warn!(%channel_id, error = %format!("{err:#}"), "chat ws connect failed");
				metrics::counter!("coffebot_listener_connect_errors_total").increment(1);
			}
		}

		shared.set_state(ListenerState::Reconnecting);
		let delay = backoff.next_delay();
		metrics::counter!("coffebot_listener_reconnects_total").increment(1);
		debug!(%channel_id, ?delay, "chat ws reconnecting");

		tokio::select! {
			_ = &mut shutdown_rx => break,
			_ = sleep(delay) => {}
		}
	}

	shared.set_state(ListenerState::Idle);
}

async fn connect_and_subscribe(
	cfg: &ListenerConfig,
	connector: &WsConnector,
	token: &SecretString,
	channel_id: ChannelId,
) -> anyhow::Result<WsStream> {
	let url = cfg.resolved_url(channel_id)?;
	let mut request = url.as_str().into_client_request().context("build chat ws request")?;
	let bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose().trim())).context("access token is not a valid header")?;
	request.headers_mut().insert(AUTHORIZATION, bearer);

	let mut ws = connector(request).await?;

	let frame = cfg.subscribe_frame(channel_id).to_string();
	ws.send(Message::Text(frame.into())).await.context("send subscribe frame")?;
	Ok(ws)
}

/// Resolves at `deadline`, or never when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
	match deadline {
		Some(at) => sleep_until(at).await,
		None => std::future::pending().await,
	}
}

async fn stream_session(shared: &Shared, ws: &mut WsStream, shutdown_rx: &mut oneshot::Receiver<()>) -> SessionEnd {
	let ping_interval = shared.cfg.ping_interval;
	let idle_timeout = shared.cfg.idle_timeout;
	let mut streaming = false;
	let mut ping_at = ping_interval.map(|d| Instant::now() + d);
	let mut idle_at = idle_timeout.map(|d| Instant::now() + d);

	loop {
		let msg = tokio::select! {
			_ = &mut *shutdown_rx => return SessionEnd::Shutdown,
			next = ws.next() => match next {
				None => return SessionEnd::Lost("stream ended".to_string()),
				Some(Err(err)) => return SessionEnd::Lost(format!("read error: {err}")),
				Some(Ok(msg)) => msg,
			},
			_ = sleep_until_opt(idle_at) => return SessionEnd::Lost("idle timeout".to_string()),
			_ = sleep_until_opt(ping_at) => {
				let ping = serde_json::json!({ "event": PUSHER_PING_EVENT, "data": {} }).to_string();
				if let Err(err) = ws.send(Message::Text(ping.into())).await {
					return SessionEnd::Lost(format!("send error: {err}"));
				}
				debug!("chat ws quiet; sent keep-alive ping");
				ping_at = ping_interval.map(|d| Instant::now() + d);
				continue;
			}
		};

		let now = Instant::now();
		ping_at = ping_interval.map(|d| now + d);
		idle_at = idle_timeout.map(|d| now + d);

		if !streaming {
			streaming = true;
			shared.set_state(ListenerState::Streaming);
		}

		match msg {
			Message::Text(text) => {
				if let Some(reply) = handle_text(shared, text.as_str())
					&& let Err(err) = ws.send(Message::Text(reply.into())).await
				{
					return SessionEnd::Lost(format!("send error: {err}"));
				}
			}
			Message::Ping(payload) => {
				if let Err(err) = ws.send(Message::Pong(payload)).await {
					return SessionEnd::Lost(format!("send error: {err}"));
				}
			}
			Message::Close(frame) => return SessionEnd::Lost(format!("closed by server: {frame:?}")),
			Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
		}
	}
}

/// Route one text frame. Returns a frame to send back, if any.
fn handle_text(shared: &Shared, text: &str) -> Option<String> {
	let frame = match SocketFrame::parse(text) {
		Ok(frame) => frame,
		Err(err) => {
			debug!(error = %err, "ignoring undecodable chat ws frame");
			metrics::counter!("coffebot_normalize_malformed_total").increment(1);
			return None;
		}
	};

	if frame.event == PUSHER_PING_EVENT {
		return Some(serde_json::json!({ "event": PUSHER_PONG_EVENT, "data": {} }).to_string());
	}

	if !shared.cfg.is_chat_event(&frame.event) {
		debug!(event = %frame.event, "ignoring chat ws event");
		return None;
	}

	match frame.message() {
		Ok(message) => {
			if let Some(event) = message.into_event(Utc::now()) {
				metrics::counter!("coffebot_ingest_events_total", "source" => "socket").increment(1);
				shared.sink.dispatch(event);
			}
		}
		Err(err) => {
			debug!(error = %err, event = %frame.event, "dropping chat ws frame");
			metrics::counter!("coffebot_normalize_malformed_total").increment(1);
		}
	}
	None
}
