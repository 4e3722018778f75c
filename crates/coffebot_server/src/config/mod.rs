#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use coffebot_domain::{ChannelId, SenderType};
use coffebot_platform::SecretString;
use coffebot_platform::kick::{KickClient, ListenerConfig, PublicKeySource, ReactorConfig};
use serde::Deserialize;
use tracing::{info, warn};

/// Env var that points at an alternate config file.
pub const CONFIG_PATH_ENV: &str = "COFFEBOT_CONFIG";

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_API_BASE: &str = "https://api.kick.com";
const DEFAULT_WEBHOOK_PATH: &str = "/events/webhook";

/// Default config path: `~/.coffebot/config.toml`, or `$COFFEBOT_CONFIG`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	if let Ok(v) = std::env::var(CONFIG_PATH_ENV) {
		let v = v.trim();
		if !v.is_empty() {
			return Ok(PathBuf::from(v));
		}
	}
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".coffebot").join("config.toml"))
}

/// Load the config from TOML, then apply `COFFEBOT_*` env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg);
	apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
	Ok(cfg)
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub server: ServerSettings,
	pub kick: KickSettings,
	pub webhook: WebhookSettings,
	pub listener: ListenerSettings,
	pub reactor: ReactorSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// HTTP bind address (host:port).
	pub bind: String,
	/// Optional Prometheus exporter bind address (host:port).
	pub metrics_bind: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KickSettings {
	pub api_base: String,
	/// Default token for listener start and replies.
	pub access_token: Option<SecretString>,
	pub channel_id: Option<ChannelId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WebhookScheme {
	Hmac,
	#[default]
	Rsa,
}

impl FromStr for WebhookScheme {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"hmac" => Ok(WebhookScheme::Hmac),
			"rsa" => Ok(WebhookScheme::Rsa),
			other => Err(format!("unknown webhook scheme: {other}")),
		}
	}
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
	pub path: String,
	/// Explicitly configured scheme; see [`WebhookSettings::scheme`].
	pub scheme: Option<WebhookScheme>,
	/// Shared secret for the hmac scheme.
	pub secret: Option<SecretString>,
	pub public_key_url: Option<String>,
	pub public_key_path: Option<PathBuf>,
	pub public_key_pem: Option<String>,
	/// Register `chat.message.sent` webhook delivery at startup.
	pub auto_subscribe: bool,
}

#[derive(Debug, Clone)]
pub struct ListenerSettings {
	pub ws_url: String,
	pub subscribe_event: String,
	pub channel_template: String,
	pub chat_events: Vec<String>,
	pub backoff_floor: Duration,
	pub backoff_ceiling: Duration,
	pub ping_interval: Option<Duration>,
	pub idle_timeout: Option<Duration>,
	/// Start the listener at boot when token and channel are configured.
	pub autostart: bool,
}

#[derive(Debug, Clone)]
pub struct ReactorSettings {
	pub enabled: bool,
	pub trigger_prefix: String,
	pub response: String,
	pub sender_type: SenderType,
	pub reply_channel_id: Option<ChannelId>,
	pub access_token: Option<SecretString>,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self {
			bind: DEFAULT_BIND.to_string(),
			metrics_bind: None,
		}
	}
}

impl Default for KickSettings {
	fn default() -> Self {
		Self {
			api_base: DEFAULT_API_BASE.to_string(),
			access_token: None,
			channel_id: None,
		}
	}
}

impl Default for WebhookSettings {
	fn default() -> Self {
		Self {
			path: DEFAULT_WEBHOOK_PATH.to_string(),
			scheme: None,
			secret: None,
			public_key_url: None,
			public_key_path: None,
			public_key_pem: None,
			auto_subscribe: false,
		}
	}
}

impl WebhookSettings {
	/// Effective scheme: the configured one, else hmac when a secret is present.
	pub fn scheme(&self) -> WebhookScheme {
		match self.scheme {
			Some(scheme) => scheme,
			None if self.secret.is_some() => WebhookScheme::Hmac,
			None => WebhookScheme::Rsa,
		}
	}
}

impl Default for ListenerSettings {
	fn default() -> Self {
		let base = ListenerConfig::default();
		Self {
			ws_url: base.ws_url,
			subscribe_event: base.subscribe_event,
			channel_template: base.channel_template,
			chat_events: base.chat_events,
			backoff_floor: base.backoff_floor,
			backoff_ceiling: base.backoff_ceiling,
			ping_interval: base.ping_interval,
			idle_timeout: base.idle_timeout,
			autostart: false,
		}
	}
}

impl Default for ReactorSettings {
	fn default() -> Self {
		let base = ReactorConfig::default();
		Self {
			enabled: true,
			trigger_prefix: base.trigger_prefix,
			response: base.response,
			sender_type: base.sender_type,
			reply_channel_id: None,
			access_token: None,
		}
	}
}

impl ServerConfig {
	pub fn listener_config(&self) -> ListenerConfig {
		ListenerConfig {
			ws_url: self.listener.ws_url.clone(),
			subscribe_event: self.listener.subscribe_event.clone(),
			channel_template: self.listener.channel_template.clone(),
			chat_events: self.listener.chat_events.clone(),
			backoff_floor: self.listener.backoff_floor,
			backoff_ceiling: self.listener.backoff_ceiling,
			ping_interval: self.listener.ping_interval,
			idle_timeout: self.listener.idle_timeout,
			ws_connector: None,
		}
	}

	/// Reply credentials and channel fall back to the `[kick]` defaults.
	pub fn reactor_config(&self) -> ReactorConfig {
		ReactorConfig {
			trigger_prefix: self.reactor.trigger_prefix.clone(),
			response: self.reactor.response.clone(),
			sender_type: self.reactor.sender_type,
			reply_channel_id: self.reactor.reply_channel_id.or(self.kick.channel_id),
			access_token: self
				.reactor
				.access_token
				.clone()
				.or_else(|| self.kick.access_token.clone())
				.unwrap_or_default(),
		}
	}

	/// Inline PEM wins over a file path, which wins over fetching.
	pub fn public_key_source(&self, client: &KickClient) -> PublicKeySource {
		if let Some(pem) = self.webhook.public_key_pem.clone() {
			return PublicKeySource::Pem(pem);
		}
		if let Some(path) = self.webhook.public_key_path.clone() {
			return PublicKeySource::File(path);
		}
		let url = self
			.webhook
			.public_key_url
			.clone()
			.unwrap_or_else(|| client.public_key_url());
		PublicKeySource::Fetch { url }
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,
	#[serde(default)]
	kick: FileKickSettings,
	#[serde(default)]
	webhook: FileWebhookSettings,
	#[serde(default)]
	listener: FileListenerSettings,
	#[serde(default)]
	reactor: FileReactorSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	bind: Option<String>,
	metrics_bind: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileKickSettings {
	api_base: Option<String>,
	access_token: Option<String>,
	channel_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileWebhookSettings {
	path: Option<String>,
	scheme: Option<String>,
	secret: Option<String>,
	public_key_url: Option<String>,
	public_key_path: Option<String>,
	public_key_pem: Option<String>,
	auto_subscribe: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileListenerSettings {
	ws_url: Option<String>,
	subscribe_event: Option<String>,
	channel_template: Option<String>,
	chat_events: Option<Vec<String>>,
	backoff_floor_ms: Option<u64>,
	backoff_ceiling_ms: Option<u64>,
	ping_interval_secs: Option<u64>,
	idle_timeout_secs: Option<u64>,
	autostart: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileReactorSettings {
	enabled: Option<bool>,
	trigger_prefix: Option<String>,
	response: Option<String>,
	sender_type: Option<String>,
	reply_channel_id: Option<u64>,
	access_token: Option<String>,
}

fn non_blank(v: Option<String>) -> Option<String> {
	v.filter(|s| !s.trim().is_empty())
}

/// `0` disables the timer; absent keeps the default.
fn secs_or_disabled(secs: Option<u64>, default: Option<Duration>) -> Option<Duration> {
	match secs {
		Some(0) => None,
		Some(secs) => Some(Duration::from_secs(secs)),
		None => default,
	}
}

fn normalize_path(path: String) -> String {
	let path = path.trim();
	if path.starts_with('/') {
		path.to_string()
	} else {
		format!("/{path}")
	}
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> Self {
		let server_defaults = ServerSettings::default();
		let kick_defaults = KickSettings::default();
		let listener_defaults = ListenerSettings::default();
		let reactor_defaults = ReactorSettings::default();

		let secret = non_blank(file.webhook.secret).map(SecretString::new);
		let scheme = non_blank(file.webhook.scheme).map(|raw| {
			raw.parse::<WebhookScheme>().unwrap_or_else(|err| {
				warn!(error = %err, "webhook config: falling back to rsa");
				WebhookScheme::Rsa
			})
		});

		let sender_type = match non_blank(file.reactor.sender_type) {
			Some(raw) => raw.parse::<SenderType>().unwrap_or_else(|err| {
				warn!(error = %err, "reactor config: falling back to sender_type=user");
				SenderType::User
			}),
			None => reactor_defaults.sender_type,
		};

		let mut cfg = Self {
			server: ServerSettings {
				bind: non_blank(file.server.bind).unwrap_or(server_defaults.bind),
				metrics_bind: non_blank(file.server.metrics_bind),
			},
			kick: KickSettings {
				api_base: non_blank(file.kick.api_base).unwrap_or(kick_defaults.api_base),
				access_token: non_blank(file.kick.access_token).map(SecretString::new),
				channel_id: file.kick.channel_id.map(ChannelId::new),
			},
			webhook: WebhookSettings {
				path: non_blank(file.webhook.path)
					.map(normalize_path)
					.unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string()),
				scheme,
				secret,
				public_key_url: non_blank(file.webhook.public_key_url),
				public_key_path: non_blank(file.webhook.public_key_path).map(PathBuf::from),
				public_key_pem: non_blank(file.webhook.public_key_pem),
				auto_subscribe: file.webhook.auto_subscribe.unwrap_or(false),
			},
			listener: ListenerSettings {
				ws_url: non_blank(file.listener.ws_url).unwrap_or(listener_defaults.ws_url),
				subscribe_event: non_blank(file.listener.subscribe_event).unwrap_or(listener_defaults.subscribe_event),
				channel_template: non_blank(file.listener.channel_template).unwrap_or(listener_defaults.channel_template),
				chat_events: file.listener.chat_events.unwrap_or(listener_defaults.chat_events),
				backoff_floor: file
					.listener
					.backoff_floor_ms
					.map(Duration::from_millis)
					.unwrap_or(listener_defaults.backoff_floor),
				backoff_ceiling: file
					.listener
					.backoff_ceiling_ms
					.map(Duration::from_millis)
					.unwrap_or(listener_defaults.backoff_ceiling),
				ping_interval: secs_or_disabled(file.listener.ping_interval_secs, listener_defaults.ping_interval),
				idle_timeout: secs_or_disabled(file.listener.idle_timeout_secs, listener_defaults.idle_timeout),
				autostart: file.listener.autostart.unwrap_or(false),
			},
			reactor: ReactorSettings {
				enabled: file.reactor.enabled.unwrap_or(true),
				trigger_prefix: non_blank(file.reactor.trigger_prefix).unwrap_or(reactor_defaults.trigger_prefix),
				response: non_blank(file.reactor.response).unwrap_or(reactor_defaults.response),
				sender_type,
				reply_channel_id: file.reactor.reply_channel_id.map(ChannelId::new),
				access_token: non_blank(file.reactor.access_token).map(SecretString::new),
			},
		};

		cfg.fix_backoff_bounds();
		cfg
	}

	fn fix_backoff_bounds(&mut self) {
		let (floor, ceiling) = (self.listener.backoff_floor, self.listener.backoff_ceiling);
		if floor > ceiling {
			warn!(
				floor_ms = floor.as_millis(),
				ceiling_ms = ceiling.as_millis(),
				"listener config: backoff_floor > backoff_ceiling; swapping"
			);
			self.listener.backoff_floor = ceiling;
			self.listener.backoff_ceiling = floor;
		}
	}
}

pub(crate) fn parse_env_bool(v: &str) -> Option<bool> {
	match v.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

/// Apply `COFFEBOT_*` overrides read through `lookup`.
pub(crate) fn apply_env_overrides<F>(cfg: &mut ServerConfig, lookup: F)
where
	F: Fn(&str) -> Option<String>,
{
	let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

	if let Some(v) = var("COFFEBOT_BIND") {
		cfg.server.bind = v;
		info!("server config: bind overridden by env");
	}

	if let Some(v) = var("COFFEBOT_METRICS_BIND") {
		cfg.server.metrics_bind = Some(v);
		info!("server config: metrics_bind overridden by env");
	}

	if let Some(v) = var("COFFEBOT_KICK_API_BASE") {
		cfg.kick.api_base = v;
		info!("kick config: api_base overridden by env");
	}

	if let Some(v) = var("COFFEBOT_KICK_ACCESS_TOKEN") {
		cfg.kick.access_token = Some(SecretString::new(v));
		info!("kick config: access_token overridden by env");
	}

	if let Some(v) = var("COFFEBOT_KICK_CHANNEL_ID") {
		match v.parse::<ChannelId>() {
			Ok(id) => {
				cfg.kick.channel_id = Some(id);
				info!(channel_id = %id, "kick config: channel_id overridden by env");
			}
			Err(e) => warn!(error = %e, "kick config: ignoring COFFEBOT_KICK_CHANNEL_ID"),
		}
	}

	if let Some(v) = var("COFFEBOT_WEBHOOK_PATH") {
		cfg.webhook.path = normalize_path(v);
		info!(path = %cfg.webhook.path, "webhook config: path overridden by env");
	}

	if let Some(v) = var("COFFEBOT_WEBHOOK_SCHEME") {
		match v.parse::<WebhookScheme>() {
			Ok(scheme) => {
				cfg.webhook.scheme = Some(scheme);
				info!(?scheme, "webhook config: scheme overridden by env");
			}
			Err(e) => warn!(error = %e, "webhook config: ignoring COFFEBOT_WEBHOOK_SCHEME"),
		}
	}

	if let Some(v) = var("COFFEBOT_WEBHOOK_SECRET") {
		cfg.webhook.secret = Some(SecretString::new(v));
		info!("webhook config: secret overridden by env");
	}

	if let Some(v) = var("COFFEBOT_WEBHOOK_PUBLIC_KEY_URL") {
		cfg.webhook.public_key_url = Some(v);
		info!("webhook config: public_key_url overridden by env");
	}

	if let Some(v) = var("COFFEBOT_WEBHOOK_PUBLIC_KEY_PATH") {
		cfg.webhook.public_key_path = Some(PathBuf::from(v));
		info!("webhook config: public_key_path overridden by env");
	}

	if let Some(v) = var("COFFEBOT_WEBHOOK_PUBLIC_KEY_PEM") {
		cfg.webhook.public_key_pem = Some(v);
		info!("webhook config: public_key_pem overridden by env");
	}

	if let Some(enabled) = var("COFFEBOT_WEBHOOK_AUTO_SUBSCRIBE").as_deref().and_then(parse_env_bool) {
		cfg.webhook.auto_subscribe = enabled;
		info!(enabled, "webhook config: auto_subscribe overridden by env");
	}

	if let Some(v) = var("COFFEBOT_LISTENER_WS_URL") {
		cfg.listener.ws_url = v;
		info!("listener config: ws_url overridden by env");
	}

	if let Some(enabled) = var("COFFEBOT_LISTENER_AUTOSTART").as_deref().and_then(parse_env_bool) {
		cfg.listener.autostart = enabled;
		info!(enabled, "listener config: autostart overridden by env");
	}

	if let Some(ms) = var("COFFEBOT_LISTENER_BACKOFF_FLOOR_MS").and_then(|v| v.parse::<u64>().ok()) {
		cfg.listener.backoff_floor = Duration::from_millis(ms);
		info!(ms, "listener config: backoff_floor overridden by env");
	}

	if let Some(ms) = var("COFFEBOT_LISTENER_BACKOFF_CEILING_MS").and_then(|v| v.parse::<u64>().ok()) {
		cfg.listener.backoff_ceiling = Duration::from_millis(ms);
		info!(ms, "listener config: backoff_ceiling overridden by env");
	}

	if let Some(enabled) = var("COFFEBOT_REACTOR_ENABLED").as_deref().and_then(parse_env_bool) {
		cfg.reactor.enabled = enabled;
		info!(enabled, "reactor config: enabled overridden by env");
	}

	if let Some(v) = var("COFFEBOT_REACTOR_TRIGGER_PREFIX") {
		cfg.reactor.trigger_prefix = v;
		info!("reactor config: trigger_prefix overridden by env");
	}

	if let Some(v) = var("COFFEBOT_REACTOR_ACCESS_TOKEN") {
		cfg.reactor.access_token = Some(SecretString::new(v));
		info!("reactor config: access_token overridden by env");
	}

	if cfg.webhook.scheme() == WebhookScheme::Hmac && cfg.webhook.secret.is_none() {
		warn!("webhook config: hmac scheme without a secret; every delivery will be rejected");
	}

	cfg.fix_backoff_bounds();
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::io::Write as _;

	use super::*;

	fn no_env(_: &str) -> Option<String> {
		None
	}

	fn load(toml_src: &str) -> ServerConfig {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(toml_src.as_bytes()).unwrap();
		let parsed = read_toml_if_exists(file.path()).unwrap().unwrap();
		let mut cfg = ServerConfig::from_file(parsed);
		apply_env_overrides(&mut cfg, no_env);
		cfg
	}

	#[test]
	fn missing_file_yields_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("absent.toml");
		assert!(read_toml_if_exists(&path).unwrap().is_none());

		let cfg = ServerConfig::from_file(FileConfig::default());
		assert_eq!(cfg.server.bind, "127.0.0.1:8080");
		assert_eq!(cfg.kick.api_base, "https://api.kick.com");
		assert_eq!(cfg.webhook.path, "/events/webhook");
		assert_eq!(cfg.webhook.scheme(), WebhookScheme::Rsa);
		assert_eq!(cfg.listener.backoff_floor, Duration::from_secs(1));
		assert_eq!(cfg.listener.backoff_ceiling, Duration::from_secs(30));
		assert_eq!(cfg.reactor.trigger_prefix, "!coffebot");
	}

	#[test]
	fn toml_sections_map_to_settings() {
		let cfg = load(
			r#"
[server]
bind = "0.0.0.0:9000"

[kick]
access_token = "tok"
channel_id = 123

[webhook]
path = "hooks/kick"
secret = "s3cret"

[listener]
ws_url = "wss://example.test/ws?c={channel_id}"
chat_events = ["chat"]
backoff_floor_ms = 250
ping_interval_secs = 20
idle_timeout_secs = 0

[reactor]
sender_type = "bot"
"#,
		);

		assert_eq!(cfg.server.bind, "0.0.0.0:9000");
		assert_eq!(cfg.kick.channel_id, Some(ChannelId::new(123)));
		assert_eq!(cfg.webhook.path, "/hooks/kick");
		assert_eq!(cfg.webhook.scheme(), WebhookScheme::Hmac, "secret without scheme implies hmac");
		assert_eq!(cfg.listener.chat_events, vec!["chat".to_string()]);
		assert_eq!(cfg.listener.backoff_floor, Duration::from_millis(250));
		assert_eq!(cfg.listener.ping_interval, Some(Duration::from_secs(20)));
		assert_eq!(cfg.listener.idle_timeout, None);

		let reactor = cfg.reactor_config();
		assert_eq!(reactor.sender_type, SenderType::Bot);
		assert_eq!(reactor.access_token.expose(), "tok");
		assert_eq!(reactor.reply_channel_id, Some(ChannelId::new(123)));
	}

	#[test]
	fn env_overrides_win_over_file() {
		let mut cfg = load("[kick]\nchannel_id = 1\n[webhook]\nscheme = \"rsa\"\n");
		let env: HashMap<&str, &str> = HashMap::from([
			("COFFEBOT_KICK_CHANNEL_ID", "77"),
			("COFFEBOT_WEBHOOK_SCHEME", "HMAC"),
			("COFFEBOT_WEBHOOK_SECRET", "from-env"),
			("COFFEBOT_LISTENER_AUTOSTART", "yes"),
			("COFFEBOT_BIND", "  "),
		]);
		apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));

		assert_eq!(cfg.kick.channel_id, Some(ChannelId::new(77)));
		assert_eq!(cfg.webhook.scheme(), WebhookScheme::Hmac);
		assert_eq!(cfg.webhook.secret.as_ref().map(|s| s.expose()), Some("from-env"));
		assert!(cfg.listener.autostart);
		assert_eq!(cfg.server.bind, "127.0.0.1:8080", "blank env values are ignored");
	}

	#[test]
	fn inverted_backoff_bounds_are_swapped() {
		let cfg = load("[listener]\nbackoff_floor_ms = 5000\nbackoff_ceiling_ms = 100\n");
		assert_eq!(cfg.listener.backoff_floor, Duration::from_millis(100));
		assert_eq!(cfg.listener.backoff_ceiling, Duration::from_millis(5000));
	}

	#[test]
	fn public_key_source_precedence() {
		let client = KickClient::new("https://api.kick.com/");
		let mut cfg = ServerConfig::default();
		match cfg.public_key_source(&client) {
			PublicKeySource::Fetch { url } => assert_eq!(url, "https://api.kick.com/public/v1/public-key"),
			other => panic!("expected fetch, got {other:?}"),
		}

		cfg.webhook.public_key_path = Some(PathBuf::from("/tmp/kick.pem"));
		assert!(matches!(cfg.public_key_source(&client), PublicKeySource::File(_)));

		cfg.webhook.public_key_pem = Some("-----BEGIN PUBLIC KEY-----".to_string());
		assert!(matches!(cfg.public_key_source(&client), PublicKeySource::Pem(_)));
	}

	#[test]
	fn unknown_scheme_falls_back_to_rsa() {
		let cfg = load("[webhook]\nscheme = \"ed25519\"\nsecret = \"x\"\n");
		assert_eq!(cfg.webhook.scheme(), WebhookScheme::Rsa);
	}

	#[test]
	fn secret_from_env_alone_selects_hmac() {
		let mut cfg = ServerConfig::from_file(FileConfig::default());
		apply_env_overrides(&mut cfg, |k| (k == "COFFEBOT_WEBHOOK_SECRET").then(|| "s3cret".to_string()));

		assert!(cfg.webhook.secret.is_some());
		assert_eq!(cfg.webhook.scheme(), WebhookScheme::Hmac);
	}

	#[test]
	fn explicit_rsa_scheme_survives_env_secret() {
		let mut cfg = load("[webhook]\nscheme = \"rsa\"\n");
		apply_env_overrides(&mut cfg, |k| (k == "COFFEBOT_WEBHOOK_SECRET").then(|| "s3cret".to_string()));
		assert_eq!(cfg.webhook.scheme(), WebhookScheme::Rsa);
	}
}
