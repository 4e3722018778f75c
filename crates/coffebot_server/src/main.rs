#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use coffebot_platform::ChatEventSink;
use coffebot_platform::kick::{ChatListener, CommandReactor, KickClient, WebhookVerifier};
use coffebot_server::config::{ServerConfig, WebhookScheme, default_config_path, load_server_config_from_path};
use coffebot_server::server::event_hub::EventHub;
use coffebot_server::server::http::{AppState, ListenDefaults, bind_and_spawn};
use coffebot_server::server::pipeline::EventPipeline;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: coffebot_server [--config path] [--bind host:port]\n\
\n\
Options:\n\
\t--config  Config file (default: ~/.coffebot/config.toml, or $COFFEBOT_CONFIG)\n\
\t--bind    HTTP bind address (overrides [server].bind)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

#[derive(Debug, Default)]
struct Args {
	config: Option<std::path::PathBuf>,
	bind: Option<String>,
}

fn parse_args() -> Args {
	let mut args = Args::default();
	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				args.config = Some(v.into());
			}
			"--bind" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--bind must be non-empty (expected host:port)");
					usage_and_exit();
				}
				args.bind = Some(v);
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}
	args
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,coffebot_server=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	let Some(endpoint) = otlp_endpoint else {
		base.init();
		return;
	};

	use opentelemetry::global;
	use opentelemetry::trace::TracerProvider as _;
	use opentelemetry_otlp::WithExportConfig;

	match opentelemetry_otlp::SpanExporter::builder()
		.with_tonic()
		.with_endpoint(endpoint.clone())
		.build()
	{
		Ok(exporter) => {
			let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
				.with_batch_exporter(exporter)
				.build();
			let tracer = tracer_provider.tracer("coffebot_server");
			global::set_tracer_provider(tracer_provider);

			base.with(tracing_opentelemetry::layer().with_tracer(tracer)).init();
			info!(endpoint = %endpoint, "otlp tracing enabled");
		}
		Err(e) => {
			base.init();
			warn!(error = %e, "failed to initialize otlp tracing");
		}
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)"),
	}
}

fn build_verifier(cfg: &ServerConfig, client: &KickClient) -> WebhookVerifier {
	match cfg.webhook.scheme() {
		WebhookScheme::Hmac => WebhookVerifier::hmac(cfg.webhook.secret.clone()),
		WebhookScheme::Rsa => WebhookVerifier::rsa_from_source(cfg.public_key_source(client), client.clone()),
	}
}

async fn auto_subscribe(cfg: &ServerConfig, client: &KickClient) {
	let (Some(token), Some(channel_id)) = (cfg.kick.access_token.as_ref(), cfg.kick.channel_id) else {
		warn!("webhook auto_subscribe enabled but kick access_token/channel_id are not configured");
		return;
	};

	match client.subscribe_chat_events(token.expose(), channel_id).await {
		Ok(()) => info!(%channel_id, "kick webhook subscription registered"),
		Err(e) => warn!(%channel_id, error = %format!("{e:#}"), "kick webhook subscription failed"),
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let args = parse_args();
	let config_path = match args.config {
		Some(path) => path,
		None => default_config_path()?,
	};
	let mut cfg = load_server_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded config (toml + env overrides)");
	if let Some(bind) = args.bind {
		cfg.server.bind = bind;
	}

	init_metrics(cfg.server.metrics_bind.as_deref());

	let client = KickClient::new(cfg.kick.api_base.clone());
	let hub = EventHub::new();

	let reactor = if cfg.reactor.enabled {
		let reactor_cfg = cfg.reactor_config();
		if reactor_cfg.access_token.is_blank() {
			warn!("reactor enabled without credentials; command replies will be skipped");
		}
		Some(CommandReactor::new(reactor_cfg, Arc::new(client.clone())))
	} else {
		None
	};

	let pipeline = EventPipeline::new(hub, reactor);
	let sink: Arc<dyn ChatEventSink> = Arc::new(pipeline.clone());
	let listener = Arc::new(ChatListener::new(cfg.listener_config(), sink));

	let verifier = build_verifier(&cfg, &client);
	info!(scheme = verifier.scheme_name(), path = %cfg.webhook.path, "webhook verification configured");

	let state = Arc::new(AppState::new(
		cfg.webhook.path.clone(),
		verifier,
		pipeline,
		Arc::clone(&listener),
		ListenDefaults {
			access_token: cfg.kick.access_token.clone(),
			channel_id: cfg.kick.channel_id,
		},
	));

	let bind: SocketAddr = cfg
		.server
		.bind
		.parse()
		.with_context(|| format!("invalid bind address: {}", cfg.server.bind))?;
	let local = bind_and_spawn(bind, Arc::clone(&state)).await?;
	info!(%local, "http server listening");

	if cfg.webhook.auto_subscribe {
		auto_subscribe(&cfg, &client).await;
	}

	if cfg.listener.autostart {
		match (cfg.kick.access_token.clone(), cfg.kick.channel_id) {
			(Some(token), Some(channel_id)) => {
				listener.start(token, channel_id).await;
			}
			_ => warn!("listener autostart enabled but kick access_token/channel_id are not configured"),
		}
	}

	state.mark_ready();

	tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
	info!("shutting down");
	listener.stop().await;
	Ok(())
}
