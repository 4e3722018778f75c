#![forbid(unsafe_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use coffebot_domain::ChannelId;
use coffebot_platform::kick::{CHAT_MESSAGE_SENT_EVENT, ChatListener, EVENT_TYPE_HEADER, WebhookVerifier, normalize};
use coffebot_platform::{ChatEventSink, SecretString};
use futures::StreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::server::pipeline::EventPipeline;

pub type HttpBody = UnsyncBoxBody<Bytes, Infallible>;

pub const STREAM_PATH: &str = "/events/stream";
pub const LISTEN_START_PATH: &str = "/chat/listen/start";
pub const LISTEN_STOP_PATH: &str = "/chat/listen/stop";
pub const LISTEN_STATUS_PATH: &str = "/chat/listen";

/// Fallbacks for `POST /chat/listen/start` when the body omits them.
#[derive(Debug, Clone, Default)]
pub struct ListenDefaults {
	pub access_token: Option<SecretString>,
	pub channel_id: Option<ChannelId>,
}

pub struct AppState {
	pub webhook_path: String,
	pub verifier: WebhookVerifier,
	pub pipeline: EventPipeline,
	pub listener: Arc<ChatListener>,
	pub listen_defaults: ListenDefaults,
	ready: AtomicBool,
}

impl AppState {
	pub fn new(
		webhook_path: impl Into<String>,
		verifier: WebhookVerifier,
		pipeline: EventPipeline,
		listener: Arc<ChatListener>,
		listen_defaults: ListenDefaults,
	) -> Self {
		Self {
			webhook_path: webhook_path.into(),
			verifier,
			pipeline,
			listener,
			listen_defaults,
			ready: AtomicBool::new(false),
		}
	}

	pub fn mark_ready(&self) {
		self.ready.store(true, Ordering::Relaxed);
	}

	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Relaxed)
	}
}

/// Accept connections until the listener fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
	loop {
		let (stream, _addr) = listener.accept().await?;
		let io = TokioIo::new(stream);
		let state = Arc::clone(&state);
		tokio::spawn(async move {
			let service = service_fn(move |req| handle(req, Arc::clone(&state)));
			if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
				debug!(error = %err, "http connection error");
			}
		});
	}
}

pub async fn bind_and_spawn(bind: SocketAddr, state: Arc<AppState>) -> anyhow::Result<SocketAddr> {
	let listener = TcpListener::bind(bind).await?;
	let local = listener.local_addr()?;
	tokio::spawn(async move {
		if let Err(err) = serve(listener, state).await {
			warn!(error = %err, "http server stopped");
		}
	});
	Ok(local)
}

pub async fn handle(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<HttpBody>, hyper::Error> {
	let path = req.uri().path().to_string();
	let method = req.method().clone();

	if path == state.webhook_path {
		return Ok(match method {
			Method::GET => handle_challenge(&req),
			Method::POST => handle_webhook(req, &state).await,
			_ => empty(StatusCode::METHOD_NOT_ALLOWED),
		});
	}

	let resp = match (path.as_str(), method) {
		(STREAM_PATH, Method::GET) => handle_stream(&state),
		(LISTEN_START_PATH, Method::POST) => handle_listen_start(req, &state).await,
		(LISTEN_STOP_PATH, Method::POST) => {
			state.listener.stop().await;
			json(StatusCode::OK, serde_json::json!({ "stopped": true }))
		}
		(LISTEN_STATUS_PATH, Method::GET) => json(
			StatusCode::OK,
			serde_json::json!({
				"running": state.listener.is_running(),
				"state": state.listener.state().as_str(),
			}),
		),
		("/healthz", Method::GET) => text(StatusCode::OK, "ok"),
		("/readyz", Method::GET) => {
			if state.is_ready() {
				text(StatusCode::OK, "ready")
			} else {
				text(StatusCode::SERVICE_UNAVAILABLE, "not-ready")
			}
		}
		(STREAM_PATH | LISTEN_START_PATH | LISTEN_STOP_PATH | LISTEN_STATUS_PATH | "/healthz" | "/readyz", _) => {
			empty(StatusCode::METHOD_NOT_ALLOWED)
		}
		_ => empty(StatusCode::NOT_FOUND),
	};
	Ok(resp)
}

/// Echo `challenge` back verbatim for endpoint validation.
fn handle_challenge(req: &Request<Incoming>) -> Response<HttpBody> {
	let challenge = req.uri().query().and_then(|q| {
		url::form_urlencoded::parse(q.as_bytes())
			.find(|(k, _)| k == "challenge")
			.map(|(_, v)| v.into_owned())
	});

	match challenge {
		Some(challenge) => {
			metrics::counter!("coffebot_webhook_challenges_total").increment(1);
			text(StatusCode::OK, challenge)
		}
		None => text(StatusCode::BAD_REQUEST, "missing challenge"),
	}
}

async fn handle_webhook(req: Request<Incoming>, state: &AppState) -> Response<HttpBody> {
	metrics::counter!("coffebot_webhook_requests_total").increment(1);
	let (parts, body) = req.into_parts();

	let body = match body.collect().await {
		Ok(collected) => collected.to_bytes(),
		Err(err) => {
			warn!(error = %err, "webhook body read failed");
			metrics::counter!("coffebot_webhook_body_errors_total").increment(1);
			return empty(StatusCode::BAD_REQUEST);
		}
	};

	if !state.verifier.verify(&parts.headers, &body).await {
		warn!(scheme = state.verifier.scheme_name(), "webhook signature rejected");
		return empty(StatusCode::UNAUTHORIZED);
	}

	let event_type = parts
		.headers
		.get(EVENT_TYPE_HEADER)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.unwrap_or("");
	if !event_type.is_empty() && event_type != CHAT_MESSAGE_SENT_EVENT {
		debug!(%event_type, "acknowledging non-chat webhook event");
		metrics::counter!("coffebot_webhook_ignored_events_total").increment(1);
		return json(StatusCode::OK, serde_json::json!({ "ok": true }));
	}

	match normalize(&body) {
		Some(event) => {
			metrics::counter!("coffebot_ingest_events_total", "source" => "webhook").increment(1);
			state.pipeline.dispatch(event);
		}
		None => debug!(len = body.len(), "webhook payload carried no chat event"),
	}

	json(StatusCode::OK, serde_json::json!({ "ok": true }))
}

fn handle_stream(state: &AppState) -> Response<HttpBody> {
	let (guard, events) = state.pipeline.hub().subscribe_guarded();
	debug!(subscription = %guard.id(), "sse client connected");

	let hello = futures::stream::once(async { Ok::<_, Infallible>(Frame::data(Bytes::from_static(b": connected\n\n"))) });
	let events = events.filter_map(move |event| {
		let _keep = &guard;
		let frame = match serde_json::to_string(&*event) {
			Ok(json) => Some(Ok(Frame::data(Bytes::from(format!("data: {json}\n\n"))))),
			Err(err) => {
				warn!(error = %err, "failed to encode chat event for sse");
				None
			}
		};
		futures::future::ready(frame)
	});

	let mut resp = Response::new(BodyExt::boxed_unsync(StreamBody::new(hello.chain(events))));
	resp.headers_mut()
		.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
	resp.headers_mut().insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
	resp
}

#[derive(Debug, Default, Deserialize)]
struct ListenStartRequest {
	access_token: Option<String>,
	channel_id: Option<u64>,
}

async fn handle_listen_start(req: Request<Incoming>, state: &AppState) -> Response<HttpBody> {
	let body = match req.into_body().collect().await {
		Ok(collected) => collected.to_bytes(),
		Err(err) => {
			warn!(error = %err, "listen start body read failed");
			return empty(StatusCode::BAD_REQUEST);
		}
	};

	let request: ListenStartRequest = if body.iter().all(u8::is_ascii_whitespace) {
		ListenStartRequest::default()
	} else {
		match serde_json::from_slice(&body) {
			Ok(r) => r,
			Err(err) => {
				return json(StatusCode::BAD_REQUEST, serde_json::json!({ "error": format!("invalid body: {err}") }));
			}
		}
	};

	let token = request
		.access_token
		.filter(|t| !t.trim().is_empty())
		.map(SecretString::new)
		.or_else(|| state.listen_defaults.access_token.clone());
	let Some(token) = token else {
		return json(StatusCode::BAD_REQUEST, serde_json::json!({ "error": "missing access token" }));
	};

	let Some(channel_id) = request.channel_id.map(ChannelId::new).or(state.listen_defaults.channel_id) else {
		return json(StatusCode::BAD_REQUEST, serde_json::json!({ "error": "missing channel id" }));
	};

	let started = state.listener.start(token, channel_id).await;
	if started {
		info!(%channel_id, "chat listener started via http");
	}

	json(
		StatusCode::OK,
		serde_json::json!({ "started": true, "already_running": !started, "channel_id": channel_id.get() }),
	)
}

fn full(body: impl Into<Bytes>) -> HttpBody {
	BodyExt::boxed_unsync(Full::new(body.into()))
}

fn empty(status: StatusCode) -> Response<HttpBody> {
	let mut resp = Response::new(full(Bytes::new()));
	*resp.status_mut() = status;
	resp
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<HttpBody> {
	let mut resp = Response::new(full(body));
	*resp.status_mut() = status;
	resp.headers_mut()
		.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
	resp
}

fn json(status: StatusCode, value: serde_json::Value) -> Response<HttpBody> {
	let mut resp = Response::new(full(value.to_string()));
	*resp.status_mut() = status;
	resp.headers_mut()
		.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
	resp
}
