#![forbid(unsafe_code)]

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::client::KickClient;
use crate::SecretString;

pub const HMAC_SIGNATURE_HEADER: &str = "X-Kick-Signature";
pub const EVENT_SIGNATURE_HEADER: &str = "Kick-Event-Signature";
pub const EVENT_MESSAGE_ID_HEADER: &str = "Kick-Event-Message-Id";
pub const EVENT_TIMESTAMP_HEADER: &str = "Kick-Event-Message-Timestamp";
pub const EVENT_TYPE_HEADER: &str = "Kick-Event-Type";

type HmacSha256 = Hmac<Sha256>;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces the PEM text of the webhook signing key.
pub type PublicKeyLoader = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync>;

/// Where the RSA scheme gets its public key from.
#[derive(Debug, Clone)]
pub enum PublicKeySource {
	/// Fetched once over HTTP.
	Fetch { url: String },
	/// Read once from a local PEM file.
	File(PathBuf),
	/// Inline PEM text.
	Pem(String),
}

#[derive(Debug, Error)]
pub enum KeyError {
	#[error("public key unavailable: {0}")]
	Load(String),
	#[error("public key is not valid PEM (SPKI or PKCS#1): {0}")]
	Parse(String),
}

enum Scheme {
	Hmac {
		secret: Option<SecretString>,
	},
	Rsa {
		loader: PublicKeyLoader,
		key: OnceCell<Option<Arc<RsaPublicKey>>>,
	},
}

/// Authenticates inbound webhook deliveries.
///
/// Exactly one scheme is active per instance. `verify` never errors: every
/// failure (missing header, bad encoding, absent key material, bad signature)
/// is reported as `false`.
pub struct WebhookVerifier {
	scheme: Scheme,
}

impl WebhookVerifier {
	/// HMAC-SHA256 over the raw body, hex-encoded in `X-Kick-Signature`.
	pub fn hmac(secret: Option<SecretString>) -> Self {
		Self {
			scheme: Scheme::Hmac { secret },
		}
	}

	/// RSA PKCS#1 v1.5 / SHA-256 with a lazily loaded key.
	pub fn rsa(loader: PublicKeyLoader) -> Self {
		Self {
			scheme: Scheme::Rsa {
				loader,
				key: OnceCell::new(),
			},
		}
	}

	pub fn rsa_from_source(source: PublicKeySource, client: KickClient) -> Self {
		let loader: PublicKeyLoader = match source {
			PublicKeySource::Fetch { url } => Arc::new(move || {
				let client = client.clone();
				let url = url.clone();
				Box::pin(async move { client.fetch_public_key_pem(&url).await }) as BoxFuture<'static, anyhow::Result<String>>
			}),
			PublicKeySource::File(path) => Arc::new(move || {
				let path = path.clone();
				Box::pin(async move {
					tokio::fs::read_to_string(&path)
						.await
						.map_err(|e| anyhow::anyhow!("read {}: {e}", path.display()))
				}) as BoxFuture<'static, anyhow::Result<String>>
			}),
			PublicKeySource::Pem(pem) => Arc::new(move || {
				let pem = pem.clone();
				Box::pin(async move { Ok(pem) }) as BoxFuture<'static, anyhow::Result<String>>
			}),
		};
		Self::rsa(loader)
	}

	pub fn scheme_name(&self) -> &'static str {
		match self.scheme {
			Scheme::Hmac { .. } => "hmac",
			Scheme::Rsa { .. } => "rsa",
		}
	}

	pub async fn verify(&self, headers: &HeaderMap, body: &[u8]) -> bool {
		let ok = match &self.scheme {
			Scheme::Hmac { secret } => {
				let Some(secret) = secret.as_ref().filter(|s| !s.is_blank()) else {
					warn!("webhook hmac verification requested but no secret is configured");
					metrics::counter!("coffebot_webhook_signature_unconfigured_total").increment(1);
					return false;
				};
				let Some(signature) = header_str(headers, HMAC_SIGNATURE_HEADER) else {
					metrics::counter!("coffebot_webhook_signature_missing_total").increment(1);
					return false;
				};
				verify_hmac_hex(secret.expose().as_bytes(), body, signature)
			}
			Scheme::Rsa { loader, key } => {
				let (Some(message_id), Some(timestamp), Some(signature)) = (
					header_str(headers, EVENT_MESSAGE_ID_HEADER),
					header_str(headers, EVENT_TIMESTAMP_HEADER),
					header_str(headers, EVENT_SIGNATURE_HEADER),
				) else {
					metrics::counter!("coffebot_webhook_signature_missing_total").increment(1);
					return false;
				};

				let Some(public_key) = cached_public_key(loader, key).await else {
					metrics::counter!("coffebot_webhook_signature_unconfigured_total").increment(1);
					return false;
				};

				verify_rsa_signature(&public_key, message_id, timestamp, body, signature)
			}
		};

		if !ok {
			metrics::counter!("coffebot_webhook_signature_invalid_total").increment(1);
		}
		ok
	}
}

/// Load the key at most once; concurrent first callers share the same attempt
/// and a failed attempt stays cached.
async fn cached_public_key(
	loader: &PublicKeyLoader,
	cell: &OnceCell<Option<Arc<RsaPublicKey>>>,
) -> Option<Arc<RsaPublicKey>> {
	cell.get_or_init(|| async {
		metrics::counter!("coffebot_webhook_public_key_loads_total").increment(1);
		let loaded = match loader().await {
			Ok(pem) => parse_public_key(&pem),
			Err(err) => Err(KeyError::Load(format!("{err:#}"))),
		};
		match loaded {
			Ok(key) => {
				info!("webhook public key loaded");
				Some(Arc::new(key))
			}
			Err(err) => {
				warn!(error = %err, "webhook public key load failed; signatures will be rejected");
				None
			}
		}
	})
	.await
	.clone()
}

pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, KeyError> {
	let pem = pem.trim();
	match RsaPublicKey::from_public_key_pem(pem) {
		Ok(key) => Ok(key),
		Err(spki_err) => {
			debug!(error = %spki_err, "public key is not SPKI; trying PKCS#1");
			RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| KeyError::Parse(e.to_string()))
		}
	}
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
		.filter(|v| !v.is_empty())
}

/// Hex HMAC-SHA256 of `body`.
pub fn sign_hmac_hex(secret: &[u8], body: &[u8]) -> String {
	let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
		return String::new();
	};
	mac.update(body);
	hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature (optionally `sha256=` prefixed).
pub fn verify_hmac_hex(secret: &[u8], body: &[u8], signature: &str) -> bool {
	if secret.is_empty() {
		return false;
	}
	let sig_hex = signature.strip_prefix("sha256=").unwrap_or(signature);
	let Ok(provided) = hex::decode(sig_hex) else {
		return false;
	};
	let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
		return false;
	};
	mac.update(body);
	mac.verify_slice(&provided).is_ok()
}

/// Signing input is `message_id.timestamp.body`.
pub fn rsa_signing_input(message_id: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
	let mut signed = Vec::with_capacity(message_id.len() + timestamp.len() + body.len() + 2);
	signed.extend_from_slice(message_id.as_bytes());
	signed.push(b'.');
	signed.extend_from_slice(timestamp.as_bytes());
	signed.push(b'.');
	signed.extend_from_slice(body);
	signed
}

pub fn verify_rsa_signature(
	public_key: &RsaPublicKey,
	message_id: &str,
	timestamp: &str,
	body: &[u8],
	signature_b64: &str,
) -> bool {
	let Ok(signature) = BASE64_STANDARD.decode(signature_b64) else {
		return false;
	};
	let hash = Sha256::digest(rsa_signing_input(message_id, timestamp, body));
	public_key
		.verify(rsa::pkcs1v15::Pkcs1v15Sign::new::<Sha256>(), &hash, &signature)
		.is_ok()
}
