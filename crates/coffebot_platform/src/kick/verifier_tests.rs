#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use http::{HeaderMap, HeaderValue};
use proptest::prelude::*;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::verifier::{
	BoxFuture, EVENT_MESSAGE_ID_HEADER, EVENT_SIGNATURE_HEADER, EVENT_TIMESTAMP_HEADER, HMAC_SIGNATURE_HEADER,
	PublicKeyLoader, WebhookVerifier, parse_public_key, rsa_signing_input, sign_hmac_hex, verify_hmac_hex,
};
use crate::SecretString;

const BODY: &[u8] = br#"{"content":"hi","sender":{"username":"bob"}}"#;

fn hmac_headers(sig: &str) -> HeaderMap {
	let mut headers = HeaderMap::new();
	headers.insert(HMAC_SIGNATURE_HEADER, HeaderValue::from_str(sig).unwrap());
	headers
}

fn test_keypair() -> (RsaPrivateKey, String) {
	let private = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("generate key");
	let pem = RsaPublicKey::from(&private)
		.to_public_key_pem(LineEnding::LF)
		.expect("encode public key");
	(private, pem)
}

fn rsa_headers(private: &RsaPrivateKey, id: &str, ts: &str, body: &[u8]) -> HeaderMap {
	let hash = Sha256::digest(rsa_signing_input(id, ts, body));
	let sig = private.sign(Pkcs1v15Sign::new::<Sha256>(), &hash).expect("sign");
	let mut headers = HeaderMap::new();
	headers.insert(EVENT_MESSAGE_ID_HEADER, HeaderValue::from_str(id).unwrap());
	headers.insert(EVENT_TIMESTAMP_HEADER, HeaderValue::from_str(ts).unwrap());
	headers.insert(
		EVENT_SIGNATURE_HEADER,
		HeaderValue::from_str(&BASE64_STANDARD.encode(sig)).unwrap(),
	);
	headers
}

fn counting_loader(pem: Option<String>, calls: Arc<AtomicUsize>) -> PublicKeyLoader {
	Arc::new(move || {
		let pem = pem.clone();
		let calls = Arc::clone(&calls);
		Box::pin(async move {
			calls.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(Duration::from_millis(20)).await;
			pem.ok_or_else(|| anyhow::anyhow!("kick get public key failed: status=503"))
		}) as BoxFuture<'static, anyhow::Result<String>>
	})
}

#[tokio::test]
async fn hmac_accepts_valid_signature() {
	let verifier = WebhookVerifier::hmac(Some(SecretString::new("s3cret")));
	let sig = sign_hmac_hex(b"s3cret", BODY);
	assert!(verifier.verify(&hmac_headers(&sig), BODY).await);
	assert!(verifier.verify(&hmac_headers(&format!("sha256={sig}")), BODY).await);
}

#[tokio::test]
async fn hmac_rejects_missing_header_bad_hex_and_missing_secret() {
	let verifier = WebhookVerifier::hmac(Some(SecretString::new("s3cret")));
	assert!(!verifier.verify(&HeaderMap::new(), BODY).await);
	assert!(!verifier.verify(&hmac_headers("zz-not-hex"), BODY).await);

	let sig = sign_hmac_hex(b"s3cret", BODY);
	assert!(!WebhookVerifier::hmac(None).verify(&hmac_headers(&sig), BODY).await);
	assert!(
		!WebhookVerifier::hmac(Some(SecretString::new("")))
			.verify(&hmac_headers(&sig), BODY)
			.await
	);
}

proptest! {
	#[test]
	fn hmac_single_bit_flip_in_body_fails(body in proptest::collection::vec(any::<u8>(), 1..256), bit in 0usize..2048) {
		let sig = sign_hmac_hex(b"key", &body);
		prop_assert!(verify_hmac_hex(b"key", &body, &sig));

		let mut flipped = body.clone();
		let idx = bit % (flipped.len() * 8);
		flipped[idx / 8] ^= 1 << (idx % 8);
		prop_assert!(!verify_hmac_hex(b"key", &flipped, &sig));
	}

	#[test]
	fn hmac_single_bit_flip_in_signature_fails(body in proptest::collection::vec(any::<u8>(), 0..256), bit in 0usize..256) {
		let sig = sign_hmac_hex(b"key", &body);
		let mut raw = hex::decode(&sig).unwrap();
		raw[bit / 8] ^= 1 << (bit % 8);
		prop_assert!(!verify_hmac_hex(b"key", &body, &hex::encode(raw)));
	}
}

#[tokio::test]
async fn rsa_accepts_signature_from_matching_key() {
	let (private, pem) = test_keypair();
	let calls = Arc::new(AtomicUsize::new(0));
	let verifier = WebhookVerifier::rsa(counting_loader(Some(pem), Arc::clone(&calls)));

	let headers = rsa_headers(&private, "msg-1", "2024-01-01T00:00:00Z", BODY);
	assert!(verifier.verify(&headers, BODY).await);
	assert!(!verifier.verify(&headers, b"tampered").await);

	let mut missing = headers.clone();
	missing.remove(EVENT_TIMESTAMP_HEADER);
	assert!(!verifier.verify(&missing, BODY).await);

	let mut garbled = headers.clone();
	garbled.insert(EVENT_SIGNATURE_HEADER, HeaderValue::from_static("***"));
	assert!(!verifier.verify(&garbled, BODY).await);

	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_first_verifies_share_one_key_load() {
	let (private, pem) = test_keypair();
	let calls = Arc::new(AtomicUsize::new(0));
	let verifier = Arc::new(WebhookVerifier::rsa(counting_loader(Some(pem), Arc::clone(&calls))));
	let headers = rsa_headers(&private, "msg-2", "1700000000", BODY);

	let mut tasks = Vec::new();
	for _ in 0..8 {
		let verifier = Arc::clone(&verifier);
		let headers = headers.clone();
		tasks.push(tokio::spawn(async move { verifier.verify(&headers, BODY).await }));
	}
	for t in tasks {
		assert!(t.await.unwrap());
	}
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_key_load_is_cached_and_fails_closed() {
	let (private, _pem) = test_keypair();
	let calls = Arc::new(AtomicUsize::new(0));
	let verifier = WebhookVerifier::rsa(counting_loader(None, Arc::clone(&calls)));
	let headers = rsa_headers(&private, "msg-3", "1700000000", BODY);

	assert!(!verifier.verify(&headers, BODY).await);
	assert!(!verifier.verify(&headers, BODY).await);
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn parse_public_key_accepts_spki_and_pkcs1() {
	use rsa::pkcs1::EncodeRsaPublicKey;

	let (private, spki) = test_keypair();
	assert!(parse_public_key(&spki).is_ok());

	let pkcs1 = RsaPublicKey::from(&private).to_pkcs1_pem(LineEnding::LF).unwrap();
	assert!(parse_public_key(&pkcs1).is_ok());

	assert!(parse_public_key("-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----").is_err());
}
