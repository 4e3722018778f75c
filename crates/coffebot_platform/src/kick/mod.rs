#![forbid(unsafe_code)]

mod client;
mod listener;
mod normalize;
mod reactor;
mod verifier;

pub use client::{CHAT_MESSAGE_SENT_EVENT, KickClient};
pub use listener::{Backoff, ChatListener, ListenerConfig, ListenerState, WsConnector, WsRequest, WsStream};
pub use normalize::{InboundPayload, NormalizeError, SocketFrame, WebhookChatMessage, decode, normalize, normalize_at};
pub use reactor::{CommandReactor, ReactorConfig};
pub use verifier::{
	EVENT_MESSAGE_ID_HEADER, EVENT_SIGNATURE_HEADER, EVENT_TIMESTAMP_HEADER, EVENT_TYPE_HEADER, HMAC_SIGNATURE_HEADER, KeyError,
	PublicKeyLoader, PublicKeySource, WebhookVerifier, parse_public_key, rsa_signing_input, sign_hmac_hex, verify_hmac_hex,
	verify_rsa_signature,
};




#[cfg(test)]
mod verifier_tests;
