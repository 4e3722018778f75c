#![forbid(unsafe_code)]

use std::time::Duration;

use coffebot_domain::{ChatEvent, SubscriptionId};
use futures::StreamExt;
use tokio::time::timeout;

use crate::server::event_hub::EventHub;

fn event(content: &str) -> ChatEvent {
	ChatEvent::new("bob", content, std::time::SystemTime::UNIX_EPOCH.into())
}

#[tokio::test]
async fn publish_reaches_every_subscriber_in_order() {
	let hub = EventHub::new();
	let (_a, mut rx_a) = hub.subscribe();
	let (_b, mut rx_b) = hub.subscribe();

	for i in 0..5 {
		hub.publish(event(&format!("m{i}")));
	}

	for rx in [&mut rx_a, &mut rx_b] {
		for i in 0..5 {
			let ev = timeout(Duration::from_millis(250), rx.recv())
				.await
				.expect("within timeout")
				.expect("open");
			assert_eq!(ev.content, format!("m{i}"));
		}
	}
}

#[tokio::test]
async fn late_subscriber_misses_earlier_events() {
	let hub = EventHub::new();
	hub.publish(event("before"));

	let (_id, mut rx) = hub.subscribe();
	hub.publish(event("after"));

	let ev = rx.recv().await.expect("open");
	assert_eq!(ev.content, "after");
}

#[tokio::test]
async fn unsubscribe_is_idempotent_and_isolated() {
	let hub = EventHub::new();
	let (a, mut rx_a) = hub.subscribe();
	let (_b, mut rx_b) = hub.subscribe();
	assert_eq!(hub.subscriber_count(), 2);

	hub.publish(event("queued"));
	hub.unsubscribe(a);
	hub.unsubscribe(a);
	hub.unsubscribe(SubscriptionId::new_v4());
	assert_eq!(hub.subscriber_count(), 1);

	hub.publish(event("later"));

	assert_eq!(rx_a.recv().await.expect("drains queued").content, "queued");
	assert!(rx_a.recv().await.is_none(), "stream ends after unsubscribe");

	assert_eq!(rx_b.recv().await.unwrap().content, "queued");
	assert_eq!(rx_b.recv().await.unwrap().content, "later");
}

#[tokio::test]
async fn dropped_receivers_are_pruned_on_publish() {
	let hub = EventHub::new();
	{
		let (_id, _rx) = hub.subscribe();
	}
	let (_id, mut rx) = hub.subscribe();
	assert_eq!(hub.subscriber_count(), 2);

	hub.publish(event("x"));
	assert_eq!(hub.subscriber_count(), 1);
	assert_eq!(rx.next().await.unwrap().content, "x");
}

#[tokio::test]
async fn guard_unsubscribes_on_drop() {
	let hub = EventHub::new();
	let (guard, _rx) = hub.subscribe_guarded();
	assert_eq!(hub.subscriber_count(), 1);
	drop(guard);
	assert_eq!(hub.subscriber_count(), 0);
}
