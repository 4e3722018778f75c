#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use coffebot_domain::{ChatEvent, SubscriptionId};
use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

/// Fans every published chat event out to all live subscribers.
///
/// Queues are unbounded: a subscriber that never reads grows without limit.
/// Publishing never waits on a consumer.
#[derive(Debug, Clone, Default)]
pub struct EventHub {
	inner: Arc<RwLock<HashMap<SubscriptionId, mpsc::UnboundedSender<Arc<ChatEvent>>>>>,
}

/// Receiving half of a subscription. Ends once the subscription is removed
/// and everything already queued has been drained.
#[derive(Debug)]
pub struct EventStream {
	rx: mpsc::UnboundedReceiver<Arc<ChatEvent>>,
}

impl EventStream {
	pub async fn recv(&mut self) -> Option<Arc<ChatEvent>> {
		self.rx.recv().await
	}
}

impl Stream for EventStream {
	type Item = Arc<ChatEvent>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.rx.poll_recv(cx)
	}
}

/// Unsubscribes when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard {
	hub: EventHub,
	id: SubscriptionId,
}

impl SubscriptionGuard {
	pub fn id(&self) -> SubscriptionId {
		self.id
	}
}

impl Drop for SubscriptionGuard {
	fn drop(&mut self) {
		self.hub.unsubscribe(self.id);
	}
}

impl EventHub {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn subscribe(&self) -> (SubscriptionId, EventStream) {
		let (tx, rx) = mpsc::unbounded_channel();
		let id = SubscriptionId::new_v4();

		let mut subs = self.inner.write();
		subs.insert(id, tx);
		debug!(subscription = %id, subs = subs.len(), "event hub: subscribed");
		metrics::gauge!("coffebot_hub_subscribers").set(subs.len() as f64);

		(id, EventStream { rx })
	}

	/// Subscribe and tie the subscription's lifetime to the returned guard.
	pub fn subscribe_guarded(&self) -> (SubscriptionGuard, EventStream) {
		let (id, stream) = self.subscribe();
		(SubscriptionGuard { hub: self.clone(), id }, stream)
	}

	/// Remove a subscription. Unknown ids are ignored.
	pub fn unsubscribe(&self, id: SubscriptionId) {
		let mut subs = self.inner.write();
		if subs.remove(&id).is_some() {
			debug!(subscription = %id, subs = subs.len(), "event hub: unsubscribed");
			metrics::gauge!("coffebot_hub_subscribers").set(subs.len() as f64);
		}
	}

	/// Deliver `event` to every subscriber registered when the call starts.
	pub fn publish(&self, event: ChatEvent) {
		let event = Arc::new(event);
		let mut closed = Vec::new();

		{
			let subs = self.inner.read();
			for (id, tx) in subs.iter() {
				if tx.send(Arc::clone(&event)).is_err() {
					closed.push(*id);
				}
			}
		}

		metrics::counter!("coffebot_hub_published_total").increment(1);

		if !closed.is_empty() {
			let mut subs = self.inner.write();
			for id in closed {
				if subs.get(&id).is_some_and(|tx| tx.is_closed()) {
					subs.remove(&id);
					debug!(subscription = %id, "event hub: pruned closed subscriber");
				}
			}
			metrics::gauge!("coffebot_hub_subscribers").set(subs.len() as f64);
		}
	}

	pub fn subscriber_count(&self) -> usize {
		self.inner.read().len()
	}
}
