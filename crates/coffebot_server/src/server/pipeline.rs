#![forbid(unsafe_code)]

use coffebot_domain::ChatEvent;
use coffebot_platform::ChatEventSink;
use coffebot_platform::kick::CommandReactor;

use crate::server::event_hub::EventHub;

/// Shared tail of both ingestion paths: react, then publish.
#[derive(Clone)]
pub struct EventPipeline {
	hub: EventHub,
	reactor: Option<CommandReactor>,
}

impl EventPipeline {
	pub fn new(hub: EventHub, reactor: Option<CommandReactor>) -> Self {
		Self { hub, reactor }
	}

	pub fn hub(&self) -> &EventHub {
		&self.hub
	}
}

impl ChatEventSink for EventPipeline {
	fn dispatch(&self, event: ChatEvent) {
		if let Some(reactor) = &self.reactor {
			reactor.on_event(&event);
		}
		self.hub.publish(event);
	}
}
