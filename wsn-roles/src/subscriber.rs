use bytes::Bytes;

use wsn_hal::{Clock, Millis, Radio, Timer, TimerHandle};
use wsn_proto::{Addr, PacketAttrs, SubId};
use wsn_pubsub::{Pubsub, PubsubEvent, Subscription};

/// A node that subscribes to readings from elsewhere on the mesh, matching
/// `subscriber.c`.
pub struct Subscriber<R, Clk, T> {
	pubsub: Pubsub<R, Clk, T>,
	timer: T,
	resend_interval: Millis,
	/// One resubscribe timer per outstanding subid, matching
	/// `resubscribe[PUBSUB_MAX_SUBSCRIPTIONS]`.
	resubscribe_handle: Vec<(SubId, TimerHandle)>,
}

impl<R: Radio, Clk: Clock + Clone, T: Timer> Subscriber<R, Clk, T> {
	/// `resend_interval` is how often an outstanding subscription is
	/// resent, matching `PUBSUB_RESEND_INTERVAL`.
	pub fn open(pubsub: Pubsub<R, Clk, T>, timer: T, resend_interval: Millis) -> Self {
		Subscriber { pubsub, timer, resend_interval, resubscribe_handle: Vec::new() }
	}

	pub fn pubsub(&self) -> &Pubsub<R, Clk, T> {
		&self.pubsub
	}

	pub fn pubsub_mut(&mut self) -> &mut Pubsub<R, Clk, T> {
		&mut self.pubsub
	}

	/// Entry point for a frame arriving on the pub/sub channel. Returns
	/// every reading that arrived addressed to this node, in arrival order.
	pub fn on_pubsub_incoming(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) -> Vec<(SubId, Bytes)> {
		self.pubsub.on_pubsub_incoming(attrs, from, payload);
		self.drain_events()
	}

	/// Entry point for a frame arriving on the peer channel.
	pub fn on_peer_incoming(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) -> Vec<(SubId, Bytes)> {
		self.pubsub.on_peer_incoming(attrs, from, payload);
		self.drain_events()
	}

	fn drain_events(&mut self) -> Vec<(SubId, Bytes)> {
		let my = self.pubsub.myid();
		let mut readings = Vec::new();
		for event in self.pubsub.drain_events() {
			if let PubsubEvent::OnData { sink, subid, data } = event {
				if Some(sink) == my {
					readings.push((subid, data));
				}
			}
		}
		readings
	}

	/// Subscribes to `record`, arming a timer to resend it periodically
	/// until [`Subscriber::unsubscribe`] is called.
	pub fn subscribe(&mut self, record: Subscription) -> Option<SubId> {
		let subid = self.pubsub.subscribe(record)?;
		let handle = self.timer.schedule(self.resend_interval);
		self.resubscribe_handle.push((subid, handle));
		Some(subid)
	}

	/// Ends `subid` and subscribes to `record` in its place.
	pub fn replace(&mut self, subid: SubId, record: Subscription) -> Option<SubId> {
		self.unsubscribe(subid);
		self.subscribe(record)
	}

	pub fn unsubscribe(&mut self, subid: SubId) {
		if let Some(pos) = self.resubscribe_handle.iter().position(|(id, _)| *id == subid) {
			let (_, handle) = self.resubscribe_handle.remove(pos);
			self.timer.cancel(handle);
		}
		self.pubsub.unsubscribe(subid);
	}

	pub fn subscription(&self, subid: SubId) -> Option<Subscription> {
		let sink = self.pubsub.myid()?;
		self.pubsub.subscription(sink, subid)
	}

	/// Call when the resend timer armed for `subid` fires.
	pub fn on_resubscribe_timer(&mut self, handle: TimerHandle) {
		let Some(&(subid, _)) = self.resubscribe_handle.iter().find(|(_, h)| *h == handle) else { return };
		self.pubsub.resubscribe(subid);
		if let Some(entry) = self.resubscribe_handle.iter_mut().find(|(id, _)| *id == subid) {
			entry.1 = self.timer.schedule(self.resend_interval);
		}
	}

	pub fn close(&mut self) {
		for (_, handle) in self.resubscribe_handle.drain(..) {
			self.timer.cancel(handle);
		}
		self.pubsub.close();
	}

	/// Call when a timer this node's `Pubsub`/`Subnet` armed fires (its
	/// `ADisclose` ack timeout). Returns whatever readings that retry
	/// produced, same as `on_pubsub_incoming`/`on_peer_incoming`.
	pub fn on_subnet_timer(&mut self, handle: TimerHandle) -> Vec<(SubId, Bytes)> {
		if !self.pubsub.on_timer(handle) {
			return Vec::new();
		}
		self.drain_events()
	}
}
