use bytes::{Bytes, BytesMut};

use wsn_hal::{Clock, Radio, Timer, TimerHandle};
use wsn_net::Subnet;
use wsn_proto::{Addr, PacketAttrs, SubId};

use crate::store::{Config as StoreConfig, PubsubEvent, Store};
use crate::subscription::Subscription;

/// Ties [`Store`]'s subscription tables to a [`Subnet`], exposing the
/// `pubsub.c` operations (`pubsub_subscribe`, `pubsub_publish`,
/// `extract_data`, ...) directly against typed [`Subscription`] records
/// instead of raw bytes.
pub struct Pubsub<R, Clk, T> {
	subnet: Subnet<R, Clk, Store<Clk>, T>,
}

impl<R: Radio, Clk: Clock + Clone, T: Timer> Pubsub<R, Clk, T> {
	/// `timer` is used exclusively for `Subnet`'s internal `ADisclose` ack
	/// timeout, distinct from whatever timer a `Publisher`/`Subscriber`
	/// built on top of this schedules its own collect/resend timers with.
	pub fn open(radio: R, clock: Clk, config: wsn_net::Config, store_config: StoreConfig, timer: T) -> Self {
		let store = Store::new(clock.clone(), store_config);
		Pubsub { subnet: Subnet::open(radio, clock, store, config, timer) }
	}

	/// Call when a timer this `Pubsub`'s `Subnet` armed fires. Returns
	/// `false` without effect for a handle it doesn't recognise.
	pub fn on_timer(&mut self, handle: TimerHandle) -> bool {
		self.subnet.on_timer(handle)
	}

	pub fn local_addr(&self) -> Addr {
		self.subnet.local_addr()
	}

	pub fn myid(&self) -> Option<Addr> {
		self.subnet.myid()
	}

	pub fn close(&mut self) {
		self.subnet.close();
	}

	/// Entry point for a frame arriving on the pub/sub channel.
	pub fn on_pubsub_incoming(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) {
		self.subnet.on_pubsub_incoming(attrs, from, payload);
	}

	/// Entry point for a frame arriving on the peer channel.
	pub fn on_peer_incoming(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) {
		self.subnet.on_peer_incoming(attrs, from, payload);
	}

	pub fn subscribe(&mut self, record: Subscription) -> Option<SubId> {
		let mut buf = BytesMut::new();
		if record.serialize_into(&mut buf).is_err() {
			tracing::warn!("pubsub: subscription record too large to encode");
			return None;
		}
		Some(self.subnet.subscribe(&buf.freeze()))
	}

	/// Re-sends the subscription previously assigned `subid`, reading its
	/// record back out of local storage the way `pubsub_resubscribe` does.
	pub fn resubscribe(&mut self, subid: SubId) {
		let Some(local) = self.myid() else {
			tracing::warn!(%subid, "pubsub: resubscribe with no local sink id yet");
			return;
		};
		let Some(record) = self.subnet.callbacks().find_subscription(local, subid).copied() else {
			tracing::warn!(%subid, "pubsub: resubscribe for unknown subscription");
			return;
		};
		let mut buf = BytesMut::new();
		if record.serialize_into(&mut buf).is_err() {
			return;
		}
		self.subnet.resubscribe(subid, &buf.freeze());
	}

	pub fn unsubscribe(&mut self, subid: SubId) {
		self.subnet.unsubscribe(subid);
	}

	pub fn add_data(&mut self, sink: Addr, subid: SubId, payload: &[u8]) -> bool {
		self.subnet.add_data(sink, subid, payload)
	}

	pub fn publish(&mut self, sink: Addr) {
		self.subnet.publish(sink);
	}

	pub fn writeout(&mut self, sink: Addr) {
		self.subnet.writeout(sink);
	}

	pub fn writein(&mut self) {
		self.subnet.writein();
	}

	pub fn buffered_len(&self, sink: Addr) -> Option<usize> {
		self.subnet.packetlen(sink)
	}

	pub fn last_subscription(&self, sink: Addr) -> Option<u8> {
		self.subnet.callbacks().last_subscription(sink)
	}

	pub fn subscription(&self, sink: Addr, subid: SubId) -> Option<Subscription> {
		self.subnet.callbacks().find_subscription(sink, subid).copied()
	}

	/// Restartable iterator over every currently-`KNOWN` `(sink, subid)`
	/// pair, matching `pubsub_next_subscription`.
	pub fn next_subscription(&self, cursor: Option<(Addr, SubId)>) -> Option<(Addr, SubId)> {
		let cursor = cursor.and_then(|(sink, subid)| {
			let idx = self.subnet.callbacks().sink_index(sink)?;
			Some((idx, subid.0))
		});
		self.subnet.callbacks().next_subscription(cursor)
	}

	/// Pulls out every value for `subid` currently buffered for `sink`,
	/// matching `extract_data`: used by an aggregator to combine fragments
	/// before re-adding the result to the buffer.
	pub fn extract_data(&self, sink: Addr, subid: SubId) -> Vec<Bytes> {
		let Some(iter) = self.subnet.fragments(sink) else { return Vec::new() };
		iter.filter_map(|frag| frag.ok())
			.filter(|frag| frag.subid == subid && !frag.payload.is_empty())
			.map(|frag| frag.payload)
			.collect()
	}

	/// Drains every subscription/unsubscription/ondata/errpub event queued
	/// since the last call, in arrival order. A role (publisher, subscriber)
	/// calls this after every `on_pubsub_incoming`/`on_peer_incoming` to
	/// learn what storage just did.
	pub fn drain_events(&mut self) -> Vec<PubsubEvent> {
		self.subnet.callbacks_mut().drain_events().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::{Cell, RefCell};
	use std::rc::Rc;

	use wsn_hal::{Millis, RadioError, TxStatus};
	use wsn_proto::Channel;

	use crate::sensor::{Aggregator, Filter, Sensor};

	#[derive(Clone)]
	struct FakeClock(Rc<Cell<u64>>);
	impl Clock for FakeClock {
		fn now(&self) -> u64 {
			self.0.get()
		}
	}

	#[derive(Default)]
	struct FakeTimer {
		next: u64,
	}
	impl Timer for FakeTimer {
		fn schedule(&mut self, _delay: Millis) -> TimerHandle {
			let h = TimerHandle(self.next);
			self.next += 1;
			h
		}
		fn cancel(&mut self, _handle: TimerHandle) {}
	}

	struct LoopbackRadio {
		addr: Addr,
		sent: Rc<RefCell<Vec<(PacketAttrs, Bytes)>>>,
	}

	impl Radio for LoopbackRadio {
		fn local_addr(&self) -> Addr {
			self.addr
		}

		fn transmit(&mut self, attrs: &PacketAttrs, payload: Bytes) -> Result<TxStatus, RadioError> {
			self.sent.borrow_mut().push((*attrs, payload));
			Ok(TxStatus::Delivered)
		}
	}

	fn sub() -> Subscription {
		Subscription {
			interval: 2_000,
			soft: Filter::None,
			hard: Filter::None,
			aggregator: Aggregator::LocationAvg { max_dist: 1.0 },
			sensor: Sensor::Location,
		}
	}

	#[test]
	fn subscribe_and_self_deliver_round_trips_the_record() {
		let sent = Rc::new(RefCell::new(Vec::new()));
		let mut node = Pubsub::open(
			LoopbackRadio { addr: Addr::new(1, 0), sent: sent.clone() },
			FakeClock(Rc::new(Cell::new(0))),
			wsn_net::Config::default(),
			StoreConfig::default(),
			FakeTimer::default(),
		);

		let subid = node.subscribe(sub()).unwrap();
		assert_eq!(node.myid(), Some(node.local_addr()));

		let (attrs, payload) = sent.borrow()[0].clone();
		assert_eq!(attrs.channel, Channel::PubSub);
		node.on_pubsub_incoming(&attrs, Addr::new(9, 9), payload);

		assert_eq!(node.subscription(node.local_addr(), subid), Some(sub()));
	}

	#[test]
	fn extract_data_filters_by_subid_and_skips_empty_fragments() {
		let sent = Rc::new(RefCell::new(Vec::new()));
		let mut node = Pubsub::open(
			LoopbackRadio { addr: Addr::new(1, 0), sent },
			FakeClock(Rc::new(Cell::new(0))),
			wsn_net::Config::default(),
			StoreConfig::default(),
			FakeTimer::default(),
		);

		let sink = Addr::new(1, 0);
		let _ = node.subscribe(sub());

		node.add_data(sink, SubId(0), b"aa");
		node.add_data(sink, SubId(1), b"bb");
		node.add_data(sink, SubId(0), b"cc");

		let got = node.extract_data(sink, SubId(0));
		assert_eq!(got, vec![Bytes::from_static(b"aa"), Bytes::from_static(b"cc")]);
	}
}
