use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};

use wsn_hal::{Clock, Millis};
use wsn_net::{Existance, SubnetCallbacks};
use wsn_proto::{Addr, SubId};

use crate::subscription::Subscription;

/// Forwarded to the role layer above storage, mirroring the `on_ondata`/
/// `on_subscription`/`on_unsubscription`/`on_errpub` hooks `pubsub.c` calls
/// on `state.u` after it has updated its own tables. `Store` only keeps
/// its own bookkeeping current; nothing here reacts to these events, which
/// is why they are queued rather than dispatched through another callback
/// trait — a publisher or subscriber role drains the queue after driving
/// `on_pubsub_incoming`/`on_peer_incoming` and decides what to do with each.
#[derive(Clone, Debug, PartialEq)]
pub enum PubsubEvent {
	/// A publish toward `sink` could not be delivered.
	Errpub { sink: Addr },
	/// Data addressed to `sink` passed through or terminated at this node.
	OnData { sink: Addr, subid: SubId, data: Bytes },
	/// `subid` at `sink` became (or remains) known, with the latest record.
	Subscription { sink: Addr, subid: SubId, record: Subscription },
	/// `subid` at `sink` was revoked; `record` is the subscription as it
	/// stood just before revocation.
	Unsubscription { sink: Addr, subid: SubId, record: Subscription },
}

/// Runtime tunables for a [`Store`], standing in for `PUBSUB_MAX_SUBSCRIPTIONS`
/// (`pubsub.h`) and the `SUBNET_MAX_SINKS`/`SUBNET_REVOKE_PERIOD` figures it
/// shares with `wsn-net`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
	pub max_sinks: usize,
	pub max_subscriptions: usize,
	pub revoke_period: Millis,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			max_sinks: 5,
			max_subscriptions: 8,
			revoke_period: 600_000,
		}
	}
}

#[derive(Clone, Debug)]
enum SlotState {
	Invalid,
	Known,
	Revoked(Millis),
}

#[derive(Clone, Debug)]
struct Slot {
	state: SlotState,
	record: Option<Subscription>,
}

impl Default for Slot {
	fn default() -> Self {
		Slot { state: SlotState::Invalid, record: None }
	}
}

struct SinkSlots {
	addr: Addr,
	maxsub: u8,
	subs: Vec<Slot>,
}

/// Subscription storage and existance lifecycle for every sink this node
/// has heard of, implementing `SubnetCallbacks` against its own tables
/// exactly as `pubsub.c` does against `sinks[SUBNET_MAX_SINKS]`.
///
/// Sink slots are keyed by stable [`Addr`] rather than the original's reused
/// integer sink id (see `wsn-net`'s `SubnetCallbacks`), and — unlike the
/// original's `on_sink_left`, which mutates a stack copy of the slot array
/// and so never actually resets `maxsub` — this resets the real entry, per
/// the corrected behaviour the spec describes.
pub struct Store<Clk> {
	clock: Clk,
	config: Config,
	sinks: Vec<SinkSlots>,
	events: VecDeque<PubsubEvent>,
}

impl<Clk: Clock> Store<Clk> {
	pub fn new(clock: Clk, config: Config) -> Self {
		Store { clock, config, sinks: Vec::new(), events: VecDeque::new() }
	}

	/// Drains every event queued since the last call, in arrival order.
	pub fn drain_events(&mut self) -> impl Iterator<Item = PubsubEvent> + '_ {
		self.events.drain(..)
	}

	fn find(&self, sink: Addr) -> Option<usize> {
		self.sinks.iter().position(|s| s.addr == sink)
	}

	fn find_or_insert(&mut self, sink: Addr) -> Option<usize> {
		if let Some(idx) = self.find(sink) {
			return Some(idx);
		}
		if self.sinks.len() >= self.config.max_sinks {
			tracing::warn!(%sink, "pubsub: max sinks limit hit");
			return None;
		}
		let mut subs = Vec::with_capacity(self.config.max_subscriptions);
		subs.resize_with(self.config.max_subscriptions, Slot::default);
		self.sinks.push(SinkSlots { addr: sink, maxsub: 0, subs });
		Some(self.sinks.len() - 1)
	}

	fn state(&self, slot: &Slot) -> Existance {
		match slot.state {
			SlotState::Invalid => Existance::Unknown,
			SlotState::Known => Existance::Known,
			SlotState::Revoked(at) => {
				if self.clock.now().saturating_sub(at) > self.config.revoke_period {
					Existance::Unknown
				} else {
					Existance::Revoked
				}
			}
		}
	}

	/// The stored record for `(sink, subid)`, if anything was ever received
	/// for it (regardless of current existance).
	pub fn find_subscription(&self, sink: Addr, subid: SubId) -> Option<&Subscription> {
		let idx = self.find(sink)?;
		self.sinks[idx].subs.get(subid.0 as usize)?.record.as_ref()
	}

	/// The highest subid known for `sink`, for callers that want the
	/// high-watermark without iterating (`last_subscription` in `pubsub.c`).
	pub fn last_subscription(&self, sink: Addr) -> Option<u8> {
		Some(self.sinks[self.find(sink)?].maxsub)
	}

	/// Advances a restartable cursor to the next `(sink, subid)` whose
	/// subscription is currently `KNOWN`, matching `pubsub_next_subscription`'s
	/// walk through `subs[0..maxsub]` then on to the next sink.
	pub fn next_subscription(&self, cursor: Option<(usize, u8)>) -> Option<(Addr, SubId)> {
		let mut sink_idx = cursor.map(|(s, _)| s).unwrap_or(0);
		let mut subid = cursor.map(|(_, id)| id as u16 + 1).unwrap_or(0);

		while sink_idx < self.sinks.len() {
			let sink = &self.sinks[sink_idx];
			if subid as u8 > sink.maxsub || subid as usize >= sink.subs.len() {
				sink_idx += 1;
				subid = 0;
				continue;
			}
			let slot = &sink.subs[subid as usize];
			if matches!(self.state(slot), Existance::Known) {
				return Some((sink.addr, SubId(subid as u8)));
			}
			subid += 1;
		}
		None
	}

	/// Index form of [`Store::next_subscription`], for callers driving the
	/// cursor by `(sink_idx, subid)` pairs rather than re-resolving an
	/// `Addr` to an index on every step.
	pub fn sink_index(&self, sink: Addr) -> Option<usize> {
		self.find(sink)
	}
}

impl<Clk: Clock> SubnetCallbacks for Store<Clk> {
	fn errpub(&mut self, sink: Addr) {
		tracing::warn!(%sink, "pubsub: publish could not be delivered");
		self.events.push_back(PubsubEvent::Errpub { sink });
	}

	fn ondata(&mut self, sink: Addr, subid: SubId, data: Bytes) {
		// storage has nothing of its own to do here; queued for the role
		// layer above, which decides whether to surface it, forward it, or
		// fold it into an aggregate.
		self.events.push_back(PubsubEvent::OnData { sink, subid, data });
	}

	fn subscribe(&mut self, sink: Addr, subid: SubId, mut data: Bytes) {
		let Some(idx) = self.find_or_insert(sink) else { return };
		let record = match Subscription::deserialize_from(&mut data) {
			Ok(record) => record,
			Err(error) => {
				tracing::warn!(%sink, %subid, %error, "pubsub: malformed subscription record");
				return;
			}
		};
		let Some(slot) = self.sinks[idx].subs.get_mut(subid.0 as usize) else {
			tracing::warn!(%sink, %subid, "pubsub: subid out of range");
			return;
		};
		slot.state = SlotState::Known;
		slot.record = Some(record);
		if subid.0 > self.sinks[idx].maxsub {
			self.sinks[idx].maxsub = subid.0;
		}
		self.events.push_back(PubsubEvent::Subscription { sink, subid, record });
	}

	fn unsubscribe(&mut self, sink: Addr, subid: SubId) {
		let Some(idx) = self.find(sink) else { return };
		let now = self.clock.now();
		let Some(slot) = self.sinks[idx].subs.get_mut(subid.0 as usize) else { return };
		if matches!(slot.state, SlotState::Known) {
			slot.state = SlotState::Revoked(now);
			if self.sinks[idx].maxsub == subid.0 {
				self.sinks[idx].maxsub = subid.0.saturating_sub(1);
			}
			if let Some(record) = slot.record {
				self.events.push_back(PubsubEvent::Unsubscription { sink, subid, record });
			}
		}
	}

	fn exists(&self, sink: Addr, subid: SubId) -> Existance {
		let Some(idx) = self.find(sink) else { return Existance::Unknown };
		match self.sinks[idx].subs.get(subid.0 as usize) {
			Some(slot) => self.state(slot),
			None => Existance::Unknown,
		}
	}

	fn inform(&self, sink: Addr, subid: SubId, space: usize) -> Bytes {
		let Some(record) = self.find_subscription(sink, subid) else { return Bytes::new() };
		let mut buf = BytesMut::with_capacity(space.min(64));
		match record.serialize_into(&mut buf) {
			Ok(()) if buf.len() <= space => buf.freeze(),
			_ => Bytes::new(),
		}
	}

	fn sink_left(&mut self, sink: Addr) {
		let Some(idx) = self.find(sink) else { return };
		let now = self.clock.now();
		let slots = &mut self.sinks[idx];
		for slot in slots.subs.iter_mut() {
			if matches!(slot.state, SlotState::Known) {
				slot.state = SlotState::Revoked(now);
			}
		}
		slots.maxsub = 0;
	}
}
