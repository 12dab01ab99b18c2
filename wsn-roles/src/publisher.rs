use bytes::{Bytes, BytesMut};

use wsn_hal::{Clock, Millis, Radio, Timer, TimerHandle};
use wsn_proto::{Addr, PacketAttrs, SubId};
use wsn_pubsub::{Aggregator, Filter, Location, Pubsub, PubsubEvent, Reading, Sensor};

const SENSORS: usize = 3;
const ALL_SENSORS: [Sensor; SENSORS] = [Sensor::Location, Sensor::Humidity, Sensor::Pressure];

fn sensor_idx(s: Sensor) -> usize {
	match s {
		Sensor::Location => 0,
		Sensor::Humidity => 1,
		Sensor::Pressure => 2,
	}
}

/// A node that produces readings, matching `publisher.c`.
///
/// Every subscription carries its own soft/hard filter and aggregator
/// (`wsn_pubsub::Subscription`), so unlike the original this doesn't take a
/// filter-proxy pair at startup — there's no project-wide filter vocabulary
/// to plug in, since it's already concrete per `wsn-pubsub`.
pub struct Publisher<R, Clk, T> {
	pubsub: Pubsub<R, Clk, T>,
	timer: T,
	agg_interval: Millis,
	sensor_size: [Option<usize>; SENSORS],
	collect_handle: [Option<TimerHandle>; SENSORS],
	collect_interval: [Millis; SENSORS],
	needs: [bool; SENSORS],
	numneeds: usize,
	/// One pending debounce timer per sink with unflushed data, matching
	/// `aggregate[SUBNET_MAX_SINKS]`. A linear scan is fine at this size.
	aggregate_handle: Vec<(Addr, TimerHandle)>,
}

impl<R: Radio, Clk: Clock + Clone, T: Timer> Publisher<R, Clk, T> {
	/// `agg_interval` is the debounce window: after data lands in a sink's
	/// buffer, publish waits this long for more to arrive before flushing.
	pub fn open(pubsub: Pubsub<R, Clk, T>, timer: T, agg_interval: Millis) -> Self {
		Publisher {
			pubsub,
			timer,
			agg_interval,
			sensor_size: [None; SENSORS],
			collect_handle: [None; SENSORS],
			collect_interval: [Millis::MAX; SENSORS],
			needs: [false; SENSORS],
			numneeds: 0,
			aggregate_handle: Vec::new(),
		}
	}

	pub fn pubsub(&self) -> &Pubsub<R, Clk, T> {
		&self.pubsub
	}

	pub fn pubsub_mut(&mut self) -> &mut Pubsub<R, Clk, T> {
		&mut self.pubsub
	}

	/// Declares that this node can produce readings of `sensor`.
	pub fn has(&mut self, sensor: Sensor, size: usize) {
		self.sensor_size[sensor_idx(sensor)] = Some(size);
	}

	pub fn in_need(&self) -> bool {
		self.numneeds > 0
	}

	pub fn needs(&self, sensor: Sensor) -> bool {
		self.needs[sensor_idx(sensor)]
	}

	fn set_needs(&mut self, sensor: Sensor, need: bool) {
		let i = sensor_idx(sensor);
		if self.needs[i] && !need {
			self.numneeds -= 1;
		} else if !self.needs[i] && need {
			self.numneeds += 1;
		}
		self.needs[i] = need;
	}

	/// Entry point for a frame arriving on the pub/sub channel.
	pub fn on_pubsub_incoming(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) {
		self.pubsub.on_pubsub_incoming(attrs, from, payload);
		self.drain_events();
	}

	/// Entry point for a frame arriving on the peer channel.
	pub fn on_peer_incoming(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) {
		self.pubsub.on_peer_incoming(attrs, from, payload);
		self.drain_events();
	}

	fn drain_events(&mut self) {
		for event in self.pubsub.drain_events() {
			match event {
				PubsubEvent::Subscription { sink: _, subid: _, record } => self.on_subscription(record),
				PubsubEvent::Unsubscription { sink: _, subid: _, record } => self.on_unsubscription(record),
				PubsubEvent::OnData { sink, subid, data } => self.on_ondata(sink, subid, data),
				PubsubEvent::Errpub { sink } => tracing::warn!(%sink, "publisher: publish could not be delivered"),
			}
		}
	}

	fn on_subscription(&mut self, record: wsn_pubsub::Subscription) {
		let i = sensor_idx(record.sensor);
		if record.interval < self.collect_interval[i] {
			if let Some(handle) = self.collect_handle[i].take() {
				self.timer.cancel(handle);
			}
			self.collect_interval[i] = record.interval;
			self.collect_handle[i] = Some(self.timer.schedule(record.interval));
		}
	}

	fn on_unsubscription(&mut self, record: wsn_pubsub::Subscription) {
		let sensor = record.sensor;
		let i = sensor_idx(sensor);
		if let Some(handle) = self.collect_handle[i].take() {
			self.timer.cancel(handle);
		}
		match self.min_interval_for(sensor) {
			Some(interval) => {
				self.collect_interval[i] = interval;
				self.collect_handle[i] = Some(self.timer.schedule(interval));
			}
			None => self.collect_interval[i] = Millis::MAX,
		}
	}

	fn min_interval_for(&self, sensor: Sensor) -> Option<Millis> {
		let mut min = None;
		let mut cursor = None;
		loop {
			let Some((sink, subid)) = self.pubsub.next_subscription(cursor) else { break };
			cursor = Some((sink, subid));
			if let Some(record) = self.pubsub.subscription(sink, subid) {
				if record.sensor == sensor {
					min = Some(min.map_or(record.interval, |m: Millis| m.min(record.interval)));
				}
			}
		}
		min
	}

	/// We are a forwarder on the path to `sink`: re-add the value into our
	/// own buffer for it (so aggregation happens at every hop) and keep the
	/// debounce timer moving.
	fn on_ondata(&mut self, sink: Addr, subid: SubId, data: Bytes) {
		self.add_and_trigger(sink, subid, &data);
	}

	/// Offers a freshly sampled `reading` to every subscription asking for
	/// `sensor`, honouring each one's hard/soft filter.
	pub fn publish(&mut self, sensor: Sensor, reading: Reading) {
		self.set_needs(sensor, false);
		let mut cursor = None;
		loop {
			let Some((sink, subid)) = self.pubsub.next_subscription(cursor) else { break };
			cursor = Some((sink, subid));
			let Some(record) = self.pubsub.subscription(sink, subid) else { continue };
			if record.sensor != sensor {
				continue;
			}
			if !record.hard.passes(reading) {
				// hard filter fired: this subscription doesn't want the
				// reading at all, not even as an empty placeholder.
				continue;
			}
			let mut payload = BytesMut::new();
			if record.soft.passes(reading) {
				reading.encode(&mut payload);
			}
			// soft filter firing leaves `payload` empty: the value is
			// dropped but the subscription keeps flowing downstream.
			self.add_and_trigger(sink, subid, &payload);
		}
	}

	fn add_and_trigger(&mut self, sink: Addr, subid: SubId, payload: &[u8]) {
		if !self.pubsub.add_data(sink, subid, payload) {
			self.fire_aggregate(sink);
			let _ = self.pubsub.add_data(sink, subid, payload);
		}
		self.restart_aggregate(sink);
	}

	fn restart_aggregate(&mut self, sink: Addr) {
		if let Some(pos) = self.aggregate_handle.iter().position(|(s, _)| *s == sink) {
			let (_, handle) = self.aggregate_handle.remove(pos);
			self.timer.cancel(handle);
		}
		let handle = self.timer.schedule(self.agg_interval);
		self.aggregate_handle.push((sink, handle));
	}

	/// Rebuilds `sink`'s buffer by running each known subscription's
	/// aggregator over its currently buffered fragments, then publishes it.
	///
	/// Uses `writeout`/`writein` for real: the aggregated replacement is
	/// built in the spare buffer while the stale raw fragments are still
	/// being read out of the live one, then swapped in before publishing.
	fn fire_aggregate(&mut self, sink: Addr) {
		if let Some(pos) = self.aggregate_handle.iter().position(|(s, _)| *s == sink) {
			let (_, handle) = self.aggregate_handle.remove(pos);
			self.timer.cancel(handle);
		}

		let mut known = Vec::new();
		let mut cursor = None;
		loop {
			let Some((s, subid)) = self.pubsub.next_subscription(cursor) else { break };
			cursor = Some((s, subid));
			if s == sink {
				known.push(subid);
			}
		}

		self.pubsub.writeout(sink);
		for subid in known {
			let Some(record) = self.pubsub.subscription(sink, subid) else { continue };
			let values = self.pubsub.extract_data(sink, subid);
			for payload in aggregate_group(record.aggregator, record.sensor, values) {
				let _ = self.pubsub.add_data(sink, subid, &payload);
			}
		}
		self.pubsub.writein();
		self.pubsub.publish(sink);
	}

	/// Call when the timer armed for `sensor`'s collection fires.
	pub fn on_collect_timer(&mut self, handle: TimerHandle) {
		let Some(i) = self.collect_handle.iter().position(|h| *h == Some(handle)) else { return };
		if self.sensor_size[i].is_some() {
			self.set_needs(ALL_SENSORS[i], true);
		}
		self.collect_handle[i] = Some(self.timer.schedule(self.collect_interval[i]));
	}

	/// Call when a sink's aggregation debounce timer fires.
	pub fn on_aggregate_timer(&mut self, handle: TimerHandle) {
		let Some((sink, _)) = self.aggregate_handle.iter().find(|(_, h)| *h == handle).copied() else { return };
		self.fire_aggregate(sink);
	}

	pub fn close(&mut self) {
		for handle in self.collect_handle.iter_mut().filter_map(|h| h.take()) {
			self.timer.cancel(handle);
		}
		for (_, handle) in self.aggregate_handle.drain(..) {
			self.timer.cancel(handle);
		}
		self.pubsub.close();
	}

	/// Call when a timer this node's `Pubsub`/`Subnet` armed fires (its
	/// `ADisclose` ack timeout).
	pub fn on_subnet_timer(&mut self, handle: TimerHandle) {
		if self.pubsub.on_timer(handle) {
			self.drain_events();
		}
	}
}

/// Applies `agg` to one subscription's buffered fragments, decoding and
/// re-encoding through [`Reading`]. Falls through unchanged when `agg`
/// doesn't apply to `sensor` (matching the filters' mismatched-combination
/// behaviour: nothing to aggregate on, so nothing is dropped).
fn aggregate_group(agg: Aggregator, sensor: Sensor, values: Vec<Bytes>) -> Vec<Bytes> {
	match agg {
		Aggregator::None => values,
		Aggregator::LocationAvg { max_dist } if sensor == Sensor::Location => {
			let points: Vec<Location> = values
				.iter()
				.filter_map(|payload| match Reading::decode(sensor, &mut payload.clone()) {
					Some(Reading::Location(loc)) => Some(loc),
					_ => None,
				})
				.collect();

			let mut clusters: Vec<Vec<Location>> = Vec::new();
			for point in points {
				match clusters.iter_mut().find(|cluster| cluster.iter().all(|q| q.distance(point) <= max_dist)) {
					Some(cluster) => cluster.push(point),
					None => clusters.push(vec![point]),
				}
			}

			clusters
				.into_iter()
				.map(|cluster| {
					let n = cluster.len() as i32;
					let (sx, sy) = cluster.iter().fold((0i32, 0i32), |(ax, ay), l| (ax + l.x as i32, ay + l.y as i32));
					let avg = Location { x: (sx / n) as i16, y: (sy / n) as i16 };
					let mut buf = BytesMut::new();
					Reading::Location(avg).encode(&mut buf);
					buf.freeze()
				})
				.collect()
		}
		Aggregator::LocationAvg { .. } => values,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::{Cell, RefCell};
	use std::rc::Rc;

	use wsn_hal::{RadioError, TxStatus};
	use wsn_pubsub::{CmpOp, Config as StoreConfig};

	#[derive(Clone)]
	struct FakeClock(Rc<Cell<Millis>>);
	impl Clock for FakeClock {
		fn now(&self) -> Millis {
			self.0.get()
		}
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

	#[derive(Default)]
	struct FakeTimer {
		next: u64,
		canceled: Vec<TimerHandle>,
	}
	impl Timer for FakeTimer {
		fn schedule(&mut self, _delay: Millis) -> TimerHandle {
			let h = TimerHandle(self.next);
			self.next += 1;
			h
		}
		fn cancel(&mut self, handle: TimerHandle) {
			self.canceled.push(handle);
		}
	}

	fn sub(sensor: Sensor, hard: Filter) -> wsn_pubsub::Subscription {
		wsn_pubsub::Subscription { interval: 1_000, soft: Filter::None, hard, aggregator: Aggregator::None, sensor }
	}

	fn publisher() -> (Publisher<LoopbackRadio, FakeClock, FakeTimer>, Rc<RefCell<Vec<(PacketAttrs, Bytes)>>>) {
		let sent = Rc::new(RefCell::new(Vec::new()));
		let pubsub = Pubsub::open(
			LoopbackRadio { addr: Addr::new(1, 0), sent: sent.clone() },
			FakeClock(Rc::new(Cell::new(0))),
			wsn_net::Config::default(),
			StoreConfig::default(),
			FakeTimer::default(),
		);
		(Publisher::open(pubsub, FakeTimer::default(), 500), sent)
	}

	/// Self-delivers the most recently broadcast frame, the way a single-hop
	/// sink hears its own subscription.
	fn self_deliver(p: &mut Publisher<LoopbackRadio, FakeClock, FakeTimer>, sent: &Rc<RefCell<Vec<(PacketAttrs, Bytes)>>>) {
		let (attrs, payload) = sent.borrow().last().cloned().unwrap();
		p.on_pubsub_incoming(&attrs, Addr::new(9, 9), payload);
	}

	#[test]
	fn publish_drops_readings_that_fail_the_hard_filter() {
		let (mut p, sent) = publisher();
		p.has(Sensor::Humidity, 8);

		let _subid = p.pubsub.subscribe(sub(Sensor::Humidity, Filter::Scalar { op: CmpOp::Gte, threshold: 10.0 })).unwrap();
		let sink = p.pubsub.local_addr();
		self_deliver(&mut p, &sent);

		p.publish(Sensor::Humidity, Reading::Humidity(5.0));
		assert_eq!(p.pubsub.buffered_len(sink), Some(0));

		p.publish(Sensor::Humidity, Reading::Humidity(50.0));
		assert!(p.pubsub.buffered_len(sink).unwrap() > 0);
	}

	#[test]
	fn in_need_tracks_collect_timer_firings() {
		let (mut p, _sent) = publisher();
		p.has(Sensor::Pressure, 8);
		assert!(!p.in_need());

		let record = sub(Sensor::Pressure, Filter::None);
		p.on_subscription(record);
		let handle = p.collect_handle[sensor_idx(Sensor::Pressure)].unwrap();
		p.on_collect_timer(handle);

		assert!(p.in_need());
		assert!(p.needs(Sensor::Pressure));
		p.publish(Sensor::Pressure, Reading::Pressure(42.0));
		assert!(!p.needs(Sensor::Pressure));
	}
}
