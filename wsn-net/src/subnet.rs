use bytes::{Bytes, BytesMut};

use wsn_hal::{Clock, Radio, Timer, TimerHandle};
use wsn_link::{ADisclose, AdiscloseConfig, AdiscloseEvent};
use wsn_proto::{Addr, Channel, Fragment, FragmentHeader, FragmentIter, PacketAttrs, PacketType, PeerPacket, SubId};

use crate::buffer::inject_fragment;
use crate::callbacks::{Existance, SubnetCallbacks};
use crate::config::Config;
use crate::routing::{Routes, Sink};

/// A publish attempt still waiting on its next hop's ACK (or timeout),
/// keeping the retry-with-excluded-hop state `publish` used to unwind
/// synchronously in a single call stack frame, now that an answer can take a
/// whole round trip to arrive.
struct PendingPublish {
	sink: Addr,
	sink_idx: usize,
	payload: Bytes,
	fragments: u8,
	advertised_cost: u8,
}

/// Sink routing, subscription propagation and multi-hop publish, built on a
/// single [`ADisclose`] connection shared between the pub/sub and peer
/// channels ([`Channel`] tells the two apart on the wire).
///
/// Unicast sends (publish-path forwarding, peer ask/reply replies) go
/// through `ADisclose`'s ACK/retry machinery; broadcasts (subscribe floods,
/// LEAVING announcements) bypass it via [`ADisclose::send_unacked`] since a
/// broadcast has no single recipient to ACK it.
///
/// Grounded on `subnet.c`: the more fully fleshed-out of the two drafts in
/// the corpus, the one with `writeout`/`writein`, `errpub`, `sink_left` and
/// the revoke grace period, as opposed to the earlier sketch that never grew
/// past its header.
pub struct Subnet<R, Clk, CB, T> {
	adisclose: ADisclose<R, T>,
	clock: Clk,
	callbacks: CB,
	config: Config,
	routes: Routes,
	next_subid: u8,
	writeout: Option<Addr>,
	writesink: Sink,
	pending_publish: Option<PendingPublish>,
}

impl<R: Radio, Clk: Clock, CB: SubnetCallbacks, T: Timer> Subnet<R, Clk, CB, T> {
	pub fn open(radio: R, clock: Clk, callbacks: CB, config: Config, timer: T) -> Self {
		Subnet {
			adisclose: ADisclose::new(radio, timer, AdiscloseConfig::default()),
			clock,
			callbacks,
			routes: Routes::new(config),
			config,
			next_subid: 0,
			writeout: None,
			writesink: Sink::fresh(Addr::NULL, 0),
			pending_publish: None,
		}
	}

	/// Broadcasts a LEAVING announcement for this node and gives up the
	/// radio. Must be called before a sink goes away for good, or its later
	/// subscriptions may be ignored by neighbors who still think it left.
	pub fn close(&mut self) {
		let attrs = PacketAttrs {
			channel: Channel::PubSub,
			packet_type: PacketType::Leaving,
			sink: self.local_addr(),
			..PacketAttrs::default()
		};
		let _ = self.adisclose.send_unacked(Addr::NULL, attrs, Bytes::new());
	}

	pub fn local_addr(&self) -> Addr {
		self.adisclose.local_addr()
	}

	/// This node's own sink address, once it has sent at least one
	/// subscription. `None` until then.
	pub fn myid(&self) -> Option<Addr> {
		self.routes.find_sink(self.local_addr()).map(|_| self.local_addr())
	}

	/// Adds data for `subid` to the outgoing publish buffer for `sink`.
	/// Returns `false` if the packet has no room left for it.
	pub fn add_data(&mut self, sink: Addr, subid: SubId, payload: &[u8]) -> bool {
		let Some(sink_idx) = self.routes.find_sink(sink) else {
			tracing::warn!(%sink, "subnet: invalid sink id");
			return false;
		};

		let target = if self.writeout == Some(sink) {
			&mut self.writesink
		} else {
			&mut self.routes.sinks[sink_idx]
		};

		let ok = inject_fragment(&mut target.buf, &mut target.fragments, self.config.max_packet_len, subid, payload);
		if !ok {
			tracing::debug!(%sink, %subid, "subnet: packet is full");
		}
		ok
	}

	/// Redirects `add_data` writes for `sink` to a spare buffer instead of
	/// its live one. Only one sink can be redirected at a time.
	pub fn writeout(&mut self, sink: Addr) {
		tracing::debug!(%sink, "subnet: enabling writeout buffer");
		self.writeout = Some(sink);
		self.writesink = Sink::fresh(sink, 0);
	}

	/// Copies everything written since [`Subnet::writeout`] into the
	/// redirected sink's live buffer.
	pub fn writein(&mut self) {
		tracing::debug!("subnet: disabling writeout buffer");
		let Some(sink) = self.writeout.take() else {
			return;
		};
		if let Some(idx) = self.routes.find_sink(sink) {
			let buf = self.writesink.buf.clone();
			let fragments = self.writesink.fragments;
			self.routes.sinks[idx].buf = buf;
			self.routes.sinks[idx].fragments = fragments;
		}
	}

	/// Bytes currently queued for `sink`'s next publish.
	pub fn packetlen(&self, sink: Addr) -> Option<usize> {
		let idx = self.routes.find_sink(sink)?;
		if self.writeout == Some(sink) {
			Some(self.writesink.buf.len())
		} else {
			Some(self.routes.sinks[idx].buf.len())
		}
	}

	/// Non-destructively iterates the fragments currently queued for `sink`,
	/// e.g. to pull out every value for one subscription before an
	/// aggregator combines them. Grounded on `subnet_sink`/
	/// `EACH_SINK_FRAGMENT` in the original, which hand pubsub's
	/// `extract_data` read-only access to the same buffer `publish` would
	/// otherwise drain.
	pub fn fragments(&self, sink: Addr) -> Option<FragmentIter> {
		let idx = self.routes.find_sink(sink)?;
		Some(FragmentIter::new(self.routes.sinks[idx].buf.clone().freeze()))
	}

	/// The application callbacks this Subnet was opened with.
	pub fn callbacks(&self) -> &CB {
		&self.callbacks
	}

	/// Mutable access to the application callbacks this Subnet was opened
	/// with, for hosts that need to query or reset their own state directly
	/// rather than only reacting to `SubnetCallbacks` invocations.
	pub fn callbacks_mut(&mut self) -> &mut CB {
		&mut self.callbacks
	}

	/// Sends everything queued for `sink` via `ADisclose`, arming its
	/// ack/retry machinery. [`Subnet::on_timer`] drives any retry across
	/// alternate next hops; this call only makes the first attempt.
	///
	/// The buffer is reset as soon as a send is attempted, matching the
	/// original's queuebuf snapshot: later `add_data` calls accumulate fresh
	/// data while this attempt (and its retries) is still in flight, since
	/// there is no window here where both copies are live at once.
	pub fn publish(&mut self, sink: Addr) {
		tracing::debug!(%sink, "subnet: publish data");
		let Some(sink_idx) = self.routes.find_sink(sink) else {
			tracing::warn!(%sink, "subnet: invalid sink id");
			return;
		};

		let route = &mut self.routes.sinks[sink_idx];
		let advertised_cost = route.advertised_cost;
		let fragments = route.fragments;
		let payload = route.buf.split().freeze();
		route.fragments = 0;

		if self.adisclose.is_transmitting() {
			tracing::warn!(%sink, "subnet: already transmitting, dropping this publish attempt");
			self.callbacks.errpub(sink);
			redeliver(&mut self.callbacks, sink, payload);
			return;
		}

		self.try_next_hop(sink, sink_idx, advertised_cost, fragments, payload, None);
	}

	/// Attempts the best next hop excluding `prevto`, arming an `ADisclose`
	/// send and recording [`PendingPublish`] state on success so
	/// [`Subnet::on_timer`] can continue the retry loop if it times out.
	fn try_next_hop(&mut self, sink: Addr, sink_idx: usize, advertised_cost: u8, fragments: u8, payload: Bytes, prevto: Option<Addr>) {
		let Some(next) = self.routes.next_hop(&self.clock, sink_idx, prevto) else {
			tracing::warn!(%sink, "subnet: no next hop known");
			self.callbacks.errpub(sink);
			redeliver(&mut self.callbacks, sink, payload);
			return;
		};

		let attrs = PacketAttrs {
			channel: Channel::PubSub,
			packet_type: PacketType::Publish,
			hops: advertised_cost,
			fragments,
			sink,
			..PacketAttrs::default()
		};

		match self.adisclose.send(next, attrs, payload.clone()) {
			Ok(true) => {
				tracing::debug!(%sink, %next, "subnet: publish sent, awaiting ack");
				self.pending_publish = Some(PendingPublish { sink, sink_idx, payload, fragments, advertised_cost });
			}
			Ok(false) => {
				tracing::warn!(%sink, %next, "subnet: adisclose already busy, giving up on this publish attempt");
				self.callbacks.errpub(sink);
				redeliver(&mut self.callbacks, sink, payload);
			}
			Err(error) => {
				tracing::warn!(%sink, %next, %error, "subnet: radio error while publishing, trying another next hop");
				self.try_next_hop(sink, sink_idx, advertised_cost, fragments, payload, Some(next));
			}
		}
	}

	/// Call when a timer this Subnet's internal `ADisclose` armed fires.
	/// Returns `false` without effect for a handle that isn't the one
	/// currently pending, so a host can try this against every timer it
	/// manages without first checking ownership.
	pub fn on_timer(&mut self, handle: TimerHandle) -> bool {
		if self.adisclose.pending_handle() != Some(handle) {
			return false;
		}
		let AdiscloseEvent::TimedOut { to } = self.adisclose.on_timeout() else {
			return true;
		};
		self.on_publish_timed_out(to);
		true
	}

	/// Resumes a pending publish's retry loop, excluding the hop that just
	/// timed out. A no-op if the timed-out send was a one-shot peer
	/// ask/reply rather than a publish (`pending_publish` is `None`).
	fn on_publish_timed_out(&mut self, failed_hop: Addr) {
		let Some(pending) = self.pending_publish.take() else {
			return;
		};
		tracing::debug!(sink = %pending.sink, %failed_hop, "subnet: publish timed out, trying another next hop");
		self.try_next_hop(pending.sink, pending.sink_idx, pending.advertised_cost, pending.fragments, pending.payload, Some(failed_hop));
	}

	/// A pending publish's ack arrived. A no-op if the acked send was a
	/// one-shot peer ask/reply rather than a publish.
	fn on_publish_sent(&mut self, to: Addr) {
		if let Some(pending) = self.pending_publish.take() {
			tracing::debug!(sink = %pending.sink, %to, "subnet: publish acked");
		}
	}

	/// Sends a single unicast frame through `ADisclose`'s ack/retry slot,
	/// without tracking it as a pending publish — for one-shot peer
	/// ask/reply traffic, which has no further retry protocol of its own.
	fn send_unicast(&mut self, to: Addr, attrs: PacketAttrs, payload: Bytes) {
		match self.adisclose.send(to, attrs, payload) {
			Ok(true) => {}
			Ok(false) => tracing::debug!(%to, "subnet: adisclose busy, dropping unicast send"),
			Err(error) => tracing::warn!(%to, %error, "subnet: radio error on unicast send"),
		}
	}

	/// Entry point for a frame arriving on the pub/sub channel.
	pub fn on_pubsub_incoming(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) {
		match self.adisclose.on_incoming(attrs, from, payload.clone()) {
			Some(AdiscloseEvent::Recv { from }) => self.on_recv(attrs, from, payload),
			Some(AdiscloseEvent::Hear { from }) => self.on_hear(attrs, from, payload),
			Some(AdiscloseEvent::Sent { to }) => self.on_publish_sent(to),
			Some(AdiscloseEvent::TimedOut { .. }) => {} // on_incoming never produces this
			None => {}
		}
	}

	/// Entry point for a frame arriving on the peer channel.
	pub fn on_peer_incoming(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) {
		let (from, is_recv) = match self.adisclose.on_incoming(attrs, from, payload.clone()) {
			Some(AdiscloseEvent::Recv { from }) => (from, true),
			Some(AdiscloseEvent::Hear { from }) => (from, false),
			Some(AdiscloseEvent::Sent { to }) => {
				self.on_publish_sent(to);
				return;
			}
			Some(AdiscloseEvent::TimedOut { .. }) | None => return,
		};

		match attrs.packet_type {
			PacketType::Ask => self.on_ask(attrs, from, payload, is_recv),
			PacketType::Reply => {
				tracing::debug!(%from, "subnet: heard peer reply packet");
				self.handle_subscriptions(attrs.sink, Some(from), *attrs, payload);
			}
			PacketType::Leaving => {
				tracing::debug!(%from, "subnet: heard peer leaving packet");
				self.handle_leaving(attrs.sink);
			}
			_ => {}
		}
	}

	/// Sends out a new subscription, returning the id it was assigned.
	pub fn subscribe(&mut self, payload: &[u8]) -> SubId {
		if self.myid().is_none() {
			tracing::debug!("subnet: injecting self into sink table");
			self.routes.update_routes(&self.clock, self.local_addr(), None, 0);
		}

		let subid = SubId(self.next_subid);
		self.resubscribe(subid, payload);
		self.next_subid = self.next_subid.wrapping_add(1);
		subid
	}

	/// Re-sends (or re-broadcasts) a subscription already assigned `subid`.
	pub fn resubscribe(&mut self, subid: SubId, payload: &[u8]) {
		let mut buf = BytesMut::new();
		let frag = Fragment {
			subid,
			payload: Bytes::copy_from_slice(payload),
		};
		if frag.serialize_into(&mut buf).is_err() {
			tracing::warn!(%subid, "subnet: subscription payload too large");
			return;
		}

		let local = self.local_addr();
		let attrs = PacketAttrs {
			channel: Channel::PubSub,
			packet_type: PacketType::Subscribe,
			fragments: 1,
			sink: local,
			..PacketAttrs::default()
		};

		if self.callbacks.exists(local, subid).is_known() {
			tracing::debug!(%subid, "subnet: re-broadcasting subscription");
			let _ = self.adisclose.send_unacked(Addr::NULL, attrs, buf.freeze());
		} else {
			tracing::debug!(%subid, "subnet: broadcasting new subscription");
			self.handle_subscriptions(local, None, attrs, buf.freeze());
		}
	}

	/// Ends a subscription this node originated.
	pub fn unsubscribe(&mut self, subid: SubId) {
		let mut buf = BytesMut::new();
		let frag = Fragment {
			subid,
			payload: Bytes::new(),
		};
		let _ = frag.serialize_into(&mut buf);

		let local = self.local_addr();
		let attrs = PacketAttrs {
			channel: Channel::PubSub,
			packet_type: PacketType::Unsubscribe,
			fragments: 1,
			sink: local,
			..PacketAttrs::default()
		};

		if self.callbacks.exists(local, subid).is_known() {
			tracing::debug!(%subid, "subnet: revoking subscription");
			self.handle_subscriptions(local, None, attrs, buf.freeze());
		} else {
			tracing::debug!(%subid, "subnet: re-broadcasting unsubscription");
			let _ = self.adisclose.send_unacked(Addr::NULL, attrs, buf.freeze());
		}
	}

	/// A downstream node sent us a publish to relay towards its sink.
	/// Delivers the data to the application; it is this node's
	/// responsibility, not Subnet's, to decide whether to re-publish it any
	/// further — `subnet.c` never does so itself despite `on_recv`'s comment
	/// about forwarding, and neither does the `pubsub` layer built on it.
	fn on_recv(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) {
		tracing::debug!(%from, "subnet: got publish packet from downstream node");
		let sink = attrs.sink;
		let Some(idx) = self.routes.find_sink(sink) else {
			return;
		};
		if self.routes.sinks[idx].revoked.is_some() {
			self.notify_left(sink);
			return;
		}

		for frag in FragmentIter::new(payload) {
			match frag {
				Ok(frag) if !frag.payload.is_empty() => self.callbacks.ondata(sink, frag.subid, frag.payload),
				Ok(_) => {}
				Err(error) => {
					tracing::warn!(%error, "subnet: corrupt publish packet");
					break;
				}
			}
		}
	}

	fn on_hear(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) {
		match attrs.packet_type {
			PacketType::Subscribe => {
				tracing::debug!(%from, "subnet: heard subscribe packet");
				self.handle_subscriptions(attrs.sink, Some(from), *attrs, payload);
			}
			PacketType::Unsubscribe => {
				tracing::debug!(%from, "subnet: heard unsubscribe packet");
				self.handle_subscriptions(attrs.sink, Some(from), *attrs, payload);
			}
			PacketType::Leaving => {
				tracing::debug!(%from, "subnet: heard leaving packet");
				self.handle_leaving(attrs.sink);
			}
			PacketType::Publish => self.on_hear_publish(attrs, from, payload),
			PacketType::Ask | PacketType::Reply => {
				// these ride the peer channel; ignore if misrouted here
			}
		}
	}

	/// A neighbor's publish, not destined for us, was overheard. Ask whoever
	/// sent it to clarify any subscription in it we don't recognize.
	fn on_hear_publish(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) {
		tracing::debug!(%from, "subnet: heard publish packet");
		let sink = attrs.sink;
		let sink_idx = self.routes.find_sink(sink);
		if let Some(idx) = sink_idx {
			if self.routes.sinks[idx].revoked.is_some() {
				self.notify_left(sink);
				return;
			}
		}

		let mut revoked = Vec::new();
		let mut unknown = Vec::new();
		for frag in FragmentIter::new(payload) {
			let frag = match frag {
				Ok(frag) => frag,
				Err(error) => {
					tracing::warn!(%error, "subnet: corrupt publish packet");
					break;
				}
			};
			match sink_idx {
				None => unknown.push(frag.subid),
				Some(_) => match self.callbacks.exists(sink, frag.subid) {
					Existance::Revoked => revoked.push(frag.subid),
					Existance::Unknown => unknown.push(frag.subid),
					Existance::Known => {}
				},
			}
		}

		if revoked.is_empty() && unknown.is_empty() {
			return;
		}

		tracing::debug!(revoked = revoked.len(), unknown = unknown.len(), "subnet: asking peer for clarification");
		let pkt = PeerPacket { revoked, unknown };
		let mut buf = BytesMut::new();
		if pkt.serialize_into(&mut buf).is_err() {
			tracing::warn!("subnet: ask packet too large to encode");
			return;
		}

		let attrs_out = PacketAttrs {
			channel: Channel::Peer,
			packet_type: PacketType::Ask,
			sink,
			..PacketAttrs::default()
		};
		self.send_unicast(from, attrs_out, buf.freeze());
	}

	fn on_ask(&mut self, attrs: &PacketAttrs, from: Addr, mut payload: Bytes, is_recv: bool) {
		tracing::debug!(%from, "subnet: heard peer ask packet");
		let sink = attrs.sink;
		let Some(idx) = self.routes.find_sink(sink) else {
			return;
		};

		let pkt = match PeerPacket::deserialize_from(&mut payload) {
			Ok(pkt) => pkt,
			Err(error) => {
				tracing::warn!(%error, "subnet: corrupt ask packet");
				return;
			}
		};

		if self.routes.sinks[idx].revoked.is_none() {
			for subid in &pkt.revoked {
				if self.callbacks.exists(sink, *subid) == Existance::Known {
					self.callbacks.unsubscribe(sink, *subid);
				}
			}
		}

		if !is_recv {
			// don't reply if we're not being asked directly
			return;
		}

		if self.routes.sinks[idx].revoked.is_some() {
			self.notify_left(sink);
			return;
		}

		let mut out = BytesMut::new();
		let mut fragments = 0u8;
		for subid in &pkt.unknown {
			let space = self
				.config
				.max_packet_len
				.saturating_sub(out.len() + FragmentHeader::ENCODED_LEN);
			let data = self.callbacks.inform(sink, *subid, space);
			if data.is_empty() {
				continue;
			}
			if !inject_fragment(&mut out, &mut fragments, self.config.max_packet_len, *subid, &data) {
				break;
			}
		}

		let advertised_cost = self.routes.sinks[idx].advertised_cost;
		let attrs_out = PacketAttrs {
			channel: Channel::Peer,
			packet_type: PacketType::Reply,
			hops: advertised_cost,
			fragments,
			sink,
			..PacketAttrs::default()
		};
		self.send_unicast(from, attrs_out, out.freeze());
	}

	/// Updates routing state for `sink`/`from` and, for any subscription in
	/// `payload` whose known-ness disagrees with whether this is a
	/// subscribe or an unsubscribe, forwards the change on and fires the
	/// matching callback.
	///
	/// `Reply` packets are handled exactly like `Subscribe` here — they
	/// share a wire value in the original, and a REPLY's `inform` data is
	/// exactly how a peer learns about a subscription it asked about.
	fn handle_subscriptions(&mut self, sink: Addr, from: Option<Addr>, attrs: PacketAttrs, payload: Bytes) {
		let subscribe = matches!(attrs.packet_type, PacketType::Subscribe | PacketType::Reply);
		let cost = attrs.hops;
		self.routes.update_routes(&self.clock, sink, from, cost);

		let rebroadcast_type = if subscribe { PacketType::Subscribe } else { PacketType::Unsubscribe };
		let mut broadcasted = false;

		for frag in FragmentIter::new(payload.clone()) {
			let frag = match frag {
				Ok(frag) => frag,
				Err(error) => {
					tracing::warn!(%error, "subnet: corrupt subscription packet");
					break;
				}
			};

			let known = self.callbacks.exists(sink, frag.subid).is_known();
			if known == subscribe {
				continue;
			}

			if !broadcasted {
				tracing::debug!(subid = %frag.subid, %sink, "subnet: forwarding changed subscription");
				let out = PacketAttrs {
					channel: Channel::PubSub,
					packet_type: rebroadcast_type,
					hops: cost.saturating_add(1),
					fragments: attrs.fragments,
					sink,
					..PacketAttrs::default()
				};
				let _ = self.adisclose.send_unacked(Addr::NULL, out, payload.clone());
				broadcasted = true;
			}

			if subscribe {
				self.callbacks.subscribe(sink, frag.subid, frag.payload);
			} else {
				self.callbacks.unsubscribe(sink, frag.subid);
			}
		}
	}

	fn notify_left(&mut self, sink: Addr) {
		let attrs = PacketAttrs {
			channel: Channel::PubSub,
			packet_type: PacketType::Leaving,
			sink,
			..PacketAttrs::default()
		};
		let _ = self.adisclose.send_unacked(Addr::NULL, attrs, Bytes::new());
	}

	fn handle_leaving(&mut self, sink: Addr) {
		let Some(idx) = self.routes.find_sink(sink) else {
			return;
		};
		if self.routes.sinks[idx].revoked.is_some() {
			return;
		}

		self.callbacks.sink_left(sink);
		let now = self.clock.now();
		let route = &mut self.routes.sinks[idx];
		route.revoked = Some(now);
		route.nexthops.clear();
		route.advertised_cost = 0;
		self.notify_left(sink);
	}
}

/// Hands back data Subnet could not get any further towards its sink,
/// matching `on_sent`'s reinjection-via-`ondata` on total send failure in
/// the original: the same data that failed to relay is delivered to this
/// node's own application layer as a last resort.
fn redeliver(callbacks: &mut impl SubnetCallbacks, sink: Addr, payload: Bytes) {
	for frag in FragmentIter::new(payload) {
		match frag {
			Ok(frag) if !frag.payload.is_empty() => callbacks.ondata(sink, frag.subid, frag.payload),
			Ok(_) => {}
			Err(error) => {
				tracing::warn!(%error, "subnet: corrupt buffered publish packet");
				break;
			}
		}
	}
}
