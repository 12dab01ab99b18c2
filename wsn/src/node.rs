use bytes::Bytes;

use wsn_hal::{Clock, Millis, Radio, Timer, TimerHandle};
use wsn_proto::{Addr, PacketAttrs, SubId};
use wsn_pubsub::{Pubsub, Reading, Sensor};
use wsn_roles::{Publisher, Subscriber};

/// A single mesh participant, playing one of the two roles built on
/// [`Pubsub`] (§4.5/§4.6).
///
/// A source that samples sensors is a `Publisher`; so is a plain relay, with
/// no sensors of its own declared via [`Publisher::has`] — its `on_ondata`
/// hook already forwards and re-aggregates whatever passes through it. A
/// sink that only wants readings delivered to it is a `Subscriber`. Nothing
/// in `wsn-roles` requires both to share one `Pubsub` instance, so a node
/// that is simultaneously a sink for its own subscriptions and a relay for
/// someone else's isn't expressible as a single `Node` — exactly the split
/// `publisher.c`/`subscriber.c` keep in the original, each its own module
/// built over the one shared `pubsub.c` table. Using two `Node`s, one of
/// each, covers that case.
pub enum Node<R, Clk, T> {
	Publisher(Publisher<R, Clk, T>),
	Subscriber(Subscriber<R, Clk, T>),
}

impl<R: Radio, Clk: Clock + Clone, T: Timer> Node<R, Clk, T> {
	pub fn publisher(pubsub: Pubsub<R, Clk, T>, timer: T, agg_interval: Millis) -> Self {
		Node::Publisher(Publisher::open(pubsub, timer, agg_interval))
	}

	pub fn subscriber(pubsub: Pubsub<R, Clk, T>, timer: T, resend_interval: Millis) -> Self {
		Node::Subscriber(Subscriber::open(pubsub, timer, resend_interval))
	}

	pub fn as_publisher_mut(&mut self) -> Option<&mut Publisher<R, Clk, T>> {
		match self {
			Node::Publisher(p) => Some(p),
			Node::Subscriber(_) => None,
		}
	}

	pub fn as_subscriber_mut(&mut self) -> Option<&mut Subscriber<R, Clk, T>> {
		match self {
			Node::Subscriber(s) => Some(s),
			Node::Publisher(_) => None,
		}
	}

	pub fn local_addr(&self) -> Addr {
		match self {
			Node::Publisher(p) => p.pubsub().local_addr(),
			Node::Subscriber(s) => s.pubsub().local_addr(),
		}
	}

	/// Entry point for a frame on the pub/sub channel. Returns every reading
	/// addressed to this node — always empty for a `Publisher`-role node,
	/// which has no subscriber-side demux of its own.
	pub fn on_pubsub_incoming(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) -> Vec<(SubId, Bytes)> {
		match self {
			Node::Publisher(p) => {
				p.on_pubsub_incoming(attrs, from, payload);
				Vec::new()
			}
			Node::Subscriber(s) => s.on_pubsub_incoming(attrs, from, payload),
		}
	}

	/// Entry point for a frame on the peer (ask/reply/leaving) channel.
	pub fn on_peer_incoming(&mut self, attrs: &PacketAttrs, from: Addr, payload: Bytes) -> Vec<(SubId, Bytes)> {
		match self {
			Node::Publisher(p) => {
				p.on_peer_incoming(attrs, from, payload);
				Vec::new()
			}
			Node::Subscriber(s) => s.on_peer_incoming(attrs, from, payload),
		}
	}

	/// Call whenever a timer this node armed fires. A `Publisher`-role node
	/// may own collection, aggregation and `Subnet` ack-retry timers; every
	/// dispatcher is a no-op for a handle it doesn't recognise, so trying all
	/// of them is safe. Returns whatever readings a `Subnet` retry surfaced.
	pub fn on_timer(&mut self, handle: TimerHandle) -> Vec<(SubId, Bytes)> {
		match self {
			Node::Publisher(p) => {
				p.on_collect_timer(handle);
				p.on_aggregate_timer(handle);
				p.on_subnet_timer(handle);
				Vec::new()
			}
			Node::Subscriber(s) => {
				s.on_resubscribe_timer(handle);
				s.on_subnet_timer(handle)
			}
		}
	}

	/// Offers a freshly sampled reading, a no-op on a `Subscriber`-role node.
	pub fn publish(&mut self, sensor: Sensor, reading: Reading) {
		if let Node::Publisher(p) = self {
			p.publish(sensor, reading);
		}
	}

	pub fn close(&mut self) {
		match self {
			Node::Publisher(p) => p.close(),
			Node::Subscriber(s) => s.close(),
		}
	}
}
