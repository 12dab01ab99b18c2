//! An in-memory simulated mesh: a shared broadcast log every [`MeshRadio`]
//! reads from, and a [`SimClock`]/[`SimTimer`] pair a test or demo drives
//! forward by hand. No real radio, no OS scheduler, no Tokio — see
//! SPEC_FULL.md §C. Used by `demos` and by this crate's
//! `tests/scenarios.rs`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use bytes::Bytes;

use wsn_hal::{Clock, Millis, Radio, RadioError, Timer, TimerHandle, TxStatus};
use wsn_proto::{Addr, Channel, PacketAttrs, SubId};

use crate::Node;

/// Every node shares one log; each listener keeps its own read cursor into
/// it and picks out frames addressed to it plus anything broadcast, which is
/// enough to fake a shared radio medium without needing real fan-out.
///
/// Grounded on the identical helper `wsn-net`'s own `Subnet` tests build
/// privately; generalized here into a reusable, public mesh.
#[derive(Clone)]
pub struct Mesh {
	log: Rc<RefCell<Vec<(Addr, PacketAttrs, Bytes)>>>,
	cursors: Rc<RefCell<HashMap<Addr, usize>>>,
	drop: Rc<RefCell<HashSet<(Addr, Addr)>>>,
	/// Radio adjacency, symmetric. A node only hears traffic from addresses
	/// it's connected to, so a test can shape a real topology instead of
	/// everyone being in range of everyone.
	links: Rc<RefCell<HashSet<(Addr, Addr)>>>,
}

impl Mesh {
	pub fn new() -> Self {
		Mesh {
			log: Rc::new(RefCell::new(Vec::new())),
			cursors: Rc::new(RefCell::new(HashMap::new())),
			drop: Rc::new(RefCell::new(HashSet::new())),
			links: Rc::new(RefCell::new(HashSet::new())),
		}
	}

	/// Connects `a` and `b` as single-hop neighbors, symmetrically.
	pub fn connect(&self, a: Addr, b: Addr) {
		self.links.borrow_mut().insert((a, b));
		self.links.borrow_mut().insert((b, a));
	}

	/// Makes every unicast send from `from` to `to` fail (link-layer NACK),
	/// without otherwise removing the two from each other's broadcast range.
	pub fn drop_link(&self, from: Addr, to: Addr) {
		self.drop.borrow_mut().insert((from, to));
	}

	pub fn restore_link(&self, from: Addr, to: Addr) {
		self.drop.borrow_mut().remove(&(from, to));
	}

	/// A [`Radio`] for `addr` backed by this mesh.
	pub fn radio(&self, addr: Addr) -> MeshRadio {
		MeshRadio { addr, mesh: self.clone() }
	}

	/// Every frame `addr` is in physical range of since its last take,
	/// addressed to it or not: a real radio broadcasts regardless of the
	/// disclosed receiver, so every single-hop neighbor physically gets the
	/// frame and relies on `Disclose::classify` to tell `Recv` from `Hear`.
	fn take(&self, addr: Addr) -> Vec<(Addr, PacketAttrs, Bytes)> {
		let log = self.log.borrow();
		let mut cursors = self.cursors.borrow_mut();
		let start = *cursors.get(&addr).unwrap_or(&0);
		let links = self.links.borrow();

		let result = log[start..]
			.iter()
			.filter(|(from, _, _)| *from != addr && links.contains(&(*from, addr)))
			.map(|(from, attrs, payload)| (*from, *attrs, payload.clone()))
			.collect();

		cursors.insert(addr, log.len());
		result
	}
}

impl Default for Mesh {
	fn default() -> Self {
		Mesh::new()
	}
}

pub struct MeshRadio {
	addr: Addr,
	mesh: Mesh,
}

impl Radio for MeshRadio {
	fn local_addr(&self) -> Addr {
		self.addr
	}

	fn transmit(&mut self, attrs: &PacketAttrs, payload: Bytes) -> Result<TxStatus, RadioError> {
		if attrs.receiver != Addr::NULL && self.mesh.drop.borrow().contains(&(self.addr, attrs.receiver)) {
			return Ok(TxStatus::Failed);
		}
		self.mesh.log.borrow_mut().push((self.addr, *attrs, payload));
		Ok(TxStatus::Delivered)
	}
}

/// A manually-advanced clock, shared (via `Rc`) between every node and timer
/// in one simulation so they all agree on "now" without a real wall clock.
#[derive(Clone)]
pub struct SimClock(Rc<Cell<Millis>>);

impl SimClock {
	pub fn new() -> Self {
		SimClock(Rc::new(Cell::new(0)))
	}

	pub fn advance(&self, by: Millis) {
		self.0.set(self.0.get() + by);
	}
}

impl Default for SimClock {
	fn default() -> Self {
		SimClock::new()
	}
}

impl Clock for SimClock {
	fn now(&self) -> Millis {
		self.0.get()
	}
}

struct Pending {
	clock: SimClock,
	next: u64,
	deadlines: Vec<(TimerHandle, Millis)>,
}

/// A [`Timer`] backed by [`SimClock`]. Cloning shares the same pending-timer
/// state (same pattern as [`SimClock`] itself), so a test keeps one clone as
/// the node's `Timer` and another to call [`SimTimer::due`] on, standing in
/// for the interrupt that would fire `ctimer_expired` on real hardware.
#[derive(Clone)]
pub struct SimTimer(Rc<RefCell<Pending>>);

impl SimTimer {
	pub fn new(clock: SimClock) -> Self {
		SimTimer(Rc::new(RefCell::new(Pending { clock, next: 0, deadlines: Vec::new() })))
	}

	/// Every handle whose deadline is at or before the clock's current time,
	/// removed from the pending set.
	pub fn due(&self) -> Vec<TimerHandle> {
		let mut pending = self.0.borrow_mut();
		let now = pending.clock.now();
		let mut due = Vec::new();
		pending.deadlines.retain(|&(handle, at)| {
			if at <= now {
				due.push(handle);
				false
			} else {
				true
			}
		});
		due
	}
}

impl Timer for SimTimer {
	fn schedule(&mut self, delay: Millis) -> TimerHandle {
		let mut pending = self.0.borrow_mut();
		let handle = TimerHandle(pending.next);
		pending.next += 1;
		let at = pending.clock.now() + delay;
		pending.deadlines.push((handle, at));
		handle
	}

	fn cancel(&mut self, handle: TimerHandle) {
		self.0.borrow_mut().deadlines.retain(|&(h, _)| h != handle);
	}
}

/// Delivers every frame queued for `addr` on both channels to `node`,
/// returning whatever readings surfaced.
pub fn deliver<R: Radio, Clk: Clock + Clone, T: Timer>(node: &mut Node<R, Clk, T>, mesh: &Mesh, addr: Addr) -> Vec<(SubId, Bytes)> {
	let mut readings = Vec::new();
	for (from, attrs, payload) in mesh.take(addr) {
		let got = match attrs.channel {
			Channel::PubSub => node.on_pubsub_incoming(&attrs, from, payload),
			Channel::Peer => node.on_peer_incoming(&attrs, from, payload),
		};
		readings.extend(got);
	}
	readings
}

/// Fires every timer due on `node`'s clock, given a driver-side clone of the
/// [`SimTimer`] it was opened with. Returns whatever readings a `Subnet`
/// ack-retry surfaced.
pub fn fire_due<R: Radio>(node: &mut Node<R, SimClock, SimTimer>, timer: &SimTimer) -> Vec<(SubId, Bytes)> {
	let mut readings = Vec::new();
	for handle in timer.due() {
		readings.extend(node.on_timer(handle));
	}
	readings
}
