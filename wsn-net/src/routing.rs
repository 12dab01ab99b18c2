use bytes::BytesMut;

use wsn_hal::{Clock, Millis};
use wsn_proto::Addr;

use crate::config::Config;

/// A single-hop neighbor this node has heard traffic from.
///
/// Slots are never removed, only overwritten in place when the table is
/// full and a fresher neighbor needs a slot (`update_routes`'s "oldest"
/// eviction) — this keeps indices into `neighbors` stable for the lifetime
/// of the table the way raw pointers into the original's fixed C array are,
/// without needing unsafe code or a generational arena.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Neighbor {
	pub addr: Addr,
	pub last_active: Millis,
}

/// One candidate next hop towards a sink: a neighbor, and the cost that
/// neighbor has advertised for reaching the sink.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SinkNeighbor {
	pub cost: u8,
	/// Index into the owning [`Routes`]'s neighbor table.
	pub neighbor: usize,
}

/// Everything known about a single sink: its advertised cost, candidate next
/// hops, outgoing aggregation buffer, and revocation state.
pub(crate) struct Sink {
	pub addr: Addr,
	pub advertised_cost: u8,
	pub nexthops: Vec<SinkNeighbor>,
	pub fragments: u8,
	pub buf: BytesMut,
	/// `None` until `handle_leaving` revokes this sink; `Some(t)` is the
	/// clock reading at revocation. Replaces the original's overloaded
	/// `clock_time_t revoked` (`0`/non-zero) field.
	pub revoked: Option<Millis>,
}

impl Sink {
	pub(crate) fn fresh(addr: Addr, advertised_cost: u8) -> Self {
		Sink {
			addr,
			advertised_cost,
			nexthops: Vec::new(),
			fragments: 0,
			buf: BytesMut::new(),
			revoked: None,
		}
	}
}

/// The sink and neighbor tables, and the routing algorithms that operate on
/// them — `find_sinkid`, `update_routes` and `get_next_hop` from
/// `subnet.c`, generalized off the original's `SUBNET_MAX_*` `#define`s onto
/// [`Config`]'s runtime fields.
pub(crate) struct Routes {
	config: Config,
	pub(crate) sinks: Vec<Sink>,
	neighbors: Vec<Neighbor>,
}

impl Routes {
	pub fn new(config: Config) -> Self {
		Routes {
			config,
			sinks: Vec::new(),
			neighbors: Vec::new(),
		}
	}

	pub fn find_sink(&self, addr: Addr) -> Option<usize> {
		self.sinks.iter().position(|s| s.addr == addr)
	}

	/// Finds or creates the sink's routing entry, and — unless `from` is
	/// `None` (meaning we originated the subscription ourselves) — records
	/// `from` as a candidate next hop at the advertised `cost`.
	///
	/// Grounded directly on `update_routes` in `subnet.c`; the oldest-first
	/// eviction of both the sink and neighbor tables when full is preserved
	/// verbatim.
	pub fn update_routes(
		&mut self,
		clock: &impl Clock,
		sink: Addr,
		from: Option<Addr>,
		cost: u8,
	) -> Option<usize> {
		let mut replace_sink: Option<usize> = None;
		let mut found: Option<usize> = None;
		for (i, s) in self.sinks.iter().enumerate() {
			if s.addr == sink {
				found = Some(i);
			}
			if replace_sink.is_none() {
				if let Some(revoked_at) = s.revoked {
					if clock.now().saturating_sub(revoked_at) > self.config.revoke_period {
						replace_sink = Some(i);
					}
				}
			}
		}

		let sink_idx = match found {
			Some(i) => i,
			None => {
				if replace_sink.is_none() && self.sinks.len() >= self.config.max_sinks {
					tracing::warn!(%sink, "subnet: max sinks limit hit");
					return None;
				}
				let advertised_cost = if from.is_none() { 0 } else { cost + 1 };
				let fresh = Sink::fresh(sink, advertised_cost);
				match replace_sink {
					Some(i) => {
						self.sinks[i] = fresh;
						i
					}
					None => {
						self.sinks.push(fresh);
						self.sinks.len() - 1
					}
				}
			}
		};

		let from = match from {
			Some(from) => from,
			None => return Some(sink_idx),
		};

		let neighbor_idx = self.touch_neighbor(clock, from);

		let route = &mut self.sinks[sink_idx];
		let mut already_nexthop = false;
		let mut oldest_slot = 0usize;
		let mut oldest_last_active = Millis::MAX;
		for (i, nh) in route.nexthops.iter_mut().enumerate() {
			if nh.neighbor == neighbor_idx {
				nh.cost = cost;
				already_nexthop = true;
			}
			if self.neighbors[nh.neighbor].last_active < oldest_last_active {
				oldest_last_active = self.neighbors[nh.neighbor].last_active;
				oldest_slot = i;
			}
		}

		if !already_nexthop && cost < route.advertised_cost {
			tracing::debug!(%sink, %from, cost, advertised = route.advertised_cost, "subnet: viable next hop found");
			if route.nexthops.len() < self.config.max_alternate_routes {
				route.nexthops.push(SinkNeighbor {
					cost,
					neighbor: neighbor_idx,
				});
			} else {
				route.nexthops[oldest_slot] = SinkNeighbor {
					cost,
					neighbor: neighbor_idx,
				};
			}
		}

		Some(sink_idx)
	}

	fn touch_neighbor(&mut self, clock: &impl Clock, addr: Addr) -> usize {
		let mut found = None;
		let mut oldest = 0usize;
		let mut oldest_last_active = Millis::MAX;
		for (i, n) in self.neighbors.iter().enumerate() {
			if n.addr == addr {
				found = Some(i);
			}
			if n.last_active < oldest_last_active {
				oldest_last_active = n.last_active;
				oldest = i;
			}
		}

		let idx = match found {
			Some(i) => i,
			None => {
				if self.neighbors.len() >= self.config.max_neighbors {
					tracing::warn!(%addr, "subnet: max neighbours limit hit, evicting oldest");
					oldest
				} else {
					self.neighbors.push(Neighbor {
						addr,
						last_active: clock.now(),
					});
					return self.neighbors.len() - 1;
				}
			}
		};
		self.neighbors[idx].addr = addr;
		self.neighbors[idx].last_active = clock.now();
		idx
	}

	/// Returns the best next hop towards `route`, excluding (and never
	/// cheaper than) `prevto`.
	///
	/// Grounded on `get_next_hop` in `subnet.c`. Selection order: cheapest
	/// cost first; among equal-cost candidates, the most recently active
	/// neighbor; remaining ties broken by table position. A revoked sink
	/// still routes normally until `revoke_period` has elapsed since
	/// revocation, exactly as the original's grace window does.
	pub fn next_hop(&self, clock: &impl Clock, sink_idx: usize, prevto: Option<Addr>) -> Option<Addr> {
		let route = &self.sinks[sink_idx];

		if let Some(revoked_at) = route.revoked {
			if clock.now().saturating_sub(revoked_at) > self.config.revoke_period {
				return None;
			}
		}

		let prev_i = prevto.and_then(|prevto| {
			route
				.nexthops
				.iter()
				.position(|nh| self.neighbors[nh.neighbor].addr == prevto)
		});
		let prev = prev_i.map(|i| route.nexthops[i]);

		let mut best: Option<(usize, SinkNeighbor)> = None;
		for (i, nh) in route.nexthops.iter().enumerate() {
			if let (Some(prev), Some(prev_i)) = (prev, prev_i) {
				if i == prev_i {
					continue;
				}
				if nh.cost < prev.cost {
					continue;
				}
				if nh.cost == prev.cost && i < prev_i {
					continue;
				}
			}

			best = Some(match best {
				None => (i, *nh),
				Some((best_i, best_nh)) => {
					if nh.cost < best_nh.cost {
						(i, *nh)
					} else if nh.cost > best_nh.cost {
						(best_i, best_nh)
					} else if self.neighbors[nh.neighbor].last_active
						> self.neighbors[best_nh.neighbor].last_active
					{
						(i, *nh)
					} else if self.neighbors[nh.neighbor].last_active
						< self.neighbors[best_nh.neighbor].last_active
					{
						(best_i, best_nh)
					} else if i < best_i {
						(i, *nh)
					} else {
						(best_i, best_nh)
					}
				}
			});
		}

		match best {
			Some((_, nh)) => Some(self.neighbors[nh.neighbor].addr),
			None => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FakeClock(std::cell::Cell<Millis>);
	impl Clock for FakeClock {
		fn now(&self) -> Millis {
			self.0.get()
		}
	}

	#[test]
	fn cheapest_route_wins() {
		let clock = FakeClock(std::cell::Cell::new(1000));
		let mut routes = Routes::new(Config::default());
		let sink = Addr::new(9, 9);

		let idx = routes
			.update_routes(&clock, sink, Some(Addr::new(1, 0)), 2)
			.unwrap();
		clock.0.set(1001);
		routes.update_routes(&clock, sink, Some(Addr::new(2, 0)), 1);

		assert_eq!(routes.next_hop(&clock, idx, None), Some(Addr::new(2, 0)));
	}

	#[test]
	fn ties_prefer_more_recently_active() {
		let clock = FakeClock(std::cell::Cell::new(1000));
		let mut routes = Routes::new(Config::default());
		let sink = Addr::new(9, 9);

		let idx = routes
			.update_routes(&clock, sink, Some(Addr::new(1, 0)), 2)
			.unwrap();
		clock.0.set(2000);
		routes.update_routes(&clock, sink, Some(Addr::new(2, 0)), 2);

		assert_eq!(routes.next_hop(&clock, idx, None), Some(Addr::new(2, 0)));
	}

	#[test]
	fn never_reselects_or_undercuts_prevto() {
		let clock = FakeClock(std::cell::Cell::new(1000));
		let mut routes = Routes::new(Config::default());
		let sink = Addr::new(9, 9);

		let idx = routes
			.update_routes(&clock, sink, Some(Addr::new(1, 0)), 1)
			.unwrap();
		routes.update_routes(&clock, sink, Some(Addr::new(2, 0)), 1);

		assert_eq!(
			routes.next_hop(&clock, idx, Some(Addr::new(1, 0))),
			Some(Addr::new(2, 0))
		);
		// only known route is prevto itself: no alternative
		let idx2 = routes
			.update_routes(&clock, Addr::new(8, 8), Some(Addr::new(3, 0)), 1)
			.unwrap();
		assert_eq!(routes.next_hop(&clock, idx2, Some(Addr::new(3, 0))), None);
	}

	#[test]
	fn revoked_sink_routes_until_grace_period_elapses() {
		let clock = FakeClock(std::cell::Cell::new(0));
		let mut routes = Routes::new(Config::default());
		let idx = routes
			.update_routes(&clock, Addr::new(9, 9), Some(Addr::new(1, 0)), 1)
			.unwrap();
		routes.sinks[idx].revoked = Some(0);

		clock.0.set(100);
		assert!(routes.next_hop(&clock, idx, None).is_some());

		clock.0.set(Config::default().revoke_period + 1);
		assert_eq!(routes.next_hop(&clock, idx, None), None);
	}
}
